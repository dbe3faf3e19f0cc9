//! Error types for Botfleet

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BotfleetError>;

#[derive(Error, Debug)]
pub enum BotfleetError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),

    /// Content that must never be committed. Always aborts the whole
    /// batch run; persisting it would corrupt history.
    #[error("Invalid post: {0}")]
    InvalidPost(String),

    /// A content generator failed. The bot produces nothing this run.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Malformed externally supplied generator state.
    #[error("Bad state payload: {0}")]
    State(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BotfleetError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BotfleetError::InvalidPost(_) | BotfleetError::InvalidInput(_) => 3,
            BotfleetError::Publisher(_) => 2,
            BotfleetError::Config(_)
            | BotfleetError::Database(_)
            | BotfleetError::Generation(_)
            | BotfleetError::State(_) => 1,
        }
    }

    /// Errors that must propagate out of a batch run instead of being
    /// logged against one bot.
    pub fn aborts_run(&self) -> bool {
        matches!(self, BotfleetError::InvalidPost(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown {kind}: {name}")]
    Unknown { kind: &'static str, name: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PublisherError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Self-test failed: {0}")]
    SelfTest(String),

    #[error("IO error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_post() {
        let error = BotfleetError::InvalidPost("empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_invalid_input() {
        let error = BotfleetError::InvalidInput("bad format".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_publisher_error() {
        let error = BotfleetError::Publisher(PublisherError::Delivery("timeout".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_generation_error() {
        let error = BotfleetError::Generation("no candidates".to_string());
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = BotfleetError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_only_invalid_post_aborts_run() {
        assert!(BotfleetError::InvalidPost("x".to_string()).aborts_run());
        assert!(!BotfleetError::Generation("x".to_string()).aborts_run());
        assert!(!BotfleetError::State("x".to_string()).aborts_run());
        assert!(
            !BotfleetError::Publisher(PublisherError::Delivery("x".to_string())).aborts_run()
        );
    }

    #[test]
    fn test_error_message_formatting() {
        let error = BotfleetError::InvalidPost("content is empty".to_string());
        assert_eq!(format!("{}", error), "Invalid post: content is empty");

        let error = BotfleetError::Publisher(PublisherError::Delivery("refused".to_string()));
        assert_eq!(format!("{}", error), "Publisher error: Delivery failed: refused");

        let error = BotfleetError::Config(ConfigError::Unknown {
            kind: "generator implementation",
            name: "markov".to_string(),
        });
        assert_eq!(
            format!("{}", error),
            "Configuration error: Unknown generator implementation: markov"
        );
    }

    #[test]
    fn test_error_conversion_from_publisher_error() {
        let publisher_error = PublisherError::SelfTest("unwritable".to_string());
        let error: BotfleetError = publisher_error.into();
        assert!(matches!(error, BotfleetError::Publisher(_)));
    }
}
