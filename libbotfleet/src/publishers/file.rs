//! File publisher
//!
//! Appends each delivered post to a local file. Useful for archives and
//! for wiring a bot's output into other tools.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{PublisherError, Result};
use crate::publishers::Publisher;
use crate::types::Post;

pub struct FilePublisher {
    service: String,
    path: String,
}

impl FilePublisher {
    pub fn new(service: &str, path: &str) -> Self {
        Self {
            service: service.to_string(),
            path: shellexpand::tilde(path).to_string(),
        }
    }

    async fn open_append(&self) -> Result<tokio::fs::File> {
        if let Some(parent) = std::path::Path::new(&self.path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PublisherError::Io(e.to_string()))?;
        }

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PublisherError::Io(e.to_string()).into())
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    fn service(&self) -> &str {
        &self.service
    }

    async fn deliver(&self, post: &Post) -> Result<String> {
        let mut file = self.open_append().await?;
        let record = format!("{}\n\n", post.content);
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| PublisherError::Io(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PublisherError::Io(e.to_string()))?;

        Ok(format!("{}#{}", self.path, post.id))
    }

    async fn self_test(&self) -> Result<()> {
        // Opening for append proves the path is creatable and writable
        // without publishing anything.
        self.open_append().await.map(|_| ()).map_err(|e| {
            PublisherError::SelfTest(format!("{} is not writable: {}", self.path, e)).into()
        })
    }
}
