//! End-to-end posting lifecycle tests
//!
//! Exercise the full path from configuration through delivery and
//! republication, using mock and file publishers.

use libbotfleet::config::BotConfig;
use libbotfleet::generator::{PotentialsGenerator, StaticGenerator};
use libbotfleet::orchestrator::{BotRuntime, Fleet, PostOptions};
use libbotfleet::publishers::mock::MockPublisher;
use libbotfleet::publishers::Publisher;
use libbotfleet::scheduling::IntervalPolicy;
use libbotfleet::types::PublicationStatus;
use libbotfleet::{BotAction, Config, Database};
use tempfile::TempDir;

fn bot_config(name: &str, implementation: &str) -> BotConfig {
    BotConfig {
        name: name.to_string(),
        implementation: implementation.to_string(),
        interval: "asap".to_string(),
        publishers: vec![],
        allowed_words: vec![],
    }
}

async fn open_db(dir: &TempDir) -> Database {
    let path = dir.path().join("fleet.db");
    Database::new(path.to_str().unwrap()).await.unwrap()
}

fn run_all<'a>() -> PostOptions<'a> {
    PostOptions {
        bots: &[],
        dry_run: false,
        force: false,
    }
}

#[tokio::test]
async fn test_partial_failure_then_republish_recovers() {
    let dir = TempDir::new().unwrap();

    // First run: publisher "a" works, "b" is down.
    {
        let db = open_db(&dir).await;
        let publishers: Vec<Box<dyn Publisher>> = vec![
            Box::new(MockPublisher::success("a")),
            Box::new(MockPublisher::delivery_failure("b", "relay down")),
        ];
        let runtime = BotRuntime::new(
            bot_config("ama", "static"),
            IntervalPolicy::Asap,
            Box::new(StaticGenerator),
            publishers,
        );
        let fleet = Fleet::from_parts(db, vec![runtime]).await.unwrap();

        fleet.load_backlog("ama", "resilient post\n").await.unwrap();
        let report = fleet.run_post(&run_all()).await.unwrap();
        assert!(matches!(
            report.outcomes[0].action,
            BotAction::Posted { delivered: 1, failed: 1, .. }
        ));
    }

    // Second process: "b" has recovered.
    let db = open_db(&dir).await;
    let a = MockPublisher::success("a");
    let (a_calls, _) = a.handles();
    let publishers: Vec<Box<dyn Publisher>> =
        vec![Box::new(a), Box::new(MockPublisher::success("b"))];
    let runtime = BotRuntime::new(
        bot_config("ama", "static"),
        IntervalPolicy::Asap,
        Box::new(StaticGenerator),
        publishers,
    );
    let fleet = Fleet::from_parts(db, vec![runtime]).await.unwrap();

    let latest = fleet.db().latest_post("ama").await.unwrap().unwrap();
    let a_before = latest
        .publications
        .iter()
        .find(|p| p.service == "a")
        .unwrap()
        .clone();

    let report = fleet.run_republish(&[], 10).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 1);

    // Only "b" was retried; "a" kept its original receipt untouched.
    assert_eq!(*a_calls.lock().unwrap(), 0);
    let latest = fleet.db().latest_post("ama").await.unwrap().unwrap();
    for publication in &latest.publications {
        assert_eq!(publication.status(), PublicationStatus::Delivered);
    }
    let a_after = latest
        .publications
        .iter()
        .find(|p| p.service == "a")
        .unwrap();
    assert_eq!(a_after.external_id, a_before.external_id);
    assert_eq!(a_after.most_recent_attempt, a_before.most_recent_attempt);
}

#[tokio::test]
async fn test_potentials_bot_posts_and_then_avoids_repeating_itself() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let publisher = MockPublisher::success("mock");
    let (_, delivered) = publisher.handles();
    let runtime = BotRuntime::new(
        bot_config("ama", "potentials"),
        IntervalPolicy::Asap,
        Box::new(PotentialsGenerator),
        vec![Box::new(publisher)],
    );
    let fleet = Fleet::from_parts(db, vec![runtime]).await.unwrap();

    fleet
        .set_state(
            "ama",
            r#"[{"content": "I am a cat person AMA", "score": 2.0}]"#,
        )
        .await
        .unwrap();

    let report = fleet.run_post(&run_all()).await.unwrap();
    assert!(matches!(report.outcomes[0].action, BotAction::Posted { .. }));
    assert_eq!(
        delivered.lock().unwrap().as_slice(),
        ["I am a cat person AMA"]
    );

    // The only candidate is now an exact recent repeat, so a second run
    // generates nothing and skips the bot.
    let report = fleet
        .run_post(&PostOptions {
            bots: &[],
            dry_run: false,
            force: true,
        })
        .await
        .unwrap();
    assert!(matches!(report.outcomes[0].action, BotAction::Skipped { .. }));

    // Still exactly one committed post.
    let posts = fleet.db().recent_posts("ama", 0).await.unwrap();
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn test_config_file_to_delivered_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fleet.db");
    let out_path = dir.path().join("ama.txt");
    let config_path = dir.path().join("config.toml");

    let config_content = format!(
        r#"
[database]
path = "{}"

[[bots]]
name = "ama"
implementation = "static"

[[bots.publishers]]
service = "file"
path = "{}"
"#,
        db_path.display().to_string().replace('\\', "/"),
        out_path.display().to_string().replace('\\', "/")
    );
    std::fs::write(&config_path, config_content).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();
    let fleet = Fleet::open(&config).await.unwrap();

    fleet
        .load_backlog("ama", "written to disk\n")
        .await
        .unwrap();
    let report = fleet.run_post(&run_all()).await.unwrap();
    assert!(matches!(
        report.outcomes[0].action,
        BotAction::Posted { delivered: 1, failed: 0, .. }
    ));

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(written, "written to disk\n\n");

    let summaries = fleet.dashboard(&[]).await.unwrap();
    assert_eq!(summaries[0].backlog_count, 0);
    assert_eq!(
        summaries[0].latest_post.as_ref().unwrap().post.content,
        "written to disk"
    );
}

#[tokio::test]
async fn test_self_test_uses_configured_publishers() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir).await;

    let runtime = BotRuntime::new(
        bot_config("ama", "static"),
        IntervalPolicy::Asap,
        Box::new(StaticGenerator),
        vec![
            Box::new(MockPublisher::success("good")),
            Box::new(MockPublisher::unhealthy("flaky")),
        ],
    );
    let fleet = Fleet::from_parts(db, vec![runtime]).await.unwrap();

    let report = fleet.self_test(&["ama".to_string()]).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "ama");
    assert_eq!(report.failures[0].1, "flaky");
}
