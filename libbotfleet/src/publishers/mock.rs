//! Mock publisher implementation for testing
//!
//! A configurable publisher that can simulate deliveries, failures, and
//! latency. Used by integration tests to exercise multi-service
//! delivery and republication logic without any real service.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PublisherError, Result};
use crate::publishers::Publisher;
use crate::types::Post;

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Service name (e.g. "mock-file", "mock-console")
    pub service: String,

    /// Whether delivery should succeed
    pub deliver_succeeds: bool,

    /// Error to return on delivery failure
    pub deliver_error: Option<String>,

    /// Whether the self test should pass
    pub self_test_succeeds: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times deliver has been called
    pub deliver_call_count: Arc<Mutex<usize>>,

    /// Content that has been delivered (for verification)
    pub delivered_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            service: "mock".to_string(),
            deliver_succeeds: true,
            deliver_error: None,
            self_test_succeeds: true,
            delay: Duration::from_millis(0),
            deliver_call_count: Arc::new(Mutex::new(0)),
            delivered_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for testing
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock publisher that always delivers
    pub fn success(service: &str) -> Self {
        Self::new(MockConfig {
            service: service.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock publisher that fails every delivery
    pub fn delivery_failure(service: &str, error: &str) -> Self {
        Self::new(MockConfig {
            service: service.to_string(),
            deliver_succeeds: false,
            deliver_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock publisher whose self test fails
    pub fn unhealthy(service: &str) -> Self {
        Self::new(MockConfig {
            service: service.to_string(),
            self_test_succeeds: false,
            ..Default::default()
        })
    }

    /// Create a mock publisher with a delay
    pub fn with_delay(service: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            service: service.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Shared handles so a test can inspect calls after the publisher
    /// has been boxed away.
    pub fn handles(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        (
            self.config.deliver_call_count.clone(),
            self.config.delivered_content.clone(),
        )
    }

    /// Get the number of times deliver was called
    pub fn deliver_call_count(&self) -> usize {
        *self.config.deliver_call_count.lock().unwrap()
    }

    /// Get all content that was delivered
    pub fn delivered_content(&self) -> Vec<String> {
        self.config.delivered_content.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn service(&self) -> &str {
        &self.config.service
    }

    async fn deliver(&self, post: &Post) -> Result<String> {
        *self.config.deliver_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.deliver_succeeds {
            self.config
                .delivered_content
                .lock()
                .unwrap()
                .push(post.content.clone());
            Ok(format!("{}:mock-{}", self.config.service, post.id))
        } else {
            let error_msg = self
                .config
                .deliver_error
                .clone()
                .unwrap_or_else(|| "Mock delivery failed".to_string());
            Err(PublisherError::Delivery(error_msg).into())
        }
    }

    async fn self_test(&self) -> Result<()> {
        if self.config.self_test_succeeds {
            Ok(())
        } else {
            Err(PublisherError::SelfTest(format!(
                "{} reports unhealthy",
                self.config.service
            ))
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let publisher = MockPublisher::success("test");
        assert_eq!(publisher.service(), "test");

        let post = Post::new("ama", "Test content".to_string());
        let receipt = publisher.deliver(&post).await.unwrap();
        assert!(receipt.starts_with("test:mock-"));
        assert_eq!(publisher.deliver_call_count(), 1);

        let delivered = publisher.delivered_content();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], "Test content");
    }

    #[tokio::test]
    async fn test_mock_delivery_failure() {
        let publisher = MockPublisher::delivery_failure("test", "Network error");

        let post = Post::new("ama", "Test content".to_string());
        let result = publisher.deliver(&post).await;
        assert!(result.is_err());
        assert_eq!(publisher.deliver_call_count(), 1);
        assert!(publisher.delivered_content().is_empty());

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Network error"));
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let publisher = MockPublisher::with_delay("test", Duration::from_millis(50));

        let post = Post::new("ama", "Test".to_string());
        let start = std::time::Instant::now();
        publisher.deliver(&post).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_unhealthy_self_test() {
        let publisher = MockPublisher::unhealthy("test");
        let result = publisher.self_test().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unhealthy"));
    }

    #[tokio::test]
    async fn test_handles_survive_boxing() {
        let publisher = MockPublisher::success("test");
        let (calls, content) = publisher.handles();
        let boxed: Box<dyn Publisher> = Box::new(publisher);

        let post = Post::new("ama", "boxed delivery".to_string());
        boxed.deliver(&post).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(content.lock().unwrap().as_slice(), ["boxed delivery"]);
    }
}
