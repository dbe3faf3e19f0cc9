//! Console publisher
//!
//! Writes each delivered post to stdout. Mostly for local fleets and
//! debugging a bot's output without touching any real service.

use async_trait::async_trait;

use crate::error::Result;
use crate::publishers::Publisher;
use crate::types::Post;

pub struct ConsolePublisher {
    service: String,
}

impl ConsolePublisher {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

#[async_trait]
impl Publisher for ConsolePublisher {
    fn service(&self) -> &str {
        &self.service
    }

    async fn deliver(&self, post: &Post) -> Result<String> {
        println!("{}", post.content);
        Ok(format!("console#{}", post.id))
    }

    async fn self_test(&self) -> Result<()> {
        Ok(())
    }
}
