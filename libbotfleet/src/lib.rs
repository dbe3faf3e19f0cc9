//! Botfleet - a batch engine for fleets of content-posting bots
//!
//! This library provides the core machinery for running a fleet of
//! bots: content queues, scheduling, delivery with retry, and the
//! batch entry points the fleet-* binaries wrap.

pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod logging;
pub mod orchestrator;
pub mod publishers;
pub mod recency;
pub mod republish;
pub mod scheduling;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, PostWithPublications};
pub use error::{BotfleetError, Result};
pub use orchestrator::{BotAction, BotDashboard, Fleet, PostOptions, RunReport};
pub use types::{Post, Publication, PublicationStatus};
