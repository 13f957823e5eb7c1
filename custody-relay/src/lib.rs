//! # custody-relay
//!
//! External event relay for custody ledgers.
//!
//! This crate provides:
//! - Configuration loading (defaults, YAML file, environment overrides)
//! - Downstream publishers addressed by channel identifier and credential
//! - The at-least-once forwarding loop over a ledger event cursor

pub mod config;
pub mod publisher;
pub mod relay;

pub use config::{Config, ConfigError, LedgerConfig, RelayConfig};
pub use publisher::{Envelope, LogPublisher, MemoryPublisher, PublishError, Publisher, TcpPublisher};
pub use relay::EventRelay;
