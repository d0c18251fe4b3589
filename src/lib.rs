//! rToken relay - cross-chain relay orchestration
//!
//! Connectors for each configured chain exchange typed messages through a
//! central router, while a supervisor starts them, watches for fatal
//! errors and termination signals, and stops them on shutdown.

pub mod address;
pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod state;

pub use crate::config::Settings;
pub use crate::error::{RelayerError, RelayerResult};
