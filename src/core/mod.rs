//! Relay core - connector supervision and message routing
//!
//! This module provides:
//! - The message envelope and the closed reason taxonomy
//! - The router that dispatches envelopes to registered handlers
//! - The chain connector contract
//! - The supervisor driving connector start and shutdown

pub mod chain;
pub mod ledger;
pub mod message;
pub mod router;
pub mod supervisor;
mod symbol;

pub use chain::Chain;
pub use message::{Content, Message, Reason, Reply};
pub use router::{Handler, Router};
pub use supervisor::{fatal_error_channel, Core};
pub use symbol::RSymbol;
