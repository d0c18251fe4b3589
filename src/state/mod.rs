//! Cursor persistence for restart recovery
//!
//! Handles:
//! - Last processed block per (relayer, chain) pair
//! - Last broadcast signature for signature-driven chains

mod blockstore;

pub use blockstore::{Blockstore, Blockstorer, EmptyStore, PATH_POSTFIX};
