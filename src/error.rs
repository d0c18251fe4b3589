//! Error types for the relay core

use crate::core::RSymbol;
use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported chain type: {0}")]
    UnsupportedChainType(String),

    #[error("Symbol {symbol} is configured more than once")]
    DuplicateSymbol { symbol: RSymbol },

    #[error("Failed to initialize chain {name}: {message}")]
    ChainInit { name: String, message: String },

    #[error("Failed to start chain {symbol}: {source}")]
    ChainStart {
        symbol: RSymbol,
        #[source]
        source: Box<RelayerError>,
    },

    #[error("Unknown destination symbol: {symbol}")]
    DestinationNotFound { symbol: RSymbol },

    #[error("Query {reason} was dropped without a reply")]
    ReplyDropped { reason: String },

    #[error("Blockstore error: {0}")]
    Blockstore(#[from] std::io::Error),

    #[error("Blockstore: {0} parse to number err")]
    BlockParse(String),

    #[error("No threshold configured for pool {pool}")]
    UnknownPool { pool: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Address error: {0}")]
    Address(String),

    #[error("Fatal error reported by {origin}: {message}")]
    Fatal { origin: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    /// Build a fatal error attributed to a connector
    pub fn fatal(origin: impl Into<String>, message: impl Into<String>) -> Self {
        RelayerError::Fatal {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Check if error should bring the whole relay down when a connector
    /// hits it after startup
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RelayerError::Fatal { .. }
                | RelayerError::Blockstore(_)
                | RelayerError::BlockParse(_)
                | RelayerError::Internal(_)
        )
    }

    /// Routing failures are reported back to the sender only
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            RelayerError::DestinationNotFound { .. } | RelayerError::ReplyDropped { .. }
        )
    }
}

impl From<bech32::Error> for RelayerError {
    fn from(e: bech32::Error) -> Self {
        RelayerError::Address(e.to_string())
    }
}

/// Result type for relay operations
pub type RelayerResult<T> = Result<T, RelayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let not_found = RelayerError::DestinationNotFound {
            symbol: RSymbol::from("ATOM"),
        };
        assert!(not_found.is_routing());
        assert!(!not_found.is_fatal());

        let fatal = RelayerError::fatal("cosmos", "rpc unreachable");
        assert!(fatal.is_fatal());
        assert_eq!(
            fatal.to_string(),
            "Fatal error reported by cosmos: rpc unreachable"
        );
    }

    #[test]
    fn test_chain_start_keeps_cause() {
        let err = RelayerError::ChainStart {
            symbol: RSymbol::from("FIS"),
            source: Box::new(RelayerError::Internal("boom".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Failed to start chain FIS: Internal error: boom"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
