use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a (chain, asset) pair, used as the routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RSymbol(Arc<str>);

impl RSymbol {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(Arc::from(symbol.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RSymbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RSymbol {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl AsRef<str> for RSymbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
