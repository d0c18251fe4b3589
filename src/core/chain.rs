//! Contract every chain connector implements

use super::{RSymbol, Router};
use crate::config::RawChainConfig;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Span;

/// Lifecycle of a connector bridging the relay to one concrete chain
#[async_trait]
pub trait Chain: Send + Sync {
    /// One-time setup: decode opts, open keystore and RPC clients.
    ///
    /// A connector whose initialization fails must not be registered.
    async fn initialize(
        &mut self,
        cfg: &RawChainConfig,
        span: Span,
        sys_err: mpsc::Sender<RelayerError>,
    ) -> RelayerResult<()>;

    /// Begin background work and return promptly
    async fn start(&self) -> RelayerResult<()>;

    /// Injected by the supervisor before `start`
    fn set_router(&mut self, router: Arc<Router>);

    fn rsymbol(&self) -> RSymbol;

    fn name(&self) -> &str;

    /// Best-effort halt of background work. Must not block and must
    /// tolerate repeated calls.
    fn stop(&self);
}
