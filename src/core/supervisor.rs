//! Supervisor owning the registered chains and the router

use super::{Chain, RSymbol, Router};
use crate::error::{RelayerError, RelayerResult};

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Channel used by connectors to request shutdown after a fatal error
pub fn fatal_error_channel() -> (mpsc::Sender<RelayerError>, mpsc::Receiver<RelayerError>) {
    mpsc::channel(16)
}

/// Drives the lifecycle of all registered chains
pub struct Core {
    /// Registered chains in start order
    registry: Vec<Box<dyn Chain>>,
    /// Bus shared by every chain
    router: Arc<Router>,
    /// Fatal errors reported by chains
    sys_err: mpsc::Receiver<RelayerError>,
}

impl Core {
    pub fn new(sys_err: mpsc::Receiver<RelayerError>) -> Self {
        Self {
            registry: Vec::new(),
            router: Arc::new(Router::new()),
            sys_err,
        }
    }

    /// Register a chain and bind it to the router
    pub fn add_chain(&mut self, mut chain: Box<dyn Chain>) {
        chain.set_router(self.router.clone());
        info!("Registered chain {} ({})", chain.name(), chain.rsymbol());
        self.registry.push(chain);
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Symbols of the registered chains, in registration order
    pub fn chains(&self) -> Vec<RSymbol> {
        self.registry.iter().map(|c| c.rsymbol()).collect()
    }

    /// Start every chain, then block until a fatal error or a termination
    /// signal arrives and stop them all.
    pub async fn start(&mut self) -> RelayerResult<()> {
        self.start_with_shutdown(async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!("Failed to install signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Same as [`Core::start`] with a caller supplied shutdown trigger in
    /// place of OS signals.
    ///
    /// A chain failing to start aborts the remaining startup. Chains that
    /// already started are left running.
    pub async fn start_with_shutdown<F>(&mut self, shutdown: F) -> RelayerResult<()>
    where
        F: Future<Output = ()>,
    {
        for chain in &self.registry {
            if let Err(e) = chain.start().await {
                error!("Failed to start chain {}: {}", chain.rsymbol(), e);
                return Err(RelayerError::ChainStart {
                    symbol: chain.rsymbol(),
                    source: Box::new(e),
                });
            }
            crate::metrics::record_chain_started(&chain.rsymbol());
            info!("Started {} chain", chain.name());
        }

        let fatal = self.wait(shutdown).await;

        self.router.stop_msg_handler();
        for chain in &self.registry {
            chain.stop();
            crate::metrics::record_chain_stopped(&chain.rsymbol());
            info!("Stopped {} chain", chain.name());
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn wait<F>(&mut self, shutdown: F) -> Option<RelayerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut errors_open = true;

        loop {
            tokio::select! {
                err = self.sys_err.recv(), if errors_open => match err {
                    Some(e) => {
                        error!("FATAL ERROR. Shutting down: {}", e);
                        return Some(e);
                    }
                    // Every sender is gone, only a signal can end the wait now
                    None => errors_open = false,
                },
                _ = &mut shutdown => {
                    warn!("Interrupt received, shutting down now");
                    return None;
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawChainConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct FakeChain {
        symbol: RSymbol,
        fail_start: bool,
        router: Option<Arc<Router>>,
        journal: Journal,
    }

    impl FakeChain {
        fn new(symbol: &str, fail_start: bool, journal: &Journal) -> Box<Self> {
            Box::new(Self {
                symbol: RSymbol::from(symbol),
                fail_start,
                router: None,
                journal: journal.clone(),
            })
        }

        fn note(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.symbol, event));
        }
    }

    #[async_trait]
    impl Chain for FakeChain {
        async fn initialize(
            &mut self,
            _cfg: &RawChainConfig,
            _span: tracing::Span,
            _sys_err: mpsc::Sender<RelayerError>,
        ) -> RelayerResult<()> {
            Ok(())
        }

        async fn start(&self) -> RelayerResult<()> {
            assert!(self.router.is_some(), "router must be set before start");
            if self.fail_start {
                self.note("start-failed");
                return Err(RelayerError::Internal("rpc unreachable".to_string()));
            }
            self.note("start");
            Ok(())
        }

        fn set_router(&mut self, router: Arc<Router>) {
            self.note("router");
            self.router = Some(router);
        }

        fn rsymbol(&self) -> RSymbol {
            self.symbol.clone()
        }

        fn name(&self) -> &str {
            self.symbol.as_str()
        }

        fn stop(&self) {
            self.note("stop");
        }
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_start_failure_leaves_started_chains_running() {
        let journal = Journal::default();
        let (_tx, rx) = fatal_error_channel();
        let mut core = Core::new(rx);
        core.add_chain(FakeChain::new("A", false, &journal));
        core.add_chain(FakeChain::new("B", true, &journal));
        core.add_chain(FakeChain::new("C", false, &journal));

        let err = core
            .start_with_shutdown(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RelayerError::ChainStart { ref symbol, .. } if symbol.as_str() == "B"
        ));
        assert_eq!(
            entries(&journal),
            vec!["A:router", "B:router", "C:router", "A:start", "B:start-failed"]
        );
        assert!(!core.router().is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_chains_in_order() {
        let journal = Journal::default();
        let (_tx, rx) = fatal_error_channel();
        let mut core = Core::new(rx);
        core.add_chain(FakeChain::new("FIS", false, &journal));
        core.add_chain(FakeChain::new("ATOM", false, &journal));
        assert_eq!(core.chains(), vec![RSymbol::from("FIS"), RSymbol::from("ATOM")]);

        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let router = core.router();
        let run = tokio::spawn(async move {
            core.start_with_shutdown(async {
                let _ = signal_rx.await;
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap();

        assert!(result.is_ok());
        assert!(router.is_stopped());
        assert_eq!(
            entries(&journal),
            vec![
                "FIS:router",
                "ATOM:router",
                "FIS:start",
                "ATOM:start",
                "FIS:stop",
                "ATOM:stop"
            ]
        );
    }

    #[tokio::test]
    async fn test_fatal_error_triggers_shutdown() {
        let journal = Journal::default();
        let (tx, rx) = fatal_error_channel();
        let mut core = Core::new(rx);
        core.add_chain(FakeChain::new("FIS", false, &journal));
        let router = core.router();

        let run = tokio::spawn(async move { core.start_with_shutdown(std::future::pending()).await });
        tx.send(RelayerError::fatal("FIS", "keystore locked"))
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, RelayerError::Fatal { .. }));
        assert!(router.is_stopped());
        assert_eq!(entries(&journal), vec!["FIS:router", "FIS:start", "FIS:stop"]);
    }

    #[tokio::test]
    async fn test_closed_error_channel_keeps_running() {
        let journal = Journal::default();
        let (tx, rx) = fatal_error_channel();
        drop(tx);
        let mut core = Core::new(rx);
        core.add_chain(FakeChain::new("FIS", false, &journal));

        let run = core.start_with_shutdown(std::future::pending());
        let outcome = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(outcome.is_err(), "supervisor must keep waiting for a signal");
        assert_eq!(entries(&journal), vec!["FIS:router", "FIS:start"]);
    }
}
