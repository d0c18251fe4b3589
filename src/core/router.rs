//! Message router forwarding envelopes from their source to their destination

use super::message::{Message, Reason};
use super::RSymbol;
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, RwLock};
use tracing::{debug, info, trace};

/// Consumes a message and makes the required on-chain interactions
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_message(&self, msg: Message);
}

/// Routes messages between registered chain handlers
pub struct Router {
    /// Handlers indexed by chain symbol
    registry: RwLock<HashMap<RSymbol, Arc<dyn Handler>>>,
    /// Stop signal observed by connectors
    stop: watch::Sender<bool>,
}

impl Router {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            registry: RwLock::new(HashMap::new()),
            stop,
        }
    }

    /// Register a handler for a symbol, replacing any previous one
    pub async fn listen(&self, symbol: RSymbol, handler: Arc<dyn Handler>) {
        let mut registry = self.registry.write().await;
        debug!("Registering new chain in router: {}", symbol);
        if registry.insert(symbol.clone(), handler).is_some() {
            info!("Replaced existing handler for {}", symbol);
        }
    }

    /// Hand a message to its destination handler.
    ///
    /// Returns once dispatch is scheduled; the handler runs on its own task.
    pub async fn send(&self, msg: Message) -> RelayerResult<()> {
        // Lookups are serialized with registration
        let registry = self.registry.write().await;

        let reason = msg.reason();
        if reason != Reason::NewEra {
            trace!(
                "Routing message source={} dest={} reason={}",
                msg.source,
                msg.destination,
                reason
            );
        }

        let handler = match registry.get(&msg.destination) {
            Some(handler) => handler.clone(),
            None => {
                crate::metrics::record_route_failure(&msg.destination);
                return Err(RelayerError::DestinationNotFound {
                    symbol: msg.destination,
                });
            }
        };

        crate::metrics::record_message_routed(&msg.source, &msg.destination, reason);
        tokio::spawn(async move {
            handler.handle_message(msg).await;
        });
        Ok(())
    }

    /// Send a query and wait for the handler's reply
    pub async fn send_query<T>(&self, msg: Message, reply: oneshot::Receiver<T>) -> RelayerResult<T> {
        let reason = msg.reason();
        self.send(msg).await?;
        reply.await.map_err(|_| RelayerError::ReplyDropped {
            reason: reason.to_string(),
        })
    }

    /// Signal router shutdown. In-flight dispatches are left to finish.
    pub fn stop_msg_handler(&self) {
        if !self.stop.send_replace(true) {
            info!("Router message handling stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once [`Router::stop_msg_handler`] has been called
    pub async fn stopped(&self) {
        let mut rx = self.stop.subscribe();
        // The sender lives in self, so this cannot observe a closed channel
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Symbols with a registered handler
    pub async fn symbols(&self) -> Vec<RSymbol> {
        let mut symbols: Vec<_> = self.registry.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{Content, ParamGetPools, ProposalSetChainEra, Reply};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Message>);

    #[async_trait]
    impl Handler for Forward {
        async fn handle_message(&self, msg: Message) {
            let _ = self.0.send(msg);
        }
    }

    struct PoolsAnswer;

    #[async_trait]
    impl Handler for PoolsAnswer {
        async fn handle_message(&self, msg: Message) {
            if let Content::GetPools(param) = msg.content {
                param.pools.send(vec![format!("{}-pool", param.denom)]);
            }
        }
    }

    struct Silent;

    #[async_trait]
    impl Handler for Silent {
        async fn handle_message(&self, _msg: Message) {}
    }

    fn new_era(source: &str, dest: &str, era: u32) -> Message {
        Message::new(
            RSymbol::from(source),
            RSymbol::from(dest),
            Content::NewEra(ProposalSetChainEra {
                denom: "uatom".to_string(),
                era,
            }),
        )
    }

    #[tokio::test]
    async fn test_send_delivers_exactly_once() {
        let router = Router::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.listen(RSymbol::from("ATOM"), Arc::new(Forward(tx))).await;

        router.send(new_era("FIS", "ATOM", 3)).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.source, RSymbol::from("FIS"));
        assert_eq!(msg.destination, RSymbol::from("ATOM"));
        match msg.content {
            Content::NewEra(era) => assert_eq!(era.era, 3),
            other => panic!("unexpected content: {:?}", other),
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_unknown_destination() {
        let router = Router::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.listen(RSymbol::from("ATOM"), Arc::new(Forward(tx))).await;

        let err = router.send(new_era("FIS", "DOT", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            RelayerError::DestinationNotFound { ref symbol } if symbol.as_str() == "DOT"
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listen_replaces_handler() {
        let router = Router::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        router.listen(RSymbol::from("ATOM"), Arc::new(Forward(old_tx))).await;
        router.listen(RSymbol::from("ATOM"), Arc::new(Forward(new_tx))).await;
        router.send(new_era("FIS", "ATOM", 5)).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), new_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.reason(), Reason::NewEra);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(old_rx.try_recv().is_err());
        assert_eq!(router.symbols().await, vec![RSymbol::from("ATOM")]);
    }

    #[tokio::test]
    async fn test_send_query_receives_reply() {
        let router = Router::new();
        router.listen(RSymbol::from("FIS"), Arc::new(PoolsAnswer)).await;

        let (pools, rx) = Reply::channel();
        let msg = Message::new(
            RSymbol::from("ATOM"),
            RSymbol::from("FIS"),
            Content::GetPools(ParamGetPools {
                denom: "uatom".to_string(),
                pools,
            }),
        );
        let answer = router.send_query(msg, rx).await.unwrap();
        assert_eq!(answer, vec!["uatom-pool".to_string()]);
    }

    #[tokio::test]
    async fn test_send_query_dropped_reply() {
        let router = Router::new();
        router.listen(RSymbol::from("FIS"), Arc::new(Silent)).await;

        let (pools, rx) = Reply::channel();
        let msg = Message::new(
            RSymbol::from("ATOM"),
            RSymbol::from("FIS"),
            Content::GetPools(ParamGetPools {
                denom: "uatom".to_string(),
                pools,
            }),
        );
        let err = router.send_query(msg, rx).await.unwrap_err();
        assert!(matches!(err, RelayerError::ReplyDropped { .. }));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let router = Arc::new(Router::new());
        assert!(!router.is_stopped());

        let waiter = tokio::spawn({
            let router = router.clone();
            async move { router.stopped().await }
        });

        router.stop_msg_handler();
        router.stop_msg_handler();
        assert!(router.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
