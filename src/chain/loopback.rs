//! In-process reference connector
//!
//! Keeps its ledger in memory: answers the query family from configured
//! pools and recorded bonds, collects partial signatures for its pools and
//! announces `SignatureEnoughEvent` back to the submitter. Every other
//! message lands in an opt-in inbox. A ticker advances a local block
//! height and persists it through the blockstore, the way a block watcher
//! would.

use super::signatures::SignatureCollector;
use crate::address::{AddressContext, PrefixRegistry, PrefixScheme};
use crate::config::RawChainConfig;
use crate::core::ledger::{BondRecord, InterchainTxStatus};
use crate::core::message::ParamSubmitSignature;
use crate::core::{Chain, Content, Handler, Message, RSymbol, Router};
use crate::error::{RelayerError, RelayerResult};
use crate::state::{Blockstore, Blockstorer};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument, Span};

pub const CHAIN_TYPE: &str = "loopback";

/// Options read from the chain's `opts` object
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackOptions {
    #[serde(default)]
    pub denom: String,
    /// Pool address -> signature threshold
    #[serde(default)]
    pub pools: HashMap<String, u32>,
    /// Bech32 prefix the pool addresses must carry
    #[serde(default)]
    pub account_prefix: Option<String>,
    /// Chain id used to look up the prefix scheme, defaults to the chain name
    #[serde(default)]
    pub chain_id: Option<String>,
    /// Prefix derivation for this chain id, suffixed unless set
    #[serde(default)]
    pub prefix_scheme: Option<PrefixScheme>,
    #[serde(default)]
    pub blockstore_path: Option<PathBuf>,
    /// Identity used to name the blockstore file, defaults to the chain name
    #[serde(default)]
    pub relayer_id: Option<String>,
    #[serde(default)]
    pub cared_symbol: Option<String>,
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            denom: String::new(),
            pools: HashMap::new(),
            account_prefix: None,
            chain_id: None,
            prefix_scheme: None,
            blockstore_path: None,
            relayer_id: None,
            cared_symbol: None,
            start_block: 0,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Ledger shared between the connector and its router handler
struct LoopbackState {
    symbol: RSymbol,
    denom: String,
    pools: Vec<String>,
    collector: SignatureCollector,
    bond_records: DashMap<String, BondRecord>,
    tx_status: DashMap<String, InterchainTxStatus>,
    /// Installed by `take_inbox`; messages are dropped while unset
    inbox: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    handled: AtomicU64,
    latest_block: AtomicU64,
}

impl LoopbackState {
    fn new(symbol: RSymbol, opts: &LoopbackOptions) -> Self {
        let collector = SignatureCollector::new();
        let mut pools: Vec<String> = opts.pools.keys().cloned().collect();
        pools.sort();
        for (pool, threshold) in &opts.pools {
            collector.set_threshold(pool.clone(), *threshold);
        }

        Self {
            symbol,
            denom: opts.denom.clone(),
            pools,
            collector,
            bond_records: DashMap::new(),
            tx_status: DashMap::new(),
            inbox: Mutex::new(None),
            handled: AtomicU64::new(0),
            latest_block: AtomicU64::new(opts.start_block),
        }
    }
}

/// Reference connector that never leaves the process
pub struct LoopbackChain {
    name: String,
    symbol: RSymbol,
    opts: LoopbackOptions,
    latest_block_flag: bool,
    state: Arc<LoopbackState>,
    router: Option<Arc<Router>>,
    sys_err: Option<mpsc::Sender<RelayerError>>,
    blockstore: Option<Blockstore>,
    shutdown: watch::Sender<bool>,
    span: Span,
}

impl LoopbackChain {
    pub fn new() -> Self {
        let opts = LoopbackOptions::default();
        let (shutdown, _) = watch::channel(false);

        Self {
            name: String::new(),
            symbol: RSymbol::from(""),
            state: Arc::new(LoopbackState::new(RSymbol::from(""), &opts)),
            opts,
            latest_block_flag: false,
            router: None,
            sys_err: None,
            blockstore: None,
            shutdown,
            span: Span::none(),
        }
    }

    /// Receiver for every message not answered by the connector itself.
    /// Available once per initialization; call it after `initialize`.
    /// Without it such messages are only logged.
    pub fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<Message>> {
        let mut inbox = self.state.inbox.lock();
        if inbox.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *inbox = Some(tx);
        Some(rx)
    }

    /// Number of messages fully handled so far
    pub fn handled(&self) -> u64 {
        self.state.handled.load(Ordering::SeqCst)
    }

    pub fn latest_block(&self) -> u64 {
        self.state.latest_block.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &LoopbackOptions {
        &self.opts
    }
}

impl Default for LoopbackChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Every configured pool must decode under the chain's account prefix
fn validate_pools(
    registry: &PrefixRegistry,
    chain_id: &str,
    prefix: &str,
    pools: &[String],
) -> RelayerResult<()> {
    let prefixes = AddressContext::global().with_chain(registry, chain_id, prefix);
    for pool in pools {
        prefixes.decode_account(pool)?;
    }
    Ok(())
}

#[async_trait]
impl Chain for LoopbackChain {
    async fn initialize(
        &mut self,
        cfg: &RawChainConfig,
        span: Span,
        sys_err: mpsc::Sender<RelayerError>,
    ) -> RelayerResult<()> {
        let opts: LoopbackOptions = cfg.decode_opts()?;
        if opts.poll_interval_ms == 0 {
            return Err(RelayerError::Config(format!(
                "chain {}: pollIntervalMs must be positive",
                cfg.name
            )));
        }
        for (pool, threshold) in &opts.pools {
            if *threshold == 0 {
                return Err(RelayerError::Config(format!(
                    "pool threshold is zero, pool: {}",
                    pool
                )));
            }
        }
        if let Some(prefix) = &opts.account_prefix {
            let chain_id = opts.chain_id.clone().unwrap_or_else(|| cfg.name.clone());
            let mut registry = PrefixRegistry::new();
            if let Some(scheme) = opts.prefix_scheme {
                registry.register(chain_id.clone(), scheme);
            }
            let pools: Vec<String> = opts.pools.keys().cloned().collect();
            validate_pools(&registry, &chain_id, prefix, &pools)?;
        }

        self.blockstore = match &opts.blockstore_path {
            Some(path) => {
                let relayer = opts.relayer_id.clone().unwrap_or_else(|| cfg.name.clone());
                Some(Blockstore::new(Some(path.clone()), &cfg.rsymbol, &relayer)?)
            }
            None => None,
        };

        self.name = cfg.name.clone();
        self.symbol = cfg.symbol();
        self.latest_block_flag = cfg.latest_block_flag;
        self.state = Arc::new(LoopbackState::new(cfg.symbol(), &opts));
        self.opts = opts;
        self.sys_err = Some(sys_err);

        span.in_scope(|| {
            info!(
                "Initialized loopback chain {} with {} pools",
                self.symbol,
                self.state.pools.len()
            )
        });
        self.span = span;
        Ok(())
    }

    async fn start(&self) -> RelayerResult<()> {
        let router = self
            .router
            .clone()
            .ok_or_else(|| RelayerError::Internal(format!("router not set for {}", self.symbol)))?;

        router
            .listen(
                self.symbol.clone(),
                Arc::new(LoopbackHandler {
                    state: self.state.clone(),
                    router: router.clone(),
                }),
            )
            .await;

        let start_block = match &self.blockstore {
            Some(bs) if !self.latest_block_flag => bs.resume_block(self.opts.start_block).await?,
            _ => self.opts.start_block,
        };
        self.state.latest_block.store(start_block, Ordering::SeqCst);
        info!("Chain {} resuming from block {}", self.symbol, start_block);

        let state = self.state.clone();
        let blockstore = self.blockstore.clone();
        let sys_err = self.sys_err.clone();
        let name = self.name.clone();
        let mut shutdown = self.shutdown.subscribe();
        let poll_interval = Duration::from_millis(self.opts.poll_interval_ms);

        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = async {
                            let _ = shutdown.wait_for(|stopped| *stopped).await;
                        } => break,
                        _ = router.stopped() => break,
                        _ = ticker.tick() => {
                            let block = state.latest_block.fetch_add(1, Ordering::SeqCst) + 1;
                            let Some(bs) = &blockstore else { continue };
                            let Err(e) = bs.store_block(block).await else { continue };
                            if !e.is_fatal() {
                                warn!("Failed to save block {}: {}", block, e);
                                continue;
                            }
                            error!("Failed to save block {}: {}", block, e);
                            if let Some(sys_err) = &sys_err {
                                let _ = sys_err.send(RelayerError::fatal(&name, e.to_string())).await;
                            }
                            break;
                        }
                    }
                }
                debug!("Block ticker stopped");
            }
            .instrument(self.span.clone()),
        );

        Ok(())
    }

    fn set_router(&mut self, router: Arc<Router>) {
        self.router = Some(router);
    }

    fn rsymbol(&self) -> RSymbol {
        self.symbol.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Loopback chain {} stopping", self.symbol);
        }
    }
}

struct LoopbackHandler {
    state: Arc<LoopbackState>,
    router: Arc<Router>,
}

impl LoopbackHandler {
    async fn handle_signature(&self, source: RSymbol, param: ParamSubmitSignature) {
        let finished = self
            .state
            .tx_status
            .get(&param.prop_id)
            .map(|s| *s == InterchainTxStatus::Success)
            .unwrap_or(false);
        if finished {
            debug!("Proposal {} already announced", param.prop_id);
            return;
        }

        let event = match self.state.collector.submit(&param) {
            Ok(Some(event)) => event,
            Ok(None) => {
                let status = *self
                    .state
                    .tx_status
                    .entry(param.prop_id.clone())
                    .or_insert(InterchainTxStatus::Init);
                // announced while this signature was being collected
                if status == InterchainTxStatus::Success {
                    self.state.collector.forget(&param.prop_id);
                }
                return;
            }
            Err(e) => {
                warn!("Rejected signature for proposal {}: {}", param.prop_id, e);
                return;
            }
        };

        // the status entry keeps late signatures from opening a new round
        self.state
            .tx_status
            .insert(param.prop_id.clone(), InterchainTxStatus::Success);
        self.state.collector.forget(&param.prop_id);

        let msg = Message::new(self.state.symbol.clone(), source, Content::SignatureEnough(event));
        match self.router.send(msg).await {
            Ok(()) => {}
            Err(e) if e.is_routing() => {
                warn!("Failed to announce signatures for {}: {}", param.prop_id, e)
            }
            Err(e) => error!("Failed to announce signatures for {}: {}", param.prop_id, e),
        }
    }
}

#[async_trait]
impl Handler for LoopbackHandler {
    async fn handle_message(&self, msg: Message) {
        let Message {
            source,
            destination,
            content,
        } = msg;

        match content {
            Content::GetPools(param) => {
                let pools = if param.denom == self.state.denom {
                    self.state.pools.clone()
                } else {
                    Vec::new()
                };
                param.pools.send(pools);
            }
            Content::GetSignatures(param) => {
                param.sigs.send(self.state.collector.signatures(&param.prop_id));
            }
            Content::GetBondRecord(param) => {
                let record = self
                    .state
                    .bond_records
                    .get(&param.tx_hash)
                    .filter(|r| r.denom == param.denom)
                    .map(|r| r.value().clone());
                param.bond_record.send(record);
            }
            Content::GetInterchainTxStatus(param) => {
                let status = self
                    .state
                    .tx_status
                    .get(&param.prop_id)
                    .map(|s| *s)
                    .unwrap_or_default();
                param.status.send(status);
            }
            Content::SubmitSignature(param) => {
                self.handle_signature(source, param).await;
            }
            content => {
                if let Content::ExeLiquidityBond(bond) = &content {
                    self.state.bond_records.insert(
                        bond.txhash.clone(),
                        BondRecord {
                            denom: bond.denom.clone(),
                            bonder: bond.bonder.clone(),
                            pool: bond.pool.clone(),
                            txhash: bond.txhash.clone(),
                            amount: bond.amount,
                            state: bond.state,
                        },
                    );
                }
                debug!("Chain {} received {} from {}", destination, content.reason(), source);
                if let Some(inbox) = self.state.inbox.lock().as_ref() {
                    let _ = inbox.send(Message::new(source, destination, content));
                }
            }
        }
        self.state.handled.fetch_add(1, Ordering::SeqCst);
    }
}
