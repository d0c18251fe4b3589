//! Chain module - connector construction and connector-side helpers
//!
//! This module provides:
//! - The registry mapping a configured chain type to its connector
//! - Assembly of a supervisor from settings
//! - Threshold signature bookkeeping used by connectors
//! - The in-process loopback connector

pub mod loopback;
pub mod signatures;

pub use loopback::LoopbackChain;
pub use signatures::SignatureCollector;

use crate::config::{RawChainConfig, Settings};
use crate::core::{fatal_error_channel, Chain, Core};
use crate::error::{RelayerError, RelayerResult};

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{info, info_span};

/// Builds an uninitialized connector
pub type ChainFactory = fn() -> Box<dyn Chain>;

/// Connector implementations indexed by chain type
#[derive(Clone, Default)]
pub struct ChainRegistry {
    factories: BTreeMap<String, ChainFactory>,
}

impl ChainRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the connectors shipped with this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(loopback::CHAIN_TYPE, || {
            Box::new(LoopbackChain::new()) as Box<dyn Chain>
        });
        registry
    }

    pub fn register(&mut self, chain_type: &str, factory: ChainFactory) {
        self.factories.insert(chain_type.to_string(), factory);
    }

    pub fn supported(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(&self, chain_type: &str) -> RelayerResult<Box<dyn Chain>> {
        self.factories
            .get(chain_type)
            .map(|factory| factory())
            .ok_or_else(|| RelayerError::UnsupportedChainType(chain_type.to_string()))
    }

    /// Create and initialize the connector for one chain
    pub async fn build(
        &self,
        cfg: &RawChainConfig,
        sys_err: mpsc::Sender<RelayerError>,
    ) -> RelayerResult<Box<dyn Chain>> {
        let mut chain = self.create(&cfg.chain_type)?;
        let span = info_span!("chain", name = %cfg.name, symbol = %cfg.rsymbol);

        chain
            .initialize(cfg, span, sys_err)
            .await
            .map_err(|e| RelayerError::ChainInit {
                name: cfg.name.clone(),
                message: e.to_string(),
            })?;

        info!("Chain {} ({}) initialized", cfg.name, cfg.rsymbol);
        Ok(chain)
    }

    /// Build every configured chain and register it with a new supervisor.
    ///
    /// Nothing is registered if any chain fails to initialize.
    pub async fn assemble(&self, settings: &Settings) -> RelayerResult<Core> {
        let chains = settings.chains();
        for cfg in &chains {
            if !self.factories.contains_key(&cfg.chain_type) {
                return Err(RelayerError::UnsupportedChainType(cfg.chain_type.clone()));
            }
        }

        let (sys_err, errors) = fatal_error_channel();
        let mut built = Vec::with_capacity(chains.len());
        for cfg in &chains {
            built.push(self.build(cfg, sys_err.clone()).await?);
        }

        let mut core = Core::new(errors);
        for chain in built {
            core.add_chain(chain);
        }
        Ok(core)
    }
}
