//! Threshold bookkeeping for multisig proposals
//!
//! Partial signatures are kept per proposal id until the pool's threshold
//! is reached. Each proposal yields at most one [`EventSignatureEnough`].

use crate::core::message::{EventSignatureEnough, ParamSubmitSignature};
use crate::error::{RelayerError, RelayerResult};

use dashmap::DashMap;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Proposal {
    /// Distinct signatures in arrival order
    signatures: Vec<Vec<u8>>,
    emitted: bool,
}

/// Collects partial signatures until a pool threshold is met
#[derive(Debug, Default)]
pub struct SignatureCollector {
    /// Pool address -> required signatures
    thresholds: DashMap<String, u32>,
    /// Proposal id -> collected signatures
    proposals: DashMap<String, Proposal>,
}

impl SignatureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_threshold(&self, pool: impl Into<String>, threshold: u32) {
        self.thresholds.insert(pool.into(), threshold);
    }

    pub fn threshold(&self, pool: &str) -> Option<u32> {
        self.thresholds.get(pool).map(|t| *t)
    }

    /// Record a signature. Returns the event exactly once, when the
    /// threshold is first reached; duplicates and late signatures are
    /// ignored. Signatures are compared by their decoded bytes.
    pub fn submit(&self, param: &ParamSubmitSignature) -> RelayerResult<Option<EventSignatureEnough>> {
        let threshold = match self.threshold(&param.pool) {
            Some(t) if t > 0 => t,
            _ => {
                return Err(RelayerError::UnknownPool {
                    pool: param.pool.clone(),
                })
            }
        };
        let signature = hex::decode(&param.signature)
            .map_err(|e| RelayerError::InvalidSignature(format!("{}: {}", param.prop_id, e)))?;

        let mut proposal = self.proposals.entry(param.prop_id.clone()).or_default();
        if proposal.emitted {
            debug!("Late signature for proposal {} ignored", param.prop_id);
            return Ok(None);
        }
        if proposal.signatures.contains(&signature) {
            return Ok(None);
        }
        proposal.signatures.push(signature);

        if (proposal.signatures.len() as u32) < threshold {
            return Ok(None);
        }
        proposal.emitted = true;

        info!(
            "Signatures enough for proposal {} pool {}: {}/{}",
            param.prop_id,
            param.pool,
            proposal.signatures.len(),
            threshold
        );

        Ok(Some(EventSignatureEnough {
            denom: param.denom.clone(),
            era: param.era,
            pool: param.pool.clone(),
            tx_type: param.tx_type,
            proposal_id: param.prop_id.clone(),
            signatures: proposal.signatures.clone(),
            threshold,
        }))
    }

    /// Signatures collected so far for a proposal
    pub fn signatures(&self, prop_id: &str) -> Vec<String> {
        self.proposals
            .get(prop_id)
            .map(|p| p.signatures.iter().map(hex::encode).collect())
            .unwrap_or_default()
    }

    pub fn is_complete(&self, prop_id: &str) -> bool {
        self.proposals.get(prop_id).map(|p| p.emitted).unwrap_or(false)
    }

    /// Drop bookkeeping for a finished proposal
    pub fn forget(&self, prop_id: &str) {
        self.proposals.remove(prop_id);
    }
}
