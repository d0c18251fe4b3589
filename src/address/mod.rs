//! Bech32 address prefixes shared by the connectors
//!
//! Encoding and decoding take an explicit [`Bech32Prefixes`] value. For
//! code paths that only work against an ambient configuration, the
//! process-wide [`AddressContext`] installs prefixes under a lock and hands
//! out a [`PrefixGuard`]; the lock is released when the guard drops.

use crate::error::{RelayerError, RelayerResult};

use bech32::{FromBase32, ToBase32, Variant};
use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::Deref;

/// How the six prefixes are derived from a chain's base prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixScheme {
    /// `cosmos`, `cosmospub`, `cosmosvaloper`, ...
    #[default]
    Suffixed,
    /// Single-letter components: `iaa`, `iap`, `iva`, `ivp`, `ica`, `icp`
    Compact,
}

impl PrefixScheme {
    pub fn derive(&self, base: &str) -> Bech32Prefixes {
        match self {
            PrefixScheme::Suffixed => Bech32Prefixes {
                account: base.to_string(),
                account_pub: format!("{}pub", base),
                validator: format!("{}valoper", base),
                validator_pub: format!("{}valoperpub", base),
                consensus: format!("{}valcons", base),
                consensus_pub: format!("{}valconspub", base),
            },
            PrefixScheme::Compact => Bech32Prefixes {
                account: format!("{}aa", base),
                account_pub: format!("{}ap", base),
                validator: format!("{}va", base),
                validator_pub: format!("{}vp", base),
                consensus: format!("{}ca", base),
                consensus_pub: format!("{}cp", base),
            },
        }
    }
}

/// Human readable parts used for one chain's addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bech32Prefixes {
    pub account: String,
    pub account_pub: String,
    pub validator: String,
    pub validator_pub: String,
    pub consensus: String,
    pub consensus_pub: String,
}

impl Bech32Prefixes {
    /// Prefixes derived with the common suffix scheme
    pub fn new(base: &str) -> Self {
        PrefixScheme::Suffixed.derive(base)
    }

    pub fn encode_account(&self, bytes: &[u8]) -> RelayerResult<String> {
        encode(&self.account, bytes)
    }

    pub fn encode_account_pub(&self, bytes: &[u8]) -> RelayerResult<String> {
        encode(&self.account_pub, bytes)
    }

    pub fn encode_validator(&self, bytes: &[u8]) -> RelayerResult<String> {
        encode(&self.validator, bytes)
    }

    pub fn encode_consensus(&self, bytes: &[u8]) -> RelayerResult<String> {
        encode(&self.consensus, bytes)
    }

    pub fn decode_account(&self, address: &str) -> RelayerResult<Vec<u8>> {
        decode(&self.account, address)
    }

    pub fn decode_validator(&self, address: &str) -> RelayerResult<Vec<u8>> {
        decode(&self.validator, address)
    }

    pub fn decode_consensus(&self, address: &str) -> RelayerResult<Vec<u8>> {
        decode(&self.consensus, address)
    }
}

fn encode(hrp: &str, bytes: &[u8]) -> RelayerResult<String> {
    Ok(bech32::encode(hrp, bytes.to_base32(), Variant::Bech32)?)
}

fn decode(expected_hrp: &str, address: &str) -> RelayerResult<Vec<u8>> {
    let (hrp, data, _) = bech32::decode(address)?;
    if hrp != expected_hrp {
        return Err(RelayerError::Address(format!(
            "invalid prefix {}, expected {}",
            hrp, expected_hrp
        )));
    }
    Ok(Vec::<u8>::from_base32(&data)?)
}

/// Prefix scheme per chain id, falling back to [`PrefixScheme::Suffixed`]
#[derive(Debug, Clone, Default)]
pub struct PrefixRegistry {
    schemes: HashMap<String, PrefixScheme>,
}

impl PrefixRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chain_id: impl Into<String>, scheme: PrefixScheme) {
        self.schemes.insert(chain_id.into(), scheme);
    }

    pub fn scheme_for(&self, chain_id: &str) -> PrefixScheme {
        self.schemes.get(chain_id).copied().unwrap_or_default()
    }

    pub fn derive(&self, chain_id: &str, base: &str) -> Bech32Prefixes {
        self.scheme_for(chain_id).derive(base)
    }
}

lazy_static! {
    static ref GLOBAL_CONTEXT: AddressContext = AddressContext::new();
}

/// Process-wide installed prefixes, mutated only under its lock
pub struct AddressContext {
    installed: Mutex<Bech32Prefixes>,
}

impl AddressContext {
    pub fn new() -> Self {
        Self {
            installed: Mutex::new(Bech32Prefixes::default()),
        }
    }

    pub fn global() -> &'static AddressContext {
        &GLOBAL_CONTEXT
    }

    /// Install the suffix-derived prefixes for `base` and keep them until
    /// the guard drops. Blocks while another guard is alive.
    pub fn with_prefix(&self, base: &str) -> PrefixGuard<'_> {
        self.with_scheme(base, PrefixScheme::Suffixed)
    }

    pub fn with_scheme(&self, base: &str, scheme: PrefixScheme) -> PrefixGuard<'_> {
        let mut installed = self.installed.lock();
        *installed = scheme.derive(base);
        PrefixGuard { installed }
    }

    /// Install the prefixes `registry` derives for `chain_id`
    pub fn with_chain(
        &self,
        registry: &PrefixRegistry,
        chain_id: &str,
        base: &str,
    ) -> PrefixGuard<'_> {
        self.with_scheme(base, registry.scheme_for(chain_id))
    }

    /// Snapshot of the installed prefixes
    pub fn current(&self) -> Bech32Prefixes {
        self.installed.lock().clone()
    }
}

impl Default for AddressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive use of the installed prefixes.
///
/// The guard is `!Send`, so it cannot be held across an `.await` in a
/// spawned task; encode and decode while holding it, then drop it.
pub struct PrefixGuard<'a> {
    installed: MutexGuard<'a, Bech32Prefixes>,
}

impl Deref for PrefixGuard<'_> {
    type Target = Bech32Prefixes;

    fn deref(&self) -> &Self::Target {
        &self.installed
    }
}
