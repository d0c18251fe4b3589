//! Configuration management for the relay
//!
//! Loads a JSON configuration with environment variable substitution. Two
//! layouts are accepted: a fixed native/external chain pair, or an open
//! `chains` list.

use crate::core::RSymbol;
use crate::error::{RelayerError, RelayerResult};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

lazy_static! {
    static ref ENV_VAR: regex::Regex =
        regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub blockstore_path: Option<PathBuf>,
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub native_chain: Option<RawChainConfig>,
    #[serde(default)]
    pub external_chain: Option<RawChainConfig>,
    #[serde(default)]
    pub chains: Vec<RawChainConfig>,
}

/// Per-chain configuration, parsed from the config file and handed to the
/// matching connector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChainConfig {
    pub name: String,
    /// Connector type, selects the implementation in the chain registry
    #[serde(rename = "type", default)]
    pub chain_type: String,
    pub rsymbol: String,
    /// RPC endpoints, a single string or a list
    #[serde(
        rename = "endpoint",
        alias = "endpoints",
        default,
        deserialize_with = "string_or_list"
    )]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub keystore_path: String,
    /// Use the test keyring
    #[serde(default)]
    pub insecure: bool,
    /// Start from the current block, ignoring the blockstore
    #[serde(default)]
    pub latest_block_flag: bool,
    /// Connector specific options, decoded by the connector itself
    #[serde(default)]
    pub opts: serde_json::Value,
}

impl RawChainConfig {
    pub fn symbol(&self) -> RSymbol {
        RSymbol::from(self.rsymbol.as_str())
    }

    /// Decode the opaque options into the connector's own option type
    pub fn decode_opts<T: DeserializeOwned>(&self) -> RelayerResult<T> {
        let opts = if self.opts.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.opts.clone()
        };
        serde_json::from_value(opts)
            .map_err(|e| RelayerError::Config(format!("chain {} opts: {}", self.name, e)))
    }

    /// Set an option unless the config file already provides it
    fn default_opt(&mut self, key: &str, value: serde_json::Value) {
        if self.opts.is_null() {
            self.opts = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = self.opts.as_object_mut() {
            map.entry(key.to_string()).or_insert(value);
        }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl Settings {
    /// Load settings from a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            anyhow::bail!("Unrecognized config extension: {:?}", path);
        }

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let settings = Self::from_json(&config_str)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(settings)
    }

    /// Parse settings from JSON text
    pub fn from_json(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            serde_json::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        let pair = self.native_chain.is_some() || self.external_chain.is_some();
        if pair && !self.chains.is_empty() {
            anyhow::bail!("Use either nativeChain/externalChain or chains, not both");
        }
        if pair && (self.native_chain.is_none() || self.external_chain.is_none()) {
            anyhow::bail!("nativeChain and externalChain must be configured together");
        }

        let chains = self.chains();
        if chains.is_empty() {
            anyhow::bail!("At least one chain must be configured");
        }

        let mut seen = HashSet::new();
        for chain in &chains {
            if chain.rsymbol.is_empty() {
                anyhow::bail!("Chain {} has no rsymbol configured", chain.name);
            }
            if chain.endpoints.is_empty() {
                anyhow::bail!("Chain {} has no endpoint configured", chain.name);
            }
            if !seen.insert(chain.rsymbol.clone()) {
                return Err(RelayerError::DuplicateSymbol {
                    symbol: chain.symbol(),
                }
                .into());
            }
            if chain.keystore_path.is_empty() {
                tracing::warn!("Chain {} has no keystore path configured", chain.name);
            }
        }

        Ok(())
    }

    /// Chains in start order, with process-wide settings folded into their opts
    pub fn chains(&self) -> Vec<RawChainConfig> {
        let mut chains = match (&self.native_chain, &self.external_chain) {
            (Some(native), Some(external)) => {
                let mut native = native.clone();
                native.default_opt(
                    "caredSymbol",
                    serde_json::Value::String(external.rsymbol.clone()),
                );
                vec![native, external.clone()]
            }
            _ => self.chains.clone(),
        };

        if let Some(path) = &self.blockstore_path {
            for chain in &mut chains {
                chain.default_opt(
                    "blockstorePath",
                    serde_json::Value::String(path.to_string_lossy().into_owned()),
                );
            }
        }

        chains
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAIR: &str = r#"{
        "blockstorePath": "/tmp/blockstore",
        "logFilePath": "/tmp/log",
        "nativeChain": {
            "name": "stafihub",
            "type": "loopback",
            "rsymbol": "FIS",
            "endpoint": "http://127.0.0.1:26657",
            "keystorePath": "./keys/stafihub",
            "opts": { "chainID": "stafihub-1" }
        },
        "externalChain": {
            "name": "cosmoshub",
            "type": "loopback",
            "rsymbol": "ATOM",
            "endpoint": ["http://a:26657", "http://b:26657"],
            "keystorePath": "./keys/cosmos"
        }
    }"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_pair_layout() {
        let settings = Settings::from_json(PAIR).unwrap();
        let chains = settings.chains();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].symbol(), RSymbol::from("FIS"));
        assert_eq!(chains[1].endpoints, vec!["http://a:26657", "http://b:26657"]);
        assert_eq!(chains[0].endpoints, vec!["http://127.0.0.1:26657"]);

        assert_eq!(chains[0].opts["caredSymbol"], json!("ATOM"));
        assert_eq!(chains[0].opts["chainID"], json!("stafihub-1"));
        assert_eq!(chains[1].opts["blockstorePath"], json!("/tmp/blockstore"));
        assert!(chains[1].opts.get("caredSymbol").is_none());
    }

    #[test]
    fn test_list_layout() {
        let settings = Settings::from_json(
            r#"{ "chains": [
                { "name": "a", "type": "loopback", "rsymbol": "A", "endpoint": "http://a" },
                { "name": "b", "type": "loopback", "rsymbol": "B", "endpoints": ["http://b"] }
            ] }"#,
        )
        .unwrap();
        let symbols: Vec<_> = settings.chains().iter().map(|c| c.symbol()).collect();
        assert_eq!(symbols, vec![RSymbol::from("A"), RSymbol::from("B")]);
        assert!(settings.metrics_port.is_none());
    }

    #[test]
    fn test_validation_errors() {
        assert!(Settings::from_json(r#"{ "chains": [] }"#).is_err());

        let duplicate = r#"{ "chains": [
            { "name": "a", "rsymbol": "A", "endpoint": "http://a" },
            { "name": "b", "rsymbol": "A", "endpoint": "http://b" }
        ] }"#;
        let err = Settings::from_json(duplicate).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let no_endpoint = r#"{ "chains": [ { "name": "a", "rsymbol": "A", "endpoint": "" } ] }"#;
        assert!(Settings::from_json(no_endpoint).is_err());

        let half_pair = r#"{ "nativeChain": { "name": "a", "rsymbol": "A", "endpoint": "http://a" } }"#;
        assert!(Settings::from_json(half_pair).is_err());
    }

    #[test]
    fn test_load_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let toml = dir.path().join("config.toml");
        std::fs::write(&toml, PAIR).unwrap();
        assert!(Settings::load(&toml).is_err());

        let json = dir.path().join("config.json");
        std::fs::write(&json, PAIR).unwrap();
        assert_eq!(Settings::load(&json).unwrap().chains().len(), 2);
    }

    #[test]
    fn test_decode_opts() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Opts {
            #[serde(default)]
            cared_symbol: String,
        }

        let settings = Settings::from_json(PAIR).unwrap();
        let chains = settings.chains();
        let opts: Opts = chains[0].decode_opts().unwrap();
        assert_eq!(opts.cared_symbol, "ATOM");

        let empty = RawChainConfig::default();
        let opts: Opts = empty.decode_opts().unwrap();
        assert!(opts.cared_symbol.is_empty());
    }
}
