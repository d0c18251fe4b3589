//! Ledger value types carried inside message payloads
//!
//! These mirror the hub ledger's records closely enough for connectors to
//! exchange them; the core never interprets them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Token amount in the chain's smallest unit
pub type Amount = u128;

/// Kind of on-chain operation a multisig proposal executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginalTxType {
    Default,
    Bond,
    Unbond,
    WithdrawUnbond,
    ClaimRewards,
    Transfer,
    UpdateValidator,
}

impl OriginalTxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginalTxType::Default => "default",
            OriginalTxType::Bond => "Bond",
            OriginalTxType::Unbond => "Unbond",
            OriginalTxType::WithdrawUnbond => "WithdrawUnbond",
            OriginalTxType::ClaimRewards => "ClaimRewards",
            OriginalTxType::Transfer => "Transfer",
            OriginalTxType::UpdateValidator => "UpdateValidator",
        }
    }
}

impl fmt::Display for OriginalTxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OriginalTxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(OriginalTxType::Default),
            "Bond" => Ok(OriginalTxType::Bond),
            "Unbond" => Ok(OriginalTxType::Unbond),
            "WithdrawUnbond" => Ok(OriginalTxType::WithdrawUnbond),
            "ClaimRewards" => Ok(OriginalTxType::ClaimRewards),
            "Transfer" => Ok(OriginalTxType::Transfer),
            "UpdateValidator" => Ok(OriginalTxType::UpdateValidator),
            other => Err(format!("unknown tx type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondAction {
    BondOnly,
    UnbondOnly,
    BothBondUnbond,
    EitherBondUnbond,
    InterDeduct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolBondState {
    EraUpdated,
    BondReported,
    ActiveReported,
    WithdrawSkipped,
    WithdrawReported,
    TransferReported,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondChunk {
    pub bond: Amount,
    pub unbond: Amount,
    pub active: Amount,
}

/// Pool state captured at an era boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondSnapshot {
    pub denom: String,
    pub pool: String,
    pub era: u32,
    pub chunk: BondChunk,
    pub bond_state: PoolBondState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unbonding {
    pub unbonder: String,
    pub amount: Amount,
    pub recipient: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityBondState {
    VerifyOk,
    DenomUnmatch,
    BonderUnmatch,
    PoolUnmatch,
    AmountUnmatch,
    MemoUnmatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondRecord {
    pub denom: String,
    pub bonder: String,
    pub pool: String,
    pub txhash: String,
    pub amount: Amount,
    pub state: LiquidityBondState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterchainTxStatus {
    #[default]
    Unspecified,
    Init,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RValidatorUpdateStatus {
    Unspecified,
    Success,
    Failed,
}

/// Chain message in its encoded form, opaque to the relay core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMsg {
    pub type_url: String,
    pub value: Vec<u8>,
}
