//! Message envelope and the protocol reason taxonomy
//!
//! Every payload shape is bound to exactly one reason: [`Content`] has a
//! variant per reason and [`Message::reason`] is derived from it, so an
//! envelope can never pair a reason with a foreign payload.

use super::ledger::{
    Amount, BondAction, BondRecord, BondSnapshot, EncodedMsg, InterchainTxStatus,
    LiquidityBondState, OriginalTxType, RValidatorUpdateStatus, Unbonding,
};
use super::RSymbol;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use tokio::sync::oneshot;

/// Routed envelope
#[derive(Debug)]
pub struct Message {
    pub source: RSymbol,
    pub destination: RSymbol,
    pub content: Content,
}

impl Message {
    pub fn new(source: RSymbol, destination: RSymbol, content: Content) -> Self {
        Self {
            source,
            destination,
            content,
        }
    }

    pub fn reason(&self) -> Reason {
        self.content.reason()
    }
}

/// Protocol family a reason belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonFamily {
    /// Chain state change observed by a connector
    Event,
    /// Request for a connector to act
    Command,
    /// Multisig threshold protocol
    Signature,
    /// Request carrying a reply channel
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    // commands, sent from other chains
    NewEra,
    ExeLiquidityBond,
    ExeNativeAndLsmLiquidityBond,
    BondReport,
    ActiveReport,
    WithdrawReport,
    TransferReport,
    RValidatorUpdateReport,
    InterchainTx,

    // threshold signatures
    SubmitSignature,
    SignatureEnoughEvent,

    // events observed on the hub chain
    EraPoolUpdatedEvent,
    BondReportedEvent,
    ActiveReportedEvent,
    WithdrawReportedEvent,
    TransferReportedEvent,
    RValidatorUpdatedEvent,
    RValidatorAddedEvent,
    RParamsChangedEvent,
    InitPoolEvent,
    RemovePoolEvent,

    // queries
    GetPools,
    GetSignatures,
    GetBondRecord,
    GetInterchainTxStatus,
}

impl Reason {
    pub const ALL: [Reason; 25] = [
        Reason::NewEra,
        Reason::ExeLiquidityBond,
        Reason::ExeNativeAndLsmLiquidityBond,
        Reason::BondReport,
        Reason::ActiveReport,
        Reason::WithdrawReport,
        Reason::TransferReport,
        Reason::RValidatorUpdateReport,
        Reason::InterchainTx,
        Reason::SubmitSignature,
        Reason::SignatureEnoughEvent,
        Reason::EraPoolUpdatedEvent,
        Reason::BondReportedEvent,
        Reason::ActiveReportedEvent,
        Reason::WithdrawReportedEvent,
        Reason::TransferReportedEvent,
        Reason::RValidatorUpdatedEvent,
        Reason::RValidatorAddedEvent,
        Reason::RParamsChangedEvent,
        Reason::InitPoolEvent,
        Reason::RemovePoolEvent,
        Reason::GetPools,
        Reason::GetSignatures,
        Reason::GetBondRecord,
        Reason::GetInterchainTxStatus,
    ];

    /// Wire name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NewEra => "NewEra",
            Reason::ExeLiquidityBond => "ExeLiquidityBond",
            Reason::ExeNativeAndLsmLiquidityBond => "ExeLiquidityNativeAndLsmBond",
            Reason::BondReport => "BondReport",
            Reason::ActiveReport => "ActiveReport",
            Reason::WithdrawReport => "WithdrawReport",
            Reason::TransferReport => "TransferReport",
            Reason::RValidatorUpdateReport => "RValidatorUpdateReport",
            Reason::InterchainTx => "InterchainTx",
            Reason::SubmitSignature => "SubmitSignature",
            Reason::SignatureEnoughEvent => "SignatureEnoughed",
            Reason::EraPoolUpdatedEvent => "EraPoolUpdatedEvent",
            Reason::BondReportedEvent => "BondReportedEvent",
            Reason::ActiveReportedEvent => "ActiveReportedEvent",
            Reason::WithdrawReportedEvent => "WithdrawReportedEvent",
            Reason::TransferReportedEvent => "TransferReportedEvent",
            Reason::RValidatorUpdatedEvent => "RValidatorUpdatedEvent",
            Reason::RValidatorAddedEvent => "RValidatorAddedEvent",
            Reason::RParamsChangedEvent => "RParamsChangedEvent",
            Reason::InitPoolEvent => "InitPoolEvent",
            Reason::RemovePoolEvent => "RemovePoolEvent",
            Reason::GetPools => "GetPools",
            Reason::GetSignatures => "GetSignatures",
            Reason::GetBondRecord => "GetBondRecord",
            Reason::GetInterchainTxStatus => "GetInterchainTxStatus",
        }
    }

    pub fn family(&self) -> ReasonFamily {
        match self {
            Reason::NewEra
            | Reason::ExeLiquidityBond
            | Reason::ExeNativeAndLsmLiquidityBond
            | Reason::BondReport
            | Reason::ActiveReport
            | Reason::WithdrawReport
            | Reason::TransferReport
            | Reason::RValidatorUpdateReport
            | Reason::InterchainTx => ReasonFamily::Command,
            Reason::SubmitSignature | Reason::SignatureEnoughEvent => ReasonFamily::Signature,
            Reason::GetPools
            | Reason::GetSignatures
            | Reason::GetBondRecord
            | Reason::GetInterchainTxStatus => ReasonFamily::Query,
            _ => ReasonFamily::Event,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reason::ALL
            .iter()
            .find(|r| r.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown reason: {}", s))
    }
}

/// Single-use reply slot embedded in query payloads.
///
/// `send` consumes the slot, so a handler can answer at most once.
pub struct Reply<T>(oneshot::Sender<T>);

impl<T> Reply<T> {
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Returns false if the asker stopped waiting
    pub fn send(self, value: T) -> bool {
        self.0.send(value).is_ok()
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reply")
    }
}

/// Payload of an envelope, one variant per [`Reason`]
#[derive(Debug)]
pub enum Content {
    NewEra(ProposalSetChainEra),
    ExeLiquidityBond(ProposalExeLiquidityBond),
    ExeNativeAndLsmLiquidityBond(ProposalExeNativeAndLsmLiquidityBond),
    BondReport(ProposalBondReport),
    ActiveReport(ProposalActiveReport),
    WithdrawReport(ProposalWithdrawReport),
    TransferReport(ProposalTransferReport),
    RValidatorUpdateReport(ProposalRValidatorUpdateReport),
    InterchainTx(ProposalInterchainTx),

    SubmitSignature(ParamSubmitSignature),
    SignatureEnough(EventSignatureEnough),

    EraPoolUpdated(EventEraPoolUpdated),
    BondReported(EventBondReported),
    ActiveReported(EventActiveReported),
    WithdrawReported(EventWithdrawReported),
    TransferReported(EventTransferReported),
    RValidatorUpdated(EventRValidatorUpdated),
    RValidatorAdded(EventRValidatorAdded),
    RParamsChanged(EventRParamsChanged),
    InitPool(EventInitPool),
    RemovePool(EventRemovePool),

    GetPools(ParamGetPools),
    GetSignatures(ParamGetSignatures),
    GetBondRecord(ParamGetBondRecord),
    GetInterchainTxStatus(ParamGetInterchainTxStatus),
}

impl Content {
    pub fn reason(&self) -> Reason {
        match self {
            Content::NewEra(_) => Reason::NewEra,
            Content::ExeLiquidityBond(_) => Reason::ExeLiquidityBond,
            Content::ExeNativeAndLsmLiquidityBond(_) => Reason::ExeNativeAndLsmLiquidityBond,
            Content::BondReport(_) => Reason::BondReport,
            Content::ActiveReport(_) => Reason::ActiveReport,
            Content::WithdrawReport(_) => Reason::WithdrawReport,
            Content::TransferReport(_) => Reason::TransferReport,
            Content::RValidatorUpdateReport(_) => Reason::RValidatorUpdateReport,
            Content::InterchainTx(_) => Reason::InterchainTx,
            Content::SubmitSignature(_) => Reason::SubmitSignature,
            Content::SignatureEnough(_) => Reason::SignatureEnoughEvent,
            Content::EraPoolUpdated(_) => Reason::EraPoolUpdatedEvent,
            Content::BondReported(_) => Reason::BondReportedEvent,
            Content::ActiveReported(_) => Reason::ActiveReportedEvent,
            Content::WithdrawReported(_) => Reason::WithdrawReportedEvent,
            Content::TransferReported(_) => Reason::TransferReportedEvent,
            Content::RValidatorUpdated(_) => Reason::RValidatorUpdatedEvent,
            Content::RValidatorAdded(_) => Reason::RValidatorAddedEvent,
            Content::RParamsChanged(_) => Reason::RParamsChangedEvent,
            Content::InitPool(_) => Reason::InitPoolEvent,
            Content::RemovePool(_) => Reason::RemovePoolEvent,
            Content::GetPools(_) => Reason::GetPools,
            Content::GetSignatures(_) => Reason::GetSignatures,
            Content::GetBondRecord(_) => Reason::GetBondRecord,
            Content::GetInterchainTxStatus(_) => Reason::GetInterchainTxStatus,
        }
    }
}

// === hub -> other chain

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEraPoolUpdated {
    pub denom: String,
    pub last_era: u32,
    pub current_era: u32,
    pub shot_id: String,
    pub snapshot: BondSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBondReported {
    pub denom: String,
    pub shot_id: String,
    pub snapshot: BondSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventActiveReported {
    pub denom: String,
    pub shot_id: String,
    pub snapshot: BondSnapshot,
    pub pool_unbond: Vec<Unbonding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWithdrawReported {
    pub denom: String,
    pub shot_id: String,
    pub snapshot: BondSnapshot,
    pub pool_unbond: Vec<Unbonding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTransferReported {
    pub denom: String,
    pub shot_id: String,
}

/// Emitted once the signatures collected for a proposal reach the pool threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSignatureEnough {
    pub denom: String,
    pub era: u32,
    pub pool: String,
    pub tx_type: OriginalTxType,
    pub proposal_id: String,
    pub signatures: Vec<Vec<u8>>,
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRValidatorUpdated {
    pub denom: String,
    pub pool_address: String,
    pub era: u32,
    pub old_address: String,
    pub new_address: String,
    pub cycle_version: u64,
    pub cycle_number: u64,
    pub cycle_seconds: u64,
    pub block_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRValidatorAdded {
    pub denom: String,
    pub pool_address: String,
    pub era: u32,
    pub added_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRParamsChanged {
    pub denom: String,
    pub gas_price: String,
    pub era_seconds: u32,
    pub least_bond: String,
    pub offset: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInitPool {
    pub denom: String,
    pub pool_address: String,
    pub withdrawal_address: String,
    pub host_channel_id: String,
    pub validators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRemovePool {
    pub denom: String,
    pub pool_address: String,
}

// === other chain -> hub

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalSetChainEra {
    pub denom: String,
    pub era: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExeLiquidityBond {
    pub denom: String,
    pub bonder: String,
    pub pool: String,
    pub txhash: String,
    pub amount: Amount,
    pub state: LiquidityBondState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalExeNativeAndLsmLiquidityBond {
    pub denom: String,
    pub bonder: String,
    pub pool: String,
    pub txhash: String,
    pub native_bond_amount: Amount,
    pub lsm_bond_amount: Amount,
    pub state: LiquidityBondState,
    pub msgs: Vec<EncodedMsg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBondReport {
    pub denom: String,
    pub shot_id: String,
    pub action: BondAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalActiveReport {
    pub denom: String,
    pub shot_id: String,
    pub staked: Amount,
    pub unstaked: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalWithdrawReport {
    pub denom: String,
    pub shot_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTransferReport {
    pub denom: String,
    pub shot_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRValidatorUpdateReport {
    pub denom: String,
    pub pool_address: String,
    pub cycle_version: u64,
    pub cycle_number: u64,
    pub status: RValidatorUpdateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalInterchainTx {
    pub denom: String,
    pub pool: String,
    pub era: u32,
    pub tx_type: OriginalTxType,
    pub factor: u32,
    pub msgs: Vec<EncodedMsg>,
}

/// One partial signature for a multisig proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSubmitSignature {
    pub denom: String,
    pub era: u32,
    pub pool: String,
    pub tx_type: OriginalTxType,
    pub prop_id: String,
    /// Hex encoded
    pub signature: String,
}

impl ParamSubmitSignature {
    /// Keccak-256 over denom, big-endian era, pool and tx type
    pub fn proposal_key(&self) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(self.denom.as_bytes());
        hasher.update(self.era.to_be_bytes());
        hasher.update(self.pool.as_bytes());
        hasher.update(self.tx_type.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

// === queries

#[derive(Debug)]
pub struct ParamGetPools {
    pub denom: String,
    pub pools: Reply<Vec<String>>,
}

#[derive(Debug)]
pub struct ParamGetSignatures {
    pub denom: String,
    pub era: u32,
    pub pool: String,
    pub tx_type: OriginalTxType,
    pub prop_id: String,
    pub sigs: Reply<Vec<String>>,
}

#[derive(Debug)]
pub struct ParamGetBondRecord {
    pub denom: String,
    pub tx_hash: String,
    pub bond_record: Reply<Option<BondRecord>>,
}

#[derive(Debug)]
pub struct ParamGetInterchainTxStatus {
    pub prop_id: String,
    pub status: Reply<InterchainTxStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_wire_names_round_trip() {
        for reason in Reason::ALL {
            assert_eq!(reason.as_str().parse::<Reason>(), Ok(reason));
        }
        assert_eq!(Reason::SignatureEnoughEvent.as_str(), "SignatureEnoughed");
        assert!("Unknown".parse::<Reason>().is_err());
    }

    #[test]
    fn test_reason_families() {
        assert_eq!(Reason::NewEra.family(), ReasonFamily::Command);
        assert_eq!(Reason::BondReportedEvent.family(), ReasonFamily::Event);
        assert_eq!(Reason::SubmitSignature.family(), ReasonFamily::Signature);
        assert_eq!(Reason::SignatureEnoughEvent.family(), ReasonFamily::Signature);
        assert_eq!(Reason::GetBondRecord.family(), ReasonFamily::Query);
    }

    #[test]
    fn test_reason_follows_content() {
        let msg = Message::new(
            RSymbol::from("FIS"),
            RSymbol::from("ATOM"),
            Content::NewEra(ProposalSetChainEra {
                denom: "uatom".to_string(),
                era: 7,
            }),
        );
        assert_eq!(msg.reason(), Reason::NewEra);

        let (reply, _rx) = Reply::channel();
        let query = Content::GetPools(ParamGetPools {
            denom: "uatom".to_string(),
            pools: reply,
        });
        assert_eq!(query.reason(), Reason::GetPools);
    }

    #[tokio::test]
    async fn test_reply_is_single_use() {
        let (reply, rx) = Reply::channel();
        assert!(reply.send(vec!["pool".to_string()]));
        assert_eq!(rx.await.unwrap(), vec!["pool".to_string()]);

        let (reply, rx) = Reply::<u32>::channel();
        drop(rx);
        assert!(!reply.send(1));
    }

    #[test]
    fn test_proposal_key_depends_on_all_fields() {
        let sig = ParamSubmitSignature {
            denom: "uatom".to_string(),
            era: 10,
            pool: "cosmos1pool".to_string(),
            tx_type: OriginalTxType::Bond,
            prop_id: "p1".to_string(),
            signature: "aa".to_string(),
        };
        let key = sig.proposal_key();
        assert_eq!(key.len(), 64);

        let mut next_era = sig.clone();
        next_era.era = 11;
        assert_ne!(key, next_era.proposal_key());

        let mut other_sig = sig.clone();
        other_sig.signature = "bb".to_string();
        assert_eq!(key, other_sig.proposal_key());
    }
}
