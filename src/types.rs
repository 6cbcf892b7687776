//! Core value types shared across the engine
//!
//! Everything here is a plain value: parsed inscription references, derived
//! addresses, retirement strategies, and the per-transaction artifacts the
//! builder and simulator exchange. No I/O, no globals.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::Transaction};

use crate::error::EngineError;

/// A Bitcoin Ordinals inscription reference: `<64-hex-txid>i<index>`.
///
/// The txid bytes are kept exactly as written in the textual form; no
/// byte-order flip is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InscriptionRef {
    pub txid: [u8; 32],
    pub index: u32,
}

impl InscriptionRef {
    pub fn new(txid: [u8; 32], index: u32) -> Self {
        Self { txid, index }
    }
}

impl FromStr for InscriptionRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid_hex, index_str) = s.split_once('i').ok_or_else(|| {
            EngineError::validation(format!(
                "inscription id must be <64-hex-txid>i<index>, got {s:?}"
            ))
        })?;
        if txid_hex.len() != 64 {
            return Err(EngineError::validation(format!(
                "inscription txid must be 64 hex chars, got {}",
                txid_hex.len()
            )));
        }
        if !txid_hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(EngineError::validation(
                "inscription txid must be lowercase hex".to_string(),
            ));
        }
        let mut txid = [0u8; 32];
        hex::decode_to_slice(txid_hex, &mut txid)
            .map_err(|e| EngineError::validation(format!("invalid txid hex: {e}")))?;
        if index_str.is_empty() || !index_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EngineError::validation(format!(
                "inscription index must be decimal digits, got {index_str:?}"
            )));
        }
        let index: u32 = index_str.parse().map_err(|_| {
            EngineError::validation(format!("inscription index does not fit in u32: {index_str}"))
        })?;
        Ok(Self { txid, index })
    }
}

impl fmt::Display for InscriptionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}i{}", hex::encode(self.txid), self.index)
    }
}

/// An off-curve destination address derived from an inscription reference.
///
/// `point` is guaranteed not to be a valid ed25519 point, so no private key
/// can exist for it. `iterations` records how many re-hash rounds were needed
/// and is published in the retire memo for `SendToDerived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddress {
    pub point: Pubkey,
    pub iterations: u32,
}

/// The three mutually exclusive retirement strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetirementMethod {
    /// Reduce supply with a burn instruction.
    Burn,
    /// Transfer the full amount to the incinerator address.
    SendToVoid,
    /// Burn, recording the derived off-curve address in the memo as the link.
    SendToDerived,
}

impl RetirementMethod {
    /// Action string serialized into the retire memo payload.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Burn => "burn",
            Self::SendToVoid => "incinerate",
            Self::SendToDerived => "teleburn-derived",
        }
    }
}

/// Which step of the flow a transaction or report entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Seal,
    MetadataUpdate,
    Retire,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seal => write!(f, "seal"),
            Self::MetadataUpdate => write!(f, "metadata_update"),
            Self::Retire => write!(f, "retire"),
        }
    }
}

/// An unsigned transaction produced by the builder.
///
/// Consumed, never mutated, by the decoder and simulator. The engine holds no
/// private key; `to_base64` is the hand-off form for the external signer.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub kind: StepKind,
    pub transaction: Transaction,
    pub fee_payer: Pubkey,
    pub recent_blockhash: Hash,
    pub estimated_fee_lamports: u64,
    pub description: String,
}

impl BuiltTransaction {
    /// Wire-serializable form handed to the external signer.
    pub fn to_base64(&self) -> Result<String, EngineError> {
        let bytes = bincode::serialize(&self.transaction)
            .map_err(|e| EngineError::internal(format!("transaction serialization: {e}")))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Raw result of one read-only simulation call, as returned through the RPC
/// seam. Kept free of solana-client types so mocks can produce it directly.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecution {
    /// Program error text, if the simulated transaction failed.
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Closed classification of simulation failures.
///
/// Produced only by `simulator::classify`; every call site matches
/// exhaustively instead of re-parsing log text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationErrorKind {
    AccountFrozen,
    InsufficientFunds,
    AccountNotFound,
    InvalidProgram,
    Unknown,
}

impl SimulationErrorKind {
    /// Actionable remediation surfaced alongside the classified error.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::AccountFrozen => {
                "the token account is frozen; contact the freeze authority or retry later"
            }
            Self::InsufficientFunds => "fund the fee payer with more SOL and rebuild",
            Self::AccountNotFound => {
                "a required account does not exist on chain; verify the mint and owner"
            }
            Self::InvalidProgram => {
                "the instruction targeted the wrong token program; rebuild with the probed program"
            }
            Self::Unknown => "inspect the simulation logs; the failure was not recognized",
        }
    }
}

/// Outcome of simulating one built transaction.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub succeeded: bool,
    pub compute_units: u64,
    /// Program error text from the execution, verbatim, when it failed.
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub classified: Option<SimulationErrorKind>,
}

/// States of the frozen-account fallback machine, recorded in the report for
/// auditability. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStage {
    Initial,
    TriedPrimary,
    TriedAlternateProgram,
    TriedAlternateRpc,
    Exhausted,
}

impl fmt::Display for FallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::TriedPrimary => "tried_primary",
            Self::TriedAlternateProgram => "tried_alternate_program",
            Self::TriedAlternateRpc => "tried_alternate_rpc",
            Self::Exhausted => "exhausted",
        };
        write!(f, "{s}")
    }
}
