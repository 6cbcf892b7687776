//! On-chain memo payloads and their wire formats
//!
//! The memo carries the cryptographic proof record: every field is
//! load-bearing for downstream verifiers and must round-trip byte-for-byte.
//! Emission is always the V1 JSON form; two older shapes remain accepted on
//! decode so historical teleburns stay verifiable.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::error::{EngineError, Result};
use crate::types::{InscriptionRef, RetirementMethod};

/// SPL memo program.
pub const MEMO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Standard tag emitted in every V1 payload.
pub const MEMO_STANDARD: &str = "teleburn";

/// Current payload version.
pub const MEMO_VERSION: u32 = 1;

/// Hard upper bound on serialized memo size accepted by the memo program.
pub const MAX_MEMO_BYTES: usize = 566;

/// Prefix of the pre-JSON legacy wire form.
const LEGACY_PREFIX: &str = "teleburn:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionField {
    /// Textual inscription id, `<txid>i<index>`.
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaField {
    /// Base58 mint address of the retired token.
    pub mint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaField {
    /// SHA-256 of the inscription content, 64 hex chars.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedField {
    /// Re-hash rounds used by the address derivation; lets verifiers replay it.
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtraField {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Payload of the SEAL step: publishes the proof linkage before retirement.
///
/// `timestamp` is the build-time wall clock; `block_height` is serialized as 0
/// and filled in by the caller from the *confirmed* transaction. The engine
/// never claims a height it has not observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealPayload {
    pub standard: String,
    pub version: u32,
    pub source_chain: String,
    pub target_chain: String,
    pub action: String,
    pub timestamp: i64,
    pub block_height: u64,
    pub inscription: InscriptionField,
    pub solana: SolanaField,
    pub media: MediaField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<ExtraField>,
}

impl SealPayload {
    pub fn new(
        inscription: &InscriptionRef,
        mint: &Pubkey,
        content_sha256: &str,
        timestamp: i64,
    ) -> Self {
        Self {
            standard: MEMO_STANDARD.to_string(),
            version: MEMO_VERSION,
            source_chain: "bitcoin".to_string(),
            target_chain: "solana".to_string(),
            action: "seal".to_string(),
            timestamp,
            block_height: 0,
            inscription: InscriptionField {
                id: inscription.to_string(),
            },
            solana: SolanaField {
                mint: mint.to_string(),
            },
            media: MediaField {
                sha256: content_sha256.to_string(),
            },
            extra: None,
        }
    }
}

/// Payload of the RETIRE step, one of the three retirement actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetirePayload {
    pub standard: String,
    pub version: u32,
    pub action: String,
    pub timestamp: i64,
    pub block_height: u64,
    pub inscription: InscriptionField,
    pub solana: SolanaField,
    pub media: MediaField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedField>,
}

impl RetirePayload {
    pub fn new(
        method: RetirementMethod,
        inscription: &InscriptionRef,
        mint: &Pubkey,
        content_sha256: &str,
        timestamp: i64,
        derivation_iterations: Option<u32>,
    ) -> Self {
        Self {
            standard: MEMO_STANDARD.to_string(),
            version: MEMO_VERSION,
            action: method.action().to_string(),
            timestamp,
            block_height: 0,
            inscription: InscriptionField {
                id: inscription.to_string(),
            },
            solana: SolanaField {
                mint: mint.to_string(),
            },
            media: MediaField {
                sha256: content_sha256.to_string(),
            },
            derived: derivation_iterations.map(|iterations| DerivedField { iterations }),
        }
    }
}

/// A typed V1 payload, discriminated by its `action` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoPayload {
    Seal(SealPayload),
    Retire(RetirePayload),
}

impl MemoPayload {
    /// Serialize for the wire, enforcing the memo program's size bound.
    pub fn to_memo_bytes(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Seal(p) => serde_json::to_vec(p),
            Self::Retire(p) => serde_json::to_vec(p),
        }
        .map_err(|e| EngineError::internal(format!("memo serialization: {e}")))?;
        if bytes.len() > MAX_MEMO_BYTES {
            return Err(EngineError::validation(format!(
                "memo payload is {} bytes, exceeds the {MAX_MEMO_BYTES}-byte memo limit",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

/// Every memo shape the decoder understands.
///
/// Only `V1` is ever emitted. The legacy variants are parse-only and surface
/// the raw JSON, since their field sets predate the standard tag.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoFormat {
    V1(MemoPayload),
    /// `teleburn:<json>` prefix form used by early clients.
    LegacyPrefix(serde_json::Value),
    /// Bare JSON without a `standard` field, from before versioning.
    LegacyJson(serde_json::Value),
}

impl MemoFormat {
    /// Try each known format in order. Unrecognized payloads yield `None`;
    /// this function never fails.
    pub fn parse(bytes: &[u8]) -> Option<MemoFormat> {
        let text = std::str::from_utf8(bytes).ok()?;

        if let Some(payload) = parse_v1(text) {
            return Some(MemoFormat::V1(payload));
        }

        if let Some(rest) = text.strip_prefix(LEGACY_PREFIX) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(rest) {
                if value.is_object() {
                    return Some(MemoFormat::LegacyPrefix(value));
                }
            }
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if value.get("inscription").is_some() && value.get("standard").is_none() {
                return Some(MemoFormat::LegacyJson(value));
            }
        }

        None
    }
}

fn parse_v1(text: &str) -> Option<MemoPayload> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("standard")?.as_str()? != MEMO_STANDARD {
        return None;
    }
    match value.get("action")?.as_str()? {
        "seal" => serde_json::from_value(value).ok().map(MemoPayload::Seal),
        "burn" | "incinerate" | "teleburn-derived" => {
            serde_json::from_value(value).ok().map(MemoPayload::Retire)
        }
        _ => None,
    }
}

/// Build the memo instruction carrying `payload_bytes`, signed by the payer.
pub fn memo_instruction(payload_bytes: &[u8], signer: &Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        MEMO_PROGRAM_ID,
        payload_bytes,
        vec![AccountMeta::new_readonly(*signer, true)],
    )
}

/// Validate a content-integrity hash: exactly 64 lowercase hex chars.
pub fn validate_content_hash(hash: &str) -> Result<()> {
    if hash.len() == 64 && hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "content hash must be 64 lowercase hex chars, got {hash:?}"
        )))
    }
}
