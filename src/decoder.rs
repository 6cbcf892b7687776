//! Transaction decoding into a human/machine-readable model
//!
//! Renders any transaction, built here or elsewhere, as labeled programs,
//! instructions, and account roles. Well-known programs get real labels and
//! parsed fields; unknown programs degrade to a labeled-but-opaque entry.
//! Decoding never fails.

use solana_sdk::{
    hash::Hash, message::Message, pubkey::Pubkey, signature::Signature,
    system_program, transaction::Transaction,
};

use crate::memo::{MemoFormat, MEMO_PROGRAM_ID};
use crate::probe::TOKEN_2022_PROGRAM_ID;

const COMPUTE_BUDGET_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ComputeBudget111111111111111111111111111111");

/// Fully decoded view of one transaction.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub fee_payer: Option<Pubkey>,
    pub instructions: Vec<DecodedInstruction>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub program_id: Pubkey,
    pub program_label: String,
    pub instruction_label: String,
    pub accounts: Vec<DecodedAccount>,
    pub parsed: Option<ParsedFields>,
}

#[derive(Debug, Clone)]
pub struct DecodedAccount {
    pub pubkey: Pubkey,
    pub signer: bool,
    pub writable: bool,
}

/// Structured fields recovered from recognized instructions.
#[derive(Debug, Clone)]
pub enum ParsedFields {
    TokenAmount { amount: u64, decimals: Option<u8> },
    Memo(MemoFormat),
}

/// Decode a transaction. Total: unrecognized content yields opaque entries
/// and warnings, never an error.
pub fn decode(transaction: &Transaction) -> DecodedTransaction {
    let message = &transaction.message;
    let mut warnings = Vec::new();

    if message.recent_blockhash == Hash::default() {
        warnings.push("transaction has no recent blockhash; rebuild before signing".to_string());
    }
    if transaction.signatures.is_empty()
        || transaction.signatures.iter().all(|s| *s == Signature::default())
    {
        warnings.push("transaction is unsigned".to_string());
    }

    let header = &message.header;
    if header.num_readonly_signed_accounts > header.num_required_signatures
        || header.num_readonly_unsigned_accounts as usize
            > message
                .account_keys
                .len()
                .saturating_sub(header.num_required_signatures as usize)
    {
        warnings.push(
            "message header counts are inconsistent with the account list".to_string(),
        );
    }

    let fee_payer = if message.header.num_required_signatures > 0 {
        message.account_keys.first().copied()
    } else {
        None
    };

    let instructions = message
        .instructions
        .iter()
        .map(|compiled| {
            let program_id = message
                .account_keys
                .get(compiled.program_id_index as usize)
                .copied()
                .unwrap_or_default();
            let accounts = compiled
                .accounts
                .iter()
                .map(|&idx| {
                    let idx = idx as usize;
                    DecodedAccount {
                        pubkey: message.account_keys.get(idx).copied().unwrap_or_default(),
                        signer: message.is_signer(idx),
                        writable: is_writable(message, idx),
                    }
                })
                .collect();
            let (program_label, instruction_label, parsed) =
                label_instruction(&program_id, &compiled.data, &mut warnings);
            DecodedInstruction {
                program_id,
                program_label,
                instruction_label,
                accounts,
                parsed,
            }
        })
        .collect();

    DecodedTransaction {
        fee_payer,
        instructions,
        warnings,
    }
}

/// Writable rule for a legacy message, from the header layout: writable
/// signers first, then readonly signers, then writable non-signers, then
/// readonly non-signers. Header counts come off the wire unvalidated, so the
/// subtractions saturate; an inconsistent header just reads as all-readonly.
fn is_writable(message: &Message, index: usize) -> bool {
    let header = &message.header;
    let num_signed = header.num_required_signatures as usize;
    let num_keys = message.account_keys.len();
    if index < num_signed {
        index < num_signed.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        index < num_keys.saturating_sub(header.num_readonly_unsigned_accounts as usize)
    }
}

fn label_instruction(
    program_id: &Pubkey,
    data: &[u8],
    warnings: &mut Vec<String>,
) -> (String, String, Option<ParsedFields>) {
    if *program_id == system_program::id() {
        ("System Program".to_string(), system_label(data), None)
    } else if *program_id == spl_token::id() || *program_id == TOKEN_2022_PROGRAM_ID {
        let program_label = if *program_id == spl_token::id() {
            "SPL Token"
        } else {
            "Token-2022"
        };
        let (label, parsed) = token_label(data);
        (program_label.to_string(), label, parsed)
    } else if *program_id == spl_associated_token_account::id() {
        ("Associated Token Account".to_string(), ata_label(data), None)
    } else if *program_id == MEMO_PROGRAM_ID {
        match MemoFormat::parse(data) {
            Some(format) => {
                let label = match &format {
                    MemoFormat::V1(_) => "memo (teleburn v1)",
                    MemoFormat::LegacyPrefix(_) => "memo (teleburn legacy prefix)",
                    MemoFormat::LegacyJson(_) => "memo (teleburn legacy json)",
                };
                (
                    "Memo".to_string(),
                    label.to_string(),
                    Some(ParsedFields::Memo(format)),
                )
            }
            None => ("Memo".to_string(), "memo (unrecognized payload)".to_string(), None),
        }
    } else if *program_id == COMPUTE_BUDGET_PROGRAM_ID {
        ("Compute Budget".to_string(), "compute budget".to_string(), None)
    } else {
        warnings.push(format!("unknown program {program_id}"));
        (
            format!("Unknown ({program_id})"),
            format!("instruction ({} bytes)", data.len()),
            None,
        )
    }
}

fn system_label(data: &[u8]) -> String {
    // System instructions are bincode-encoded with a u32 LE discriminant.
    let disc = data
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    match disc {
        Some(0) => "create account".to_string(),
        Some(2) => "transfer".to_string(),
        Some(8) => "allocate".to_string(),
        Some(n) => format!("system instruction #{n}"),
        None => "system instruction (empty data)".to_string(),
    }
}

/// Decode the single-byte SPL token discriminator; both token programs share
/// the base instruction set.
fn token_label(data: &[u8]) -> (String, Option<ParsedFields>) {
    let Some(&disc) = data.first() else {
        return ("token instruction (empty data)".to_string(), None);
    };
    let amount = |data: &[u8]| -> Option<u64> {
        data.get(1..9).map(|b| {
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    };
    match disc {
        0 => ("initialize mint".to_string(), None),
        1 => ("initialize account".to_string(), None),
        3 => (
            "transfer".to_string(),
            amount(data).map(|amount| ParsedFields::TokenAmount {
                amount,
                decimals: None,
            }),
        ),
        7 => (
            "mint to".to_string(),
            amount(data).map(|amount| ParsedFields::TokenAmount {
                amount,
                decimals: None,
            }),
        ),
        8 => (
            "burn".to_string(),
            amount(data).map(|amount| ParsedFields::TokenAmount {
                amount,
                decimals: None,
            }),
        ),
        9 => ("close account".to_string(), None),
        12 => (
            "transfer (checked)".to_string(),
            amount(data).map(|amount| ParsedFields::TokenAmount {
                amount,
                decimals: data.get(9).copied(),
            }),
        ),
        15 => (
            "burn (checked)".to_string(),
            amount(data).map(|amount| ParsedFields::TokenAmount {
                amount,
                decimals: data.get(9).copied(),
            }),
        ),
        n => (format!("token instruction #{n}"), None),
    }
}

fn ata_label(data: &[u8]) -> String {
    match data.first() {
        None | Some(0) => "create associated account".to_string(),
        Some(1) => "create associated account (idempotent)".to_string(),
        Some(2) => "recover nested account".to_string(),
        Some(n) => format!("ata instruction #{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::instruction::{AccountMeta, Instruction};

    use crate::memo::{self, MemoPayload, SealPayload};
    use crate::types::InscriptionRef;

    fn unsigned(instructions: &[Instruction], payer: &Pubkey) -> Transaction {
        let message = Message::new_with_blockhash(
            instructions,
            Some(payer),
            &Hash::new_unique(),
        );
        Transaction::new_unsigned(message)
    }

    #[test]
    fn decodes_burn_checked_with_amount_and_decimals() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ata = Pubkey::new_unique();
        let burn = spl_token::instruction::burn_checked(
            &spl_token::id(),
            &ata,
            &mint,
            &payer,
            &[],
            42,
            6,
        )
        .expect("encodes");
        let decoded = decode(&unsigned(&[burn], &payer));

        assert_eq!(decoded.fee_payer, Some(payer));
        assert_eq!(decoded.instructions.len(), 1);
        let ix = &decoded.instructions[0];
        assert_eq!(ix.program_label, "SPL Token");
        assert_eq!(ix.instruction_label, "burn (checked)");
        match ix.parsed {
            Some(ParsedFields::TokenAmount { amount, decimals }) => {
                assert_eq!(amount, 42);
                assert_eq!(decimals, Some(6));
            }
            ref other => panic!("expected token amount, got {other:?}"),
        }
        // Owner signs the burn.
        assert!(ix.accounts.iter().any(|a| a.pubkey == payer && a.signer));
        assert!(ix.accounts.iter().any(|a| a.pubkey == ata && a.writable));
    }

    #[test]
    fn decodes_structured_memo_payload() {
        let payer = Pubkey::new_unique();
        let inscription: InscriptionRef =
            format!("{}i0", "a".repeat(64)).parse().expect("valid");
        let payload = SealPayload::new(&inscription, &Pubkey::new_unique(), &"b".repeat(64), 0);
        let bytes = MemoPayload::Seal(payload.clone()).to_memo_bytes().expect("fits");
        let ix = memo::memo_instruction(&bytes, &payer);
        let decoded = decode(&unsigned(&[ix], &payer));

        match &decoded.instructions[0].parsed {
            Some(ParsedFields::Memo(MemoFormat::V1(MemoPayload::Seal(parsed)))) => {
                assert_eq!(parsed, &payload);
            }
            other => panic!("expected structured seal memo, got {other:?}"),
        }
    }

    #[test]
    fn unknown_programs_degrade_to_opaque_entries() {
        let payer = Pubkey::new_unique();
        let mystery = Pubkey::new_unique();
        let ix = Instruction::new_with_bytes(
            mystery,
            &[1, 2, 3],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        );
        let decoded = decode(&unsigned(&[ix], &payer));

        let entry = &decoded.instructions[0];
        assert!(entry.program_label.contains(&mystery.to_string()));
        assert!(entry.parsed.is_none());
        assert!(decoded
            .warnings
            .iter()
            .any(|w| w.contains("unknown program")));
    }

    #[test]
    fn warns_on_missing_blockhash_and_signatures() {
        let decoded = decode(&Transaction::default());
        assert!(decoded
            .warnings
            .iter()
            .any(|w| w.contains("no recent blockhash")));
        assert!(decoded.warnings.iter().any(|w| w.contains("unsigned")));
    }

    #[test]
    fn tolerates_inconsistent_header_counts() {
        let payer = Pubkey::new_unique();
        let ix = memo::memo_instruction(b"gm", &payer);

        // More readonly signers than signers: decoding must degrade to
        // warnings, not panic.
        let mut tx = unsigned(&[ix.clone()], &payer);
        tx.message.header.num_readonly_signed_accounts =
            tx.message.header.num_required_signatures + 1;
        let decoded = decode(&tx);
        assert!(decoded
            .warnings
            .iter()
            .any(|w| w.contains("header counts are inconsistent")));
        assert!(decoded.instructions[0].accounts.iter().all(|a| !a.writable));

        // Readonly-unsigned count exceeding the key list entirely.
        let mut tx = unsigned(&[ix], &payer);
        tx.message.header.num_readonly_unsigned_accounts = u8::MAX;
        let decoded = decode(&tx);
        assert!(decoded
            .warnings
            .iter()
            .any(|w| w.contains("header counts are inconsistent")));
    }

    #[test]
    fn unrecognized_memo_is_labeled_but_unparsed() {
        let payer = Pubkey::new_unique();
        let ix = memo::memo_instruction(b"gm", &payer);
        let decoded = decode(&unsigned(&[ix], &payer));
        let entry = &decoded.instructions[0];
        assert_eq!(entry.program_label, "Memo");
        assert!(entry.instruction_label.contains("unrecognized"));
        assert!(entry.parsed.is_none());
    }
}
