//! Stateless instruction planning for the three retirement strategies
//!
//! Pure functions: chain facts (token program, decimals) come in as
//! arguments, instructions come out. The memo instruction is appended by the
//! builder afterwards, because its payload depends on the derivation result
//! produced here.

use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};

use crate::derive;
use crate::error::{EngineError, Result};
use crate::memo::MEMO_PROGRAM_ID;
use crate::types::{DerivedAddress, RetirementMethod};

use super::RetireParams;

/// The chain's well-known unowned void address.
pub const INCINERATOR: Pubkey = solana_sdk::pubkey!("1nc1nerator11111111111111111111111111111111");

/// Planned token-side instructions for one RETIRE transaction.
#[derive(Debug, Clone)]
pub struct RetirePlan {
    pub instructions: Vec<Instruction>,
    pub description: String,
    /// Present only for `SendToDerived`; its iteration count goes in the memo.
    pub derivation: Option<DerivedAddress>,
}

/// Plan the token instructions for `params` under `token_program`.
pub fn plan_retire(params: &RetireParams, token_program: &Pubkey, decimals: u8) -> Result<RetirePlan> {
    if params.amount == 0 {
        return Err(EngineError::validation(
            "retirement amount must be greater than zero".to_string(),
        ));
    }

    let source_ata =
        get_associated_token_address_with_program_id(&params.owner, &params.mint, token_program);

    let ix_err = |e: solana_sdk::program_error::ProgramError| {
        EngineError::internal(format!("token instruction encoding: {e}"))
    };

    // spl-token's builders refuse any id but the canonical one. Both token
    // programs share the base instruction encoding, so the id is rewritten
    // after encoding.
    let with_program = |mut ix: Instruction| {
        ix.program_id = *token_program;
        ix
    };

    match params.method {
        RetirementMethod::Burn => {
            let burn = spl_token::instruction::burn_checked(
                &spl_token::id(),
                &source_ata,
                &params.mint,
                &params.owner,
                &[],
                params.amount,
                decimals,
            )
            .map_err(ix_err)?;
            Ok(RetirePlan {
                instructions: vec![with_program(burn)],
                description: format!(
                    "burn {} unit(s) of mint {}, linked to inscription {}",
                    params.amount, params.mint, params.inscription
                ),
                derivation: None,
            })
        }
        RetirementMethod::SendToVoid => {
            let void_ata = get_associated_token_address_with_program_id(
                &INCINERATOR,
                &params.mint,
                token_program,
            );
            let mut instructions = vec![
                // No-op when the incinerator's account already exists.
                create_associated_token_account_idempotent(
                    &params.fee_payer,
                    &INCINERATOR,
                    &params.mint,
                    token_program,
                ),
                with_program(
                    spl_token::instruction::transfer_checked(
                        &spl_token::id(),
                        &source_ata,
                        &params.mint,
                        &void_ata,
                        &params.owner,
                        &[],
                        params.amount,
                        decimals,
                    )
                    .map_err(ix_err)?,
                ),
            ];
            if params.close_source_account {
                instructions.push(with_program(
                    spl_token::instruction::close_account(
                        &spl_token::id(),
                        &source_ata,
                        &params.owner,
                        &params.owner,
                        &[],
                    )
                    .map_err(ix_err)?,
                ));
            }
            Ok(RetirePlan {
                instructions,
                description: format!(
                    "send {} unit(s) of mint {} to the incinerator, linked to inscription {}",
                    params.amount, params.mint, params.inscription
                ),
                derivation: None,
            })
        }
        RetirementMethod::SendToDerived => {
            // The derived address is off-curve and cannot own an ATA; the
            // token is burned and the derivation published in the memo is the
            // cryptographic link.
            let derived = derive::derive(&params.inscription)?;
            let burn = spl_token::instruction::burn_checked(
                &spl_token::id(),
                &source_ata,
                &params.mint,
                &params.owner,
                &[],
                params.amount,
                decimals,
            )
            .map_err(ix_err)?;
            Ok(RetirePlan {
                instructions: vec![with_program(burn)],
                description: format!(
                    "burn {} unit(s) of mint {}, teleburned to derived address {} ({} iteration(s))",
                    params.amount, params.mint, derived.point, derived.iterations
                ),
                derivation: Some(derived),
            })
        }
    }
}

/// Ordering sanity check: exactly one memo instruction, and it comes last.
/// Debug/test builds only, mirroring how plans are validated before signing.
#[cfg(debug_assertions)]
pub fn sanity_check_retire_order(instructions: &[Instruction]) -> Result<()> {
    let memo_positions: Vec<usize> = instructions
        .iter()
        .enumerate()
        .filter(|(_, ix)| ix.program_id == MEMO_PROGRAM_ID)
        .map(|(i, _)| i)
        .collect();
    match memo_positions.as_slice() {
        [last] if *last == instructions.len() - 1 => Ok(()),
        [] => Err(EngineError::internal(
            "retire transaction is missing its memo instruction".to_string(),
        )),
        _ => Err(EngineError::internal(format!(
            "retire transaction has memo instructions at {memo_positions:?}, expected one at the end"
        ))),
    }
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_retire_order(_instructions: &[Instruction]) -> Result<()> {
    Ok(())
}
