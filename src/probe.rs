//! Read-only probes of token and mint account state
//!
//! All queries go through the gateway; nothing here mutates chain state. The
//! probed token program feeds instruction encoding in the builder, and the
//! frozen/balance status drives the simulator's pre-flight checks.

use std::sync::Arc;

use solana_sdk::{program_pack::Pack, pubkey::Pubkey};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::rpc_gateway::RpcGateway;

/// Token-2022 (extension-enabled) program.
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Base (extension-free) byte lengths of the SPL account layouts. Token-2022
/// appends extensions after these, so only the leading bytes are unpacked.
const TOKEN_ACCOUNT_BASE_LEN: usize = spl_token::state::Account::LEN;
const MINT_BASE_LEN: usize = spl_token::state::Mint::LEN;

/// Facts about a mint needed to encode instructions against it.
#[derive(Debug, Clone, Copy)]
pub struct MintFacts {
    /// Owning token program: legacy SPL Token or Token-2022.
    pub token_program: Pubkey,
    pub decimals: u8,
    pub supply: u64,
    pub freeze_authority: Option<Pubkey>,
}

/// Status of an owner's associated token account for a mint.
///
/// `NotFound` is deliberately distinct from "not frozen": a missing account
/// is a blocking pre-flight condition, not a healthy one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAccountStatus {
    NotFound,
    Found {
        frozen: bool,
        balance: u64,
        freeze_authority: Option<Pubkey>,
    },
}

/// Read-only account state queries, executed through the gateway.
pub struct AccountStateProbe {
    gateway: Arc<RpcGateway>,
}

impl AccountStateProbe {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self { gateway }
    }

    /// Which of the two token-program variants owns this mint.
    pub async fn token_program_of(&self, mint: &Pubkey) -> Result<Pubkey> {
        Ok(self.mint_facts(mint).await?.token_program)
    }

    /// Fetch and unpack the mint account.
    pub async fn mint_facts(&self, mint: &Pubkey) -> Result<MintFacts> {
        let mint_key = *mint;
        let account = self
            .gateway
            .with_best_endpoint(|rpc| async move { rpc.get_account(&mint_key).await })
            .await?
            .ok_or_else(|| {
                EngineError::account_state(
                    mint.to_string(),
                    "mint account does not exist",
                    "verify the mint address; the token may live on another cluster",
                )
            })?;

        let token_program = if account.owner == spl_token::id() {
            spl_token::id()
        } else if account.owner == TOKEN_2022_PROGRAM_ID {
            TOKEN_2022_PROGRAM_ID
        } else {
            return Err(EngineError::validation(format!(
                "account {mint} is not a token mint (owned by {})",
                account.owner
            )));
        };

        if account.data.len() < MINT_BASE_LEN {
            return Err(EngineError::validation(format!(
                "mint {mint} data is {} bytes, below the {MINT_BASE_LEN}-byte mint layout",
                account.data.len()
            )));
        }
        let state = spl_token::state::Mint::unpack_from_slice(&account.data[..MINT_BASE_LEN])
            .map_err(|e| EngineError::validation(format!("mint {mint} failed to unpack: {e}")))?;

        debug!(
            mint = %mint,
            token_program = %token_program,
            decimals = state.decimals,
            "probed mint"
        );
        Ok(MintFacts {
            token_program,
            decimals: state.decimals,
            supply: state.supply,
            freeze_authority: state.freeze_authority.into(),
        })
    }

    /// Existence, balance, and frozen status of the owner's ATA for `mint`.
    pub async fn frozen_status(&self, mint: &Pubkey, owner: &Pubkey) -> Result<TokenAccountStatus> {
        let facts = self.mint_facts(mint).await?;
        let ata = get_associated_token_address_with_program_id(owner, mint, &facts.token_program);
        let account = self
            .gateway
            .with_best_endpoint(|rpc| async move { rpc.get_account(&ata).await })
            .await?;

        let Some(account) = account else {
            debug!(mint = %mint, owner = %owner, ata = %ata, "token account not found");
            return Ok(TokenAccountStatus::NotFound);
        };

        if account.data.len() < TOKEN_ACCOUNT_BASE_LEN {
            return Err(EngineError::validation(format!(
                "token account {ata} data is {} bytes, below the token account layout",
                account.data.len()
            )));
        }
        let state =
            spl_token::state::Account::unpack_from_slice(&account.data[..TOKEN_ACCOUNT_BASE_LEN])
                .map_err(|e| {
                    EngineError::validation(format!("token account {ata} failed to unpack: {e}"))
                })?;

        Ok(TokenAccountStatus::Found {
            frozen: state.state == spl_token::state::AccountState::Frozen,
            balance: state.amount,
            freeze_authority: facts.freeze_authority,
        })
    }

    /// Lamport balance of the fee payer, for the advisory pre-flight check.
    pub async fn payer_balance(&self, payer: &Pubkey) -> Result<u64> {
        let payer_key = *payer;
        Ok(self
            .gateway
            .with_best_endpoint(|rpc| async move { rpc.get_balance(&payer_key).await })
            .await?)
    }
}

/// The other token-program variant, used when the simulator retries a frozen
/// failure under the alternate program.
pub fn alternate_token_program(program: &Pubkey) -> Pubkey {
    if *program == spl_token::id() {
        TOKEN_2022_PROGRAM_ID
    } else {
        spl_token::id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternate_program_swaps_both_ways() {
        assert_eq!(alternate_token_program(&spl_token::id()), TOKEN_2022_PROGRAM_ID);
        assert_eq!(alternate_token_program(&TOKEN_2022_PROGRAM_ID), spl_token::id());
    }

    #[test]
    fn layout_constants_match_spl() {
        assert_eq!(TOKEN_ACCOUNT_BASE_LEN, 165);
        assert_eq!(MINT_BASE_LEN, 82);
    }
}
