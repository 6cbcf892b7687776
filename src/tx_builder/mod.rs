//! Unsigned transaction construction for the teleburn lifecycle
//!
//! Two operations: SEAL publishes the proof memo, RETIRE executes one of the
//! three retirement strategies and appends the retire memo. Every build
//! fetches a fresh blockhash through the gateway; a `BuiltTransaction` held
//! across a long delay must be rebuilt, not reused, before signing.
//!
//! The builder never signs and never holds key material.

mod retire;

pub use retire::{plan_retire, sanity_check_retire_order, RetirePlan, INCINERATOR};

use std::sync::Arc;

use solana_sdk::{
    instruction::Instruction, message::Message, pubkey::Pubkey, transaction::Transaction,
};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::memo::{self, ExtraField, MemoPayload, RetirePayload, SealPayload};
use crate::probe::AccountStateProbe;
use crate::rpc_gateway::RpcGateway;
use crate::types::{BuiltTransaction, InscriptionRef, RetirementMethod, StepKind};

/// Fallback fee per required signature when the fee RPC is unavailable.
const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Inputs for the SEAL transaction.
#[derive(Debug, Clone)]
pub struct SealParams {
    pub inscription: InscriptionRef,
    pub mint: Pubkey,
    pub fee_payer: Pubkey,
    /// SHA-256 of the inscription content, computed by the external fetcher.
    pub content_sha256: String,
    pub extra: Option<ExtraField>,
}

/// Inputs for the RETIRE transaction.
#[derive(Debug, Clone)]
pub struct RetireParams {
    pub method: RetirementMethod,
    pub inscription: InscriptionRef,
    pub mint: Pubkey,
    /// Current token holder; signs the token instructions externally.
    pub owner: Pubkey,
    pub fee_payer: Pubkey,
    pub amount: u64,
    pub content_sha256: String,
    /// For `SendToVoid`: reclaim the source account's rent after the transfer.
    pub close_source_account: bool,
    /// Set by the simulator's fallback to force the alternate token program;
    /// `None` uses the program probed from the mint.
    pub token_program_override: Option<Pubkey>,
}

/// Builds unsigned transactions from chain facts supplied by the probe and
/// gateway. Stateless between calls.
pub struct TransactionBuilder {
    gateway: Arc<RpcGateway>,
    probe: AccountStateProbe,
}

impl TransactionBuilder {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self {
            probe: AccountStateProbe::new(gateway.clone()),
            gateway,
        }
    }

    /// Build the SEAL transaction: a single memo instruction carrying the
    /// proof payload. Block height in the payload stays 0 until the caller
    /// observes the confirmed transaction.
    #[instrument(skip(self, params), fields(mint = %params.mint))]
    pub async fn build_seal(&self, params: &SealParams) -> Result<BuiltTransaction> {
        memo::validate_content_hash(&params.content_sha256)?;

        let mut payload = SealPayload::new(
            &params.inscription,
            &params.mint,
            &params.content_sha256,
            chrono::Utc::now().timestamp(),
        );
        payload.extra = params.extra.clone();
        let bytes = MemoPayload::Seal(payload).to_memo_bytes()?;
        let instructions = vec![memo::memo_instruction(&bytes, &params.fee_payer)];

        self.finalize(
            StepKind::Seal,
            instructions,
            params.fee_payer,
            format!(
                "publish teleburn seal for inscription {} and mint {}",
                params.inscription, params.mint
            ),
        )
        .await
    }

    /// Build the RETIRE transaction for the requested method, with the retire
    /// memo appended last.
    #[instrument(skip(self, params), fields(mint = %params.mint, method = ?params.method))]
    pub async fn build_retire(&self, params: &RetireParams) -> Result<BuiltTransaction> {
        memo::validate_content_hash(&params.content_sha256)?;

        let facts = self.probe.mint_facts(&params.mint).await?;
        let token_program = params.token_program_override.unwrap_or(facts.token_program);
        if params.token_program_override.is_some() {
            debug!(
                token_program = %token_program,
                probed = %facts.token_program,
                "building retire under overridden token program"
            );
        }

        let plan = plan_retire(params, &token_program, facts.decimals)?;
        let payload = RetirePayload::new(
            params.method,
            &params.inscription,
            &params.mint,
            &params.content_sha256,
            chrono::Utc::now().timestamp(),
            plan.derivation.map(|d| d.iterations),
        );
        let bytes = MemoPayload::Retire(payload).to_memo_bytes()?;

        let mut instructions = plan.instructions;
        instructions.push(memo::memo_instruction(&bytes, &params.fee_payer));
        sanity_check_retire_order(&instructions)?;

        self.finalize(StepKind::Retire, instructions, params.fee_payer, plan.description)
            .await
    }

    /// Placeholder metadata-update step: a labeled memo reserving the slot in
    /// the flow. The actual metadata mutation happens outside this engine.
    #[instrument(skip(self, params), fields(mint = %params.mint))]
    pub async fn build_metadata_update(&self, params: &SealParams) -> Result<BuiltTransaction> {
        let note = format!(
            "teleburn metadata update pending for mint {} (inscription {})",
            params.mint, params.inscription
        );
        let instructions = vec![memo::memo_instruction(note.as_bytes(), &params.fee_payer)];
        self.finalize(
            StepKind::MetadataUpdate,
            instructions,
            params.fee_payer,
            format!("annotate metadata update for mint {}", params.mint),
        )
        .await
    }

    /// Attach a fresh blockhash, estimate the fee, and wrap into an unsigned
    /// transaction.
    async fn finalize(
        &self,
        kind: StepKind,
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        description: String,
    ) -> Result<BuiltTransaction> {
        let recent_blockhash = self
            .gateway
            .with_best_endpoint(|rpc| async move { rpc.latest_blockhash().await })
            .await?;

        let message = Message::new_with_blockhash(&instructions, Some(&fee_payer), &recent_blockhash);

        let estimated_fee_lamports = {
            let msg = message.clone();
            match self
                .gateway
                .with_best_endpoint(move |rpc| {
                    let msg = msg.clone();
                    async move { rpc.fee_for_message(&msg).await }
                })
                .await
            {
                Ok(fee) => fee,
                Err(err) => {
                    let fallback =
                        message.header.num_required_signatures as u64 * LAMPORTS_PER_SIGNATURE;
                    warn!(
                        error = %err,
                        fallback_lamports = fallback,
                        "fee query failed, using signature-count estimate"
                    );
                    fallback
                }
            }
        };

        debug!(
            kind = %kind,
            instructions = message.instructions.len(),
            fee_lamports = estimated_fee_lamports,
            "built unsigned transaction"
        );

        Ok(BuiltTransaction {
            kind,
            transaction: Transaction::new_unsigned(message),
            fee_payer,
            recent_blockhash,
            estimated_fee_lamports,
            description,
        })
    }
}
