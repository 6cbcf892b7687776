//! Dry-run orchestration: build, decode, simulate, classify, report
//!
//! The behavioral core of the engine. One `run()` call walks the flow
//! sequentially (SEAL, optional metadata note, RETIRE), simulating each
//! transaction read-only through the gateway and recovering from
//! frozen-account failures through an explicit fallback state machine.
//! Nothing in this module, or anything it calls, can mutate chain state:
//! the RPC seam has no send or sign methods.
//!
//! Blocking conditions are recorded in the report (`success = false`) rather
//! than returned as errors; `run()` itself only fails on internal invariant
//! violations, which must abort loudly.

mod classify;
pub mod receipt;

pub use classify::classify;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;
use tracing::{info, instrument, warn};

use crate::decoder::{self, DecodedTransaction, ParsedFields};
use crate::error::{EngineError, Result};
use crate::memo::{MemoFormat, MemoPayload};
use crate::probe::{alternate_token_program, AccountStateProbe, TokenAccountStatus};
use crate::rpc_gateway::{GatewayError, RpcGateway};
use crate::tx_builder::{RetireParams, SealParams, TransactionBuilder};
use crate::types::{
    BuiltTransaction, FallbackStage, InscriptionRef, RetirementMethod, SimulatedExecution,
    SimulationErrorKind, SimulationOutcome, StepKind,
};

/// Advisory payer balance floor: below this, a warning is attached. The real
/// simulation remains authoritative for fees.
pub const DEFAULT_MIN_PAYER_BALANCE_LAMPORTS: u64 = 10_000_000;

/// Inputs for one full dry-run flow.
#[derive(Debug, Clone)]
pub struct FlowParams {
    /// Textual inscription id; format-validated as a blocking pre-flight.
    pub inscription_id: String,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub fee_payer: Pubkey,
    pub method: RetirementMethod,
    pub amount: u64,
    pub content_sha256: String,
    pub close_source_account: bool,
    /// Include the placeholder metadata-update step.
    pub include_metadata_update: bool,
    pub min_payer_balance_lamports: u64,
}

/// One blocking error recorded in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportError {
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ReportError {
    fn from_engine(step: &str, err: &EngineError) -> Self {
        Self {
            category: err.category().to_string(),
            message: format!("{step}: {err}"),
            remediation: err.remediation().map(str::to_string),
        }
    }

    fn from_simulation(step: StepKind, kind: SimulationErrorKind, err_text: &str) -> Self {
        Self {
            category: "simulation".to_string(),
            message: format!("{step}: simulation failed ({kind:?}): {err_text}"),
            remediation: Some(kind.remediation().to_string()),
        }
    }
}

/// One flow step: the built transaction, its decoded view, and its outcome.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub kind: StepKind,
    pub description: String,
    pub estimated_fee_lamports: u64,
    pub decoded: DecodedTransaction,
    pub outcome: SimulationOutcome,
    pub transaction_base64: String,
    /// Derivation iteration count surfaced from the retire memo, when present.
    pub derived_iterations: Option<u32>,
}

/// The externally visible artifact of a dry run. Immutable once returned.
#[derive(Debug, Clone)]
pub struct DryRunReport {
    pub steps: Vec<StepReport>,
    pub total_fee_lamports: u64,
    pub total_compute_units: u64,
    pub warnings: Vec<String>,
    pub errors: Vec<ReportError>,
    pub fallback_trail: Vec<FallbackStage>,
    /// Set when the alternate-RPC diagnostic replay ran; its value is
    /// evidence about endpoint consistency, not about chain state.
    pub alternate_rpc_succeeded: Option<bool>,
    /// True iff zero blocking errors were recorded. Warnings never count.
    pub success: bool,
}

impl DryRunReport {
    fn empty() -> Self {
        Self {
            steps: Vec::new(),
            total_fee_lamports: 0,
            total_compute_units: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            fallback_trail: Vec::new(),
            alternate_rpc_succeeded: None,
            success: false,
        }
    }

    fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    fn push_error(&mut self, error: ReportError) {
        self.errors.push(error);
    }

    /// Aggregate totals and dedupe, then freeze the success flag.
    fn finish(mut self) -> Self {
        self.total_fee_lamports = self.steps.iter().map(|s| s.estimated_fee_lamports).sum();
        self.total_compute_units = self.steps.iter().map(|s| s.outcome.compute_units).sum();
        dedupe_in_place(&mut self.warnings);
        dedupe_in_place(&mut self.errors);
        self.success = self.errors.is_empty();
        self
    }
}

fn dedupe_in_place<T: PartialEq>(items: &mut Vec<T>) {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    *items = kept;
}

/// Orchestrates one dry-run flow. Independent `run()` calls are
/// parallel-safe; the only shared state is the gateway health table.
pub struct DryRunSimulator {
    gateway: Arc<RpcGateway>,
    builder: TransactionBuilder,
    probe: AccountStateProbe,
}

impl DryRunSimulator {
    pub fn new(gateway: Arc<RpcGateway>) -> Self {
        Self {
            builder: TransactionBuilder::new(gateway.clone()),
            probe: AccountStateProbe::new(gateway.clone()),
            gateway,
        }
    }

    /// Execute the full flow and return the report.
    ///
    /// Only internal invariant violations become `Err`; every other failure
    /// is recorded in the report with `success = false`. A report is only
    /// meaningful when this call returns; abandoning it mid-flight at an
    /// await point discards all partial state.
    #[instrument(skip(self, params), fields(mint = %params.mint, method = ?params.method))]
    pub async fn run(&self, params: &FlowParams) -> Result<DryRunReport> {
        let mut report = DryRunReport::empty();

        // Blocking format validation comes first: no network traffic for
        // garbage input.
        let inscription = match params.inscription_id.parse::<InscriptionRef>() {
            Ok(i) => i,
            Err(err) => {
                report.push_error(ReportError::from_engine("pre-flight", &err));
                return Ok(report.finish());
            }
        };
        if let Err(err) = crate::memo::validate_content_hash(&params.content_sha256) {
            report.push_error(ReportError::from_engine("pre-flight", &err));
            return Ok(report.finish());
        }

        // Advisory payer balance check; the simulation stays authoritative.
        match self.probe.payer_balance(&params.fee_payer).await {
            Ok(balance) if balance < params.min_payer_balance_lamports => {
                report.push_warning(format!(
                    "fee payer {} holds {balance} lamports, below the advisory minimum of {}",
                    params.fee_payer, params.min_payer_balance_lamports
                ));
            }
            Ok(_) => {}
            Err(err) => {
                report.push_warning(format!("could not check payer balance: {err}"));
            }
        }

        // Blocking: without a funded token account there is nothing to retire,
        // and no simulation is attempted for the RETIRE step.
        match self.probe.frozen_status(&params.mint, &params.owner).await {
            Ok(TokenAccountStatus::NotFound) => {
                report.push_error(ReportError::from_engine(
                    "pre-flight",
                    &EngineError::account_state(
                        params.owner.to_string(),
                        format!("owner has no token account for mint {}", params.mint),
                        "verify the owner address holds the token on this cluster",
                    ),
                ));
                return Ok(report.finish());
            }
            Ok(TokenAccountStatus::Found { balance: 0, .. }) => {
                report.push_error(ReportError::from_engine(
                    "pre-flight",
                    &EngineError::account_state(
                        params.owner.to_string(),
                        format!("token account for mint {} has zero balance", params.mint),
                        "the token has already left this account; nothing to retire",
                    ),
                ));
                return Ok(report.finish());
            }
            Ok(TokenAccountStatus::Found { frozen, .. }) => {
                if frozen {
                    report.push_warning(
                        "owner token account is frozen; the simulator will try fallback paths"
                            .to_string(),
                    );
                }
            }
            Err(err @ EngineError::Internal(_)) => return Err(err),
            Err(err) => {
                report.push_error(ReportError::from_engine("pre-flight", &err));
                return Ok(report.finish());
            }
        }

        let seal_params = SealParams {
            inscription,
            mint: params.mint,
            fee_payer: params.fee_payer,
            content_sha256: params.content_sha256.clone(),
            extra: None,
        };

        match self.builder.build_seal(&seal_params).await {
            Ok(built) => self.simulate_and_record(built, &mut report).await?,
            Err(err @ EngineError::Internal(_)) => return Err(err),
            Err(err) => report.push_error(ReportError::from_engine("seal", &err)),
        }

        if params.include_metadata_update {
            match self.builder.build_metadata_update(&seal_params).await {
                Ok(built) => self.simulate_and_record(built, &mut report).await?,
                Err(err @ EngineError::Internal(_)) => return Err(err),
                Err(err) => report.push_error(ReportError::from_engine("metadata_update", &err)),
            }
        }

        self.run_retire(params, inscription, &mut report).await?;

        let report = report.finish();
        info!(
            success = report.success,
            steps = report.steps.len(),
            total_fee_lamports = report.total_fee_lamports,
            warnings = report.warnings.len(),
            errors = report.errors.len(),
            "dry run complete"
        );
        Ok(report)
    }

    /// Generate the persistable receipt for a completed report.
    pub fn receipt(report: &DryRunReport) -> receipt::Receipt {
        receipt::from_report(report)
    }

    /// Simulate one non-RETIRE step and record it with any blocking error.
    async fn simulate_and_record(
        &self,
        built: BuiltTransaction,
        report: &mut DryRunReport,
    ) -> Result<()> {
        let kind = built.kind;
        match self.simulate_built(&built).await {
            Ok(outcome) => {
                if let (false, Some(kind_err)) = (outcome.succeeded, outcome.classified) {
                    let err_text = outcome.error.clone().unwrap_or_default();
                    report.push_error(ReportError::from_simulation(kind, kind_err, &err_text));
                }
                push_step(report, built, outcome)?;
            }
            Err(gateway_err) => {
                report.push_error(ReportError::from_engine(
                    &kind.to_string(),
                    &EngineError::Rpc(gateway_err),
                ));
            }
        }
        Ok(())
    }

    /// RETIRE with the frozen-account fallback state machine:
    /// `Initial -> TriedPrimary -> TriedAlternateProgram -> TriedAlternateRpc
    /// -> Exhausted`, each transition recorded for auditability.
    async fn run_retire(
        &self,
        params: &FlowParams,
        inscription: InscriptionRef,
        report: &mut DryRunReport,
    ) -> Result<()> {
        report.fallback_trail.push(FallbackStage::Initial);

        let retire_params = RetireParams {
            method: params.method,
            inscription,
            mint: params.mint,
            owner: params.owner,
            fee_payer: params.fee_payer,
            amount: params.amount,
            content_sha256: params.content_sha256.clone(),
            close_source_account: params.close_source_account,
            token_program_override: None,
        };

        let built = match self.builder.build_retire(&retire_params).await {
            Ok(b) => b,
            Err(err @ EngineError::Internal(_)) => return Err(err),
            Err(err) => {
                report.push_error(ReportError::from_engine("retire", &err));
                return Ok(());
            }
        };
        let outcome = match self.simulate_built(&built).await {
            Ok(o) => o,
            Err(gateway_err) => {
                report.push_error(ReportError::from_engine(
                    "retire",
                    &EngineError::Rpc(gateway_err),
                ));
                return Ok(());
            }
        };
        report.fallback_trail.push(FallbackStage::TriedPrimary);

        match outcome.classified {
            None => push_step(report, built, outcome),
            Some(SimulationErrorKind::AccountFrozen) => {
                self.retry_frozen(params, &retire_params, built, outcome, report)
                    .await
            }
            Some(kind) => {
                let err_text = outcome.error.clone().unwrap_or_default();
                report.push_error(ReportError::from_simulation(StepKind::Retire, kind, &err_text));
                push_step(report, built, outcome)
            }
        }
    }

    /// Bounded recovery from a frozen-account classification: the alternate
    /// token program exactly once, then the same transaction against a
    /// secondary endpoint.
    async fn retry_frozen(
        &self,
        params: &FlowParams,
        retire_params: &RetireParams,
        primary_built: BuiltTransaction,
        primary_outcome: SimulationOutcome,
        report: &mut DryRunReport,
    ) -> Result<()> {
        warn!(mint = %params.mint, "retire simulation hit a frozen account, trying alternate token program");

        let probed_program = match self.probe.token_program_of(&params.mint).await {
            Ok(p) => p,
            Err(err) => {
                report.push_error(ReportError::from_engine("retire fallback", &err));
                return self.exhaust(params, primary_built, primary_outcome, report).await;
            }
        };
        let alternate = alternate_token_program(&probed_program);
        let alt_params = RetireParams {
            token_program_override: Some(alternate),
            ..retire_params.clone()
        };

        let alt_attempt = match self.builder.build_retire(&alt_params).await {
            Ok(b) => match self.simulate_built(&b).await {
                Ok(o) => Some((b, o)),
                Err(gateway_err) => {
                    report.push_warning(format!(
                        "alternate-program simulation could not run: {gateway_err}"
                    ));
                    None
                }
            },
            Err(err) => {
                report.push_warning(format!("alternate-program rebuild failed: {err}"));
                None
            }
        };
        report.fallback_trail.push(FallbackStage::TriedAlternateProgram);

        if let Some((alt_built, alt_outcome)) = alt_attempt {
            if alt_outcome.succeeded {
                report.push_warning(format!(
                    "retire simulation succeeded only under the alternate token program {alternate}; \
                     the probed program may be stale"
                ));
                return push_step(report, alt_built, alt_outcome);
            }
        }

        // Still frozen under both programs: replay the original transaction on
        // a different endpoint. A success here indicts the primary node's
        // state, not the chain.
        let primary_url = self.gateway.primary_url().await.unwrap_or_default();
        let tx = primary_built.transaction.clone();
        let secondary = self
            .gateway
            .with_secondary_endpoint(&primary_url, move |rpc| {
                let tx = tx.clone();
                async move { rpc.simulate_transaction(&tx).await }
            })
            .await;

        match secondary {
            Ok(exec) => {
                report.fallback_trail.push(FallbackStage::TriedAlternateRpc);
                let outcome = outcome_from(exec);
                report.alternate_rpc_succeeded = Some(outcome.succeeded);
                if outcome.succeeded {
                    report.push_warning(format!(
                        "simulation succeeded on a secondary endpoint but not on {primary_url}; \
                         the primary endpoint's account state appears inconsistent"
                    ));
                    push_step(report, primary_built, outcome)
                } else {
                    self.exhaust(params, primary_built, primary_outcome, report).await
                }
            }
            Err(GatewayError::NoSecondaryEndpoint { .. }) => {
                report.push_warning(
                    "no secondary rpc endpoint configured; rpc-inconsistency fallback skipped"
                        .to_string(),
                );
                self.exhaust(params, primary_built, primary_outcome, report).await
            }
            Err(gateway_err) => {
                report.fallback_trail.push(FallbackStage::TriedAlternateRpc);
                report.push_warning(format!(
                    "secondary-endpoint simulation could not run: {gateway_err}"
                ));
                self.exhaust(params, primary_built, primary_outcome, report).await
            }
        }
    }

    /// Terminal state of the fallback machine: record the frozen error with
    /// the full stage trail.
    async fn exhaust(
        &self,
        params: &FlowParams,
        built: BuiltTransaction,
        outcome: SimulationOutcome,
        report: &mut DryRunReport,
    ) -> Result<()> {
        report.fallback_trail.push(FallbackStage::Exhausted);
        let ata = match self.probe.token_program_of(&params.mint).await {
            Ok(program) => {
                get_associated_token_address_with_program_id(&params.owner, &params.mint, &program)
                    .to_string()
            }
            Err(_) => params.owner.to_string(),
        };
        let stages: Vec<String> = report.fallback_trail.iter().map(|s| s.to_string()).collect();
        report.push_error(ReportError::from_engine(
            "retire",
            &EngineError::FrozenAccount { account: ata, stages },
        ));
        push_step(report, built, outcome)
    }

    async fn simulate_built(
        &self,
        built: &BuiltTransaction,
    ) -> std::result::Result<SimulationOutcome, GatewayError> {
        let tx = built.transaction.clone();
        let exec = self
            .gateway
            .with_best_endpoint(move |rpc| {
                let tx = tx.clone();
                async move { rpc.simulate_transaction(&tx).await }
            })
            .await?;
        Ok(outcome_from(exec))
    }
}

fn outcome_from(exec: SimulatedExecution) -> SimulationOutcome {
    let classified = exec.err.as_deref().map(|err| classify(err, &exec.logs));
    SimulationOutcome {
        succeeded: exec.err.is_none(),
        compute_units: exec.units_consumed.unwrap_or(0),
        error: exec.err,
        logs: exec.logs,
        classified,
    }
}

/// Decode and append one step to the report.
fn push_step(
    report: &mut DryRunReport,
    built: BuiltTransaction,
    outcome: SimulationOutcome,
) -> Result<()> {
    let decoded = decoder::decode(&built.transaction);
    for warning in &decoded.warnings {
        // The engine only ever holds unsigned transactions; that warning is
        // expected here and would only add noise to every report.
        if warning != "transaction is unsigned" {
            report.push_warning(format!("{}: {warning}", built.kind));
        }
    }
    let derived_iterations = decoded.instructions.iter().find_map(|ix| match &ix.parsed {
        Some(ParsedFields::Memo(MemoFormat::V1(MemoPayload::Retire(p)))) => {
            p.derived.as_ref().map(|d| d.iterations)
        }
        _ => None,
    });
    report.steps.push(StepReport {
        kind: built.kind,
        description: built.description.clone(),
        estimated_fee_lamports: built.estimated_fee_lamports,
        decoded,
        outcome,
        transaction_base64: built.to_base64()?,
        derived_iterations,
    });
    Ok(())
}
