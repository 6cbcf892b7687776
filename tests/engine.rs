//! End-to-end dry-run flows against an in-memory ledger mock.
//!
//! The mock implements the read-only RPC seam over a fixed account map and a
//! per-endpoint script of which token programs report frozen failures. No
//! network, no signing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::program_pack::Pack;
use solana_sdk::{
    account::Account, hash::Hash, message::Message, pubkey::Pubkey, transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use spl_token::solana_program::program_option::COption;

use teleburn::derive;
use teleburn::probe::TOKEN_2022_PROGRAM_ID;
use teleburn::rpc_gateway::{GatewayError, LedgerRpc, RpcGateway, RpcGatewayConfig};
use teleburn::simulator::{DryRunSimulator, FlowParams};
use teleburn::types::{FallbackStage, InscriptionRef, RetirementMethod, SimulatedExecution, StepKind};

const LAMPORTS_PER_SIG: u64 = 5_000;

/// In-memory endpoint: serves accounts from a shared map and fails
/// simulations that touch any of its `frozen_programs`.
struct MockLedger {
    url: String,
    accounts: Arc<HashMap<Pubkey, Account>>,
    frozen_programs: Vec<Pubkey>,
    simulations: AtomicU32,
    frozen_hits: AtomicU32,
}

impl MockLedger {
    fn new(
        url: &str,
        accounts: Arc<HashMap<Pubkey, Account>>,
        frozen_programs: Vec<Pubkey>,
    ) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            accounts,
            frozen_programs,
            simulations: AtomicU32::new(0),
            frozen_hits: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    fn url(&self) -> &str {
        &self.url
    }

    async fn check_health(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, GatewayError> {
        Ok(self.accounts.get(pubkey).cloned())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, GatewayError> {
        Ok(self.accounts.get(pubkey).map(|a| a.lamports).unwrap_or(0))
    }

    async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
        Ok(Hash::new_unique())
    }

    async fn fee_for_message(&self, message: &Message) -> Result<u64, GatewayError> {
        Ok(message.header.num_required_signatures as u64 * LAMPORTS_PER_SIG)
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulatedExecution, GatewayError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        let frozen = transaction
            .message
            .account_keys
            .iter()
            .any(|k| self.frozen_programs.contains(k));
        if frozen {
            self.frozen_hits.fetch_add(1, Ordering::SeqCst);
            Ok(SimulatedExecution {
                err: Some(
                    "Error processing Instruction 0: custom program error: 0x11".to_string(),
                ),
                logs: vec!["Program log: Error: Account is frozen".to_string()],
                units_consumed: Some(2_000),
            })
        } else {
            Ok(SimulatedExecution {
                err: None,
                logs: vec!["Program log: ok".to_string()],
                units_consumed: Some(1_500),
            })
        }
    }
}

struct Fixture {
    mint: Pubkey,
    owner: Pubkey,
    accounts: Arc<HashMap<Pubkey, Account>>,
}

/// A legacy-SPL mint with supply 1 and one funded holder.
fn fixture(amount: u64, frozen: bool) -> Fixture {
    let mint = Pubkey::new_unique();
    let owner = Pubkey::new_unique();
    let ata = get_associated_token_address_with_program_id(&owner, &mint, &spl_token::id());

    let mut mint_data = vec![0u8; spl_token::state::Mint::LEN];
    spl_token::state::Mint::pack(
        spl_token::state::Mint {
            mint_authority: COption::None,
            supply: 1,
            decimals: 0,
            is_initialized: true,
            freeze_authority: COption::Some(Pubkey::new_unique()),
        },
        &mut mint_data,
    )
    .expect("packs");

    let mut ata_data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(
        spl_token::state::Account {
            mint,
            owner,
            amount,
            delegate: COption::None,
            state: if frozen {
                spl_token::state::AccountState::Frozen
            } else {
                spl_token::state::AccountState::Initialized
            },
            is_native: COption::None,
            delegated_amount: 0,
            close_authority: COption::None,
        },
        &mut ata_data,
    )
    .expect("packs");

    let mut accounts = HashMap::new();
    accounts.insert(
        mint,
        Account {
            lamports: 1_461_600,
            data: mint_data,
            owner: spl_token::id(),
            executable: false,
            rent_epoch: 0,
        },
    );
    accounts.insert(
        ata,
        Account {
            lamports: 2_039_280,
            data: ata_data,
            owner: spl_token::id(),
            executable: false,
            rent_epoch: 0,
        },
    );
    accounts.insert(
        owner,
        Account {
            lamports: 1_000_000_000,
            data: vec![],
            owner: solana_sdk::system_program::id(),
            executable: false,
            rent_epoch: 0,
        },
    );

    Fixture {
        mint,
        owner,
        accounts: Arc::new(accounts),
    }
}

fn flow_params(fixture: &Fixture, method: RetirementMethod) -> FlowParams {
    FlowParams {
        inscription_id: format!("{}i0", "a".repeat(64)),
        mint: fixture.mint,
        owner: fixture.owner,
        fee_payer: fixture.owner,
        method,
        amount: 1,
        content_sha256: "b".repeat(64),
        close_source_account: false,
        include_metadata_update: false,
        min_payer_balance_lamports: 10_000_000,
    }
}

fn gateway_of(mocks: Vec<Arc<MockLedger>>) -> Arc<RpcGateway> {
    let clients = mocks
        .into_iter()
        .enumerate()
        .map(|(i, m)| (m as Arc<dyn LedgerRpc>, i as u32))
        .collect();
    Arc::new(RpcGateway::new(clients, RpcGatewayConfig::default()))
}

#[tokio::test]
async fn send_to_derived_flow_succeeds_end_to_end() {
    let fix = fixture(1, false);
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock.clone()]));

    let params = flow_params(&fix, RetirementMethod::SendToDerived);
    let report = simulator.run(&params).await.expect("flow runs");

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].kind, StepKind::Seal);
    assert_eq!(report.steps[1].kind, StepKind::Retire);
    assert_eq!(
        report.fallback_trail,
        vec![FallbackStage::Initial, FallbackStage::TriedPrimary]
    );
    assert_eq!(report.alternate_rpc_succeeded, None);

    // One signature each for seal and retire.
    assert_eq!(report.total_fee_lamports, 2 * LAMPORTS_PER_SIG);
    assert_eq!(report.total_compute_units, 3_000);

    // The retire memo publishes the derivation the builder actually used.
    let inscription: InscriptionRef = params.inscription_id.parse().expect("valid");
    let expected = derive::derive(&inscription).expect("derives");
    assert_eq!(report.steps[1].derived_iterations, Some(expected.iterations));
    assert!(expected.iterations <= 100);

    let receipt = DryRunSimulator::receipt(&report);
    let json = receipt.to_json().expect("serializes");
    assert!(json.contains("\"receipt_version\": 1"));
    assert!(!receipt.steps[1].transaction_base64.is_empty());
}

#[tokio::test]
async fn zero_balance_blocks_before_any_simulation() {
    let fix = fixture(0, false);
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock.clone()]));

    let report = simulator
        .run(&flow_params(&fix, RetirementMethod::Burn))
        .await
        .expect("flow runs");

    assert!(!report.success);
    assert!(report.steps.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].category, "account_state");
    assert!(report.errors[0].message.contains("zero balance"));
    assert!(report.errors[0].remediation.is_some());
    assert_eq!(
        mock.simulations.load(Ordering::SeqCst),
        0,
        "nothing is simulated when the pre-flight blocks"
    );
}

#[tokio::test]
async fn missing_token_account_blocks_with_remediation() {
    let fix = fixture(1, false);
    let stranger = Pubkey::new_unique();
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock]));

    let mut params = flow_params(&fix, RetirementMethod::Burn);
    params.owner = stranger;
    let report = simulator.run(&params).await.expect("flow runs");

    assert!(!report.success);
    assert_eq!(report.errors[0].category, "account_state");
    assert!(report.errors[0].message.contains("no token account"));
}

#[tokio::test]
async fn malformed_inscription_id_fails_without_network_use() {
    let fix = fixture(1, false);
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock.clone()]));

    let mut params = flow_params(&fix, RetirementMethod::Burn);
    params.inscription_id = "not-an-inscription".to_string();
    let report = simulator.run(&params).await.expect("flow runs");

    assert!(!report.success);
    assert_eq!(report.errors[0].category, "validation");
    assert_eq!(mock.simulations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn frozen_account_recovers_under_alternate_token_program() {
    let fix = fixture(1, true);
    // Simulations touching the legacy program fail frozen; Token-2022 passes.
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![spl_token::id()]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock.clone()]));

    let report = simulator
        .run(&flow_params(&fix, RetirementMethod::Burn))
        .await
        .expect("flow runs");

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(
        report.fallback_trail,
        vec![
            FallbackStage::Initial,
            FallbackStage::TriedPrimary,
            FallbackStage::TriedAlternateProgram,
        ]
    );
    // Pre-flight saw the frozen flag, and the fallback explains the recovery.
    assert!(report.warnings.iter().any(|w| w.contains("frozen")));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("alternate token program")));
    // Exactly one frozen failure: the primary attempt. The alternate-program
    // attempt is made once, not in a loop.
    assert_eq!(mock.frozen_hits.load(Ordering::SeqCst), 1);
    // seal + primary retire + alternate retire
    assert_eq!(mock.simulations.load(Ordering::SeqCst), 3);

    let retire = report
        .steps
        .iter()
        .find(|s| s.kind == StepKind::Retire)
        .expect("retire step recorded");
    assert!(retire.outcome.succeeded);
    assert!(retire
        .decoded
        .instructions
        .iter()
        .any(|ix| ix.program_id == TOKEN_2022_PROGRAM_ID));
}

#[tokio::test]
async fn frozen_on_one_endpoint_only_is_flagged_as_rpc_inconsistency() {
    let fix = fixture(1, true);
    // The primary node reports frozen under both programs; the secondary
    // serves the same accounts and simulates cleanly.
    let primary = MockLedger::new(
        "http://primary",
        fix.accounts.clone(),
        vec![spl_token::id(), TOKEN_2022_PROGRAM_ID],
    );
    let secondary = MockLedger::new("http://secondary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![primary.clone(), secondary.clone()]));

    let report = simulator
        .run(&flow_params(&fix, RetirementMethod::Burn))
        .await
        .expect("flow runs");

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(
        report.fallback_trail,
        vec![
            FallbackStage::Initial,
            FallbackStage::TriedPrimary,
            FallbackStage::TriedAlternateProgram,
            FallbackStage::TriedAlternateRpc,
        ]
    );
    assert_eq!(report.alternate_rpc_succeeded, Some(true));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("appears inconsistent")));
    assert_eq!(secondary.simulations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn frozen_everywhere_exhausts_the_fallback_machine() {
    let fix = fixture(1, true);
    let mock = MockLedger::new(
        "http://only",
        fix.accounts.clone(),
        vec![spl_token::id(), TOKEN_2022_PROGRAM_ID],
    );
    let simulator = DryRunSimulator::new(gateway_of(vec![mock.clone()]));

    let report = simulator
        .run(&flow_params(&fix, RetirementMethod::Burn))
        .await
        .expect("flow runs");

    assert!(!report.success);
    assert_eq!(
        report.fallback_trail,
        vec![
            FallbackStage::Initial,
            FallbackStage::TriedPrimary,
            FallbackStage::TriedAlternateProgram,
            FallbackStage::Exhausted,
        ]
    );
    // A single endpoint has no secondary: the rpc replay is skipped, not failed.
    assert_eq!(report.alternate_rpc_succeeded, None);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("rpc-inconsistency fallback skipped")));

    let frozen = report
        .errors
        .iter()
        .find(|e| e.category == "frozen_account")
        .expect("frozen error recorded");
    assert!(frozen.message.contains("tried_alternate_program"));
    assert!(frozen.message.contains("exhausted"));
}

#[tokio::test]
async fn send_to_void_flow_builds_transfer_to_incinerator() {
    let fix = fixture(1, false);
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock]));

    let report = simulator
        .run(&flow_params(&fix, RetirementMethod::SendToVoid))
        .await
        .expect("flow runs");

    assert!(report.success, "errors: {:?}", report.errors);
    let retire = &report.steps[1];
    assert!(retire.description.contains("incinerator"));
    assert!(retire
        .decoded
        .instructions
        .iter()
        .any(|ix| ix.instruction_label.contains("transfer")));
    // No derivation is published for a plain incineration.
    assert_eq!(retire.derived_iterations, None);
}

#[tokio::test]
async fn low_payer_balance_warns_but_does_not_block() {
    let fix = fixture(1, false);
    let mock = MockLedger::new("http://primary", fix.accounts.clone(), vec![]);
    let simulator = DryRunSimulator::new(gateway_of(vec![mock]));

    let mut params = flow_params(&fix, RetirementMethod::Burn);
    params.min_payer_balance_lamports = 2_000_000_000;
    let report = simulator.run(&params).await.expect("flow runs");

    assert!(report.success);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("below the advisory minimum")));
}
