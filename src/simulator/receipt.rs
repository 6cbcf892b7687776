//! Receipt generation: a minimal, stable, versioned JSON view of a report
//!
//! Pure functions only: no side effects, no I/O, deterministic for a fixed
//! report. The receipt is the form callers persist or show to end users;
//! its schema is versioned independently of the crate.

use serde::{Deserialize, Serialize};

use crate::types::{FallbackStage, StepKind};

use super::{DryRunReport, ReportError};

pub const RECEIPT_VERSION: u32 = 1;

/// Persistable summary of one dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_version: u32,
    pub success: bool,
    pub total_fee_lamports: u64,
    pub total_compute_units: u64,
    pub steps: Vec<ReceiptStep>,
    pub warnings: Vec<String>,
    pub errors: Vec<ReportError>,
    pub fallback_trail: Vec<FallbackStage>,
    /// Whether the alternate-RPC diagnostic replay succeeded, when attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_rpc_succeeded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptStep {
    pub step: StepKind,
    pub description: String,
    pub fee_lamports: u64,
    pub compute_units: u64,
    pub simulated_ok: bool,
    /// Base64 transaction for the external signer.
    pub transaction_base64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_iterations: Option<u32>,
}

/// Convert a completed report into its receipt form.
pub fn from_report(report: &DryRunReport) -> Receipt {
    Receipt {
        receipt_version: RECEIPT_VERSION,
        success: report.success,
        total_fee_lamports: report.total_fee_lamports,
        total_compute_units: report.total_compute_units,
        steps: report
            .steps
            .iter()
            .map(|s| ReceiptStep {
                step: s.kind,
                description: s.description.clone(),
                fee_lamports: s.estimated_fee_lamports,
                compute_units: s.outcome.compute_units,
                simulated_ok: s.outcome.succeeded,
                transaction_base64: s.transaction_base64.clone(),
                derived_iterations: s.derived_iterations,
            })
            .collect(),
        warnings: report.warnings.clone(),
        errors: report.errors.clone(),
        fallback_trail: report.fallback_trail.clone(),
        alternate_rpc_succeeded: report.alternate_rpc_succeeded,
    }
}

impl Receipt {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimulationOutcome;

    fn report() -> DryRunReport {
        DryRunReport {
            steps: vec![super::super::StepReport {
                kind: StepKind::Seal,
                description: "seal".to_string(),
                estimated_fee_lamports: 5000,
                decoded: crate::decoder::decode(&Default::default()),
                outcome: SimulationOutcome {
                    succeeded: true,
                    compute_units: 1200,
                    error: None,
                    logs: vec![],
                    classified: None,
                },
                transaction_base64: "AAEC".to_string(),
                derived_iterations: None,
            }],
            total_fee_lamports: 5000,
            total_compute_units: 1200,
            warnings: vec!["low balance".to_string()],
            errors: vec![],
            fallback_trail: vec![FallbackStage::Initial, FallbackStage::TriedPrimary],
            alternate_rpc_succeeded: None,
            success: true,
        }
    }

    #[test]
    fn receipt_is_deterministic() {
        let r = report();
        let a = from_report(&r).to_json().expect("serializes");
        let b = from_report(&r).to_json().expect("serializes");
        assert_eq!(a, b);
    }

    #[test]
    fn receipt_round_trips_through_json() {
        let receipt = from_report(&report());
        let json = receipt.to_json().expect("serializes");
        let parsed: Receipt = serde_json::from_str(&json).expect("parses");
        assert_eq!(parsed, receipt);
        assert_eq!(parsed.receipt_version, RECEIPT_VERSION);
    }

    #[test]
    fn absent_rpc_diagnostic_is_omitted() {
        let json = from_report(&report()).to_json().expect("serializes");
        assert!(!json.contains("alternate_rpc_succeeded"));
    }
}
