//! Shared error taxonomy for the teleburn engine
//!
//! Five externally visible categories, mirroring the lifecycle of a dry run:
//! - `Validation`: malformed inscription id / hash / address, never retried
//! - `AccountState`: missing or empty token account, blocking with remediation
//! - `FrozenAccount`: classified from simulation logs, triggers bounded fallback
//! - `Rpc`: transport/endpoint failures, retried inside the gateway first
//! - `Internal`: invariant violations, always fatal, never silently handled
//!
//! Warnings are deliberately not errors: they travel in the report's warning
//! channel and never affect the success flag.

use thiserror::Error;

use crate::rpc_gateway::GatewayError;

/// Error type for the whole engine surface.
///
/// Every variant carries enough structured context (step, account, endpoint)
/// to be actionable without re-running the flow.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed caller input: inscription id, content hash, address, amount.
    #[error("validation error: {0}")]
    Validation(String),

    /// Token-account state makes the retirement impossible as requested.
    #[error("account state error ({account}): {reason}")]
    AccountState {
        /// Account the check ran against (base58)
        account: String,
        /// What was wrong
        reason: String,
        /// What the caller can do about it
        remediation: String,
    },

    /// The owner's token account is frozen and every fallback path was
    /// exhausted. `stages` names the fallback transitions that were attempted.
    #[error("token account frozen ({account}), fallback exhausted after {stages:?}")]
    FrozenAccount {
        account: String,
        stages: Vec<String>,
    },

    /// RPC-level failure that survived gateway failover.
    #[error("rpc error: {0}")]
    Rpc(#[from] GatewayError),

    /// Logic defect inside the engine. Must abort loudly, never be retried or
    /// downgraded to a warning.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_retryable(),
            Self::FrozenAccount { .. } => false,
            Self::Validation(_) | Self::AccountState { .. } | Self::Internal(_) => false,
        }
    }

    /// Stable category label for logs and receipts.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AccountState { .. } => "account_state",
            Self::FrozenAccount { .. } => "frozen_account",
            Self::Rpc(_) => "rpc",
            Self::Internal(_) => "internal",
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn account_state(
        account: impl Into<String>,
        reason: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::AccountState {
            account: account.into(),
            reason: reason.into(),
            remediation: remediation.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Remediation string surfaced to the caller, when one exists.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::AccountState { remediation, .. } => Some(remediation),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        assert_eq!(EngineError::validation("x").category(), "validation");
        assert_eq!(
            EngineError::account_state("acc", "missing", "create it").category(),
            "account_state"
        );
        assert_eq!(EngineError::internal("bug").category(), "internal");
    }

    #[test]
    fn validation_is_never_retryable() {
        assert!(!EngineError::validation("bad id").is_retryable());
        assert!(!EngineError::internal("cap exceeded").is_retryable());
    }

    #[test]
    fn account_state_carries_remediation() {
        let err = EngineError::account_state("abc", "zero balance", "fund the account");
        assert_eq!(err.remediation(), Some("fund the account"));
        assert_eq!(EngineError::validation("x").remediation(), None);
    }
}
