//! Simulation failure classification
//!
//! The single place where program error text and log lines are inspected.
//! Everything downstream pattern-matches on the closed [`SimulationErrorKind`]
//! instead of re-parsing strings.

use crate::types::SimulationErrorKind;

/// SPL Token custom error codes surfaced as `custom program error: 0x..`.
const TOKEN_ERR_INSUFFICIENT_FUNDS: u32 = 1;
const TOKEN_ERR_ACCOUNT_FROZEN: u32 = 17;

/// Classify a failed simulation from its error text and program logs.
pub fn classify(err: &str, logs: &[String]) -> SimulationErrorKind {
    let mut haystack = err.to_lowercase();
    for log in logs {
        haystack.push('\n');
        haystack.push_str(&log.to_lowercase());
    }

    if let Some(code) = custom_error_code(&haystack) {
        match code {
            TOKEN_ERR_ACCOUNT_FROZEN => return SimulationErrorKind::AccountFrozen,
            TOKEN_ERR_INSUFFICIENT_FUNDS => return SimulationErrorKind::InsufficientFunds,
            _ => {}
        }
    }

    if haystack.contains("frozen") {
        SimulationErrorKind::AccountFrozen
    } else if haystack.contains("insufficient funds") || haystack.contains("insufficient lamports")
    {
        SimulationErrorKind::InsufficientFunds
    } else if haystack.contains("account not found")
        || haystack.contains("accountnotfound")
        || haystack.contains("could not find account")
        || haystack.contains("uninitialized account")
    {
        SimulationErrorKind::AccountNotFound
    } else if haystack.contains("incorrect program id")
        || haystack.contains("invalidprogramid")
        || haystack.contains("owner does not match")
        || haystack.contains("invalidaccountowner")
    {
        SimulationErrorKind::InvalidProgram
    } else {
        SimulationErrorKind::Unknown
    }
}

/// Extract the hex code from the first `custom program error: 0x..` in the
/// text, if any.
fn custom_error_code(haystack: &str) -> Option<u32> {
    let rest = haystack.split("custom program error: 0x").nth(1)?;
    let hex: String = rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&hex, 16).ok()
}
