//! Teleburn transaction engine
//!
//! Retires Solana NFTs with a verifiable, memo-anchored link to a Bitcoin
//! Ordinals inscription. The engine derives provably off-curve destination
//! addresses, builds unsigned SEAL and RETIRE transactions, decodes them for
//! review, and dry-runs them against real RPC endpoints with failover and a
//! bounded frozen-account fallback.
//!
//! The engine never signs and never submits: the RPC seam ([`rpc_gateway::LedgerRpc`])
//! has no send or sign methods, so chain mutation is impossible by
//! construction. Callers take the base64 transactions from the receipt to an
//! external signer.

pub mod config;
pub mod decoder;
pub mod derive;
pub mod error;
pub mod memo;
pub mod probe;
pub mod rpc_gateway;
pub mod simulator;
pub mod tx_builder;
pub mod types;

pub use config::Config;
pub use error::{EngineError, Result};
pub use simulator::{DryRunReport, DryRunSimulator, FlowParams};
pub use types::{InscriptionRef, RetirementMethod};
