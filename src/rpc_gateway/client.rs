//! The RPC seam: a read-and-simulate-only view of the ledger
//!
//! `LedgerRpc` is the only way the engine touches the network. The trait has
//! no send or sign methods at all, which enforces the no-state-mutation
//! invariant at the type level: a dry run cannot broadcast even by accident.

use async_trait::async_trait;
use solana_client::{
    nonblocking::rpc_client::RpcClient, rpc_config::RpcSimulateTransactionConfig,
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, message::Message,
    pubkey::Pubkey, transaction::Transaction,
};

use super::GatewayError;
use crate::types::SimulatedExecution;

/// Read-only ledger operations used by the engine.
///
/// Implementations report failures as [`GatewayError`] carrying their own
/// endpoint URL, so the gateway can do health accounting without re-parsing.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    fn url(&self) -> &str;

    /// Cheap liveness/sync probe used by the health loop.
    async fn check_health(&self) -> Result<(), GatewayError>;

    /// Fetch an account; `Ok(None)` means the account does not exist.
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, GatewayError>;

    /// Lamport balance of an account (0 if missing).
    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, GatewayError>;

    async fn latest_blockhash(&self) -> Result<Hash, GatewayError>;

    /// Network fee for a compiled message.
    async fn fee_for_message(&self, message: &Message) -> Result<u64, GatewayError>;

    /// Read-only simulation; signature verification is disabled because the
    /// engine only ever holds unsigned transactions.
    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulatedExecution, GatewayError>;
}

/// Production implementation over the nonblocking solana-client.
pub struct SolanaRpc {
    url: String,
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            client: RpcClient::new(url.clone()),
            url,
            commitment: CommitmentConfig::confirmed(),
        }
    }

    fn transport(&self, err: impl std::fmt::Display) -> GatewayError {
        GatewayError::Transport {
            endpoint: self.url.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    fn url(&self) -> &str {
        &self.url
    }

    async fn check_health(&self) -> Result<(), GatewayError> {
        self.client.get_version().await.map_err(|e| self.transport(e))?;
        self.client.get_slot().await.map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, GatewayError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(response.value)
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, GatewayError> {
        self.client
            .get_balance(pubkey)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.transport(e))
    }

    async fn fee_for_message(&self, message: &Message) -> Result<u64, GatewayError> {
        self.client
            .get_fee_for_message(message)
            .await
            .map_err(|e| self.transport(e))
    }

    async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<SimulatedExecution, GatewayError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await
            .map_err(|e| self.transport(e))?;
        let result = response.value;
        Ok(SimulatedExecution {
            err: result.err.map(|e| e.to_string()),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }
}
