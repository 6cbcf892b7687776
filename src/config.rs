//! Configuration loading from TOML files
//!
//! One file configures the whole engine: RPC endpoints with health tunables,
//! and flow-level knobs for the dry-run simulator. Every tunable has a
//! default so a minimal config only needs the endpoint list.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::rpc_gateway::RpcGatewayConfig;
use crate::simulator::DEFAULT_MIN_PAYER_BALANCE_LAMPORTS;

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoints and health tunables
    pub rpc: RpcConfig,

    /// Dry-run flow knobs
    #[serde(default)]
    pub flow: FlowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Endpoint URLs in priority order; the first is the primary.
    pub endpoints: Vec<String>,

    /// Consecutive failures before an endpoint is demoted
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Background health probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Deadline for one health probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Deadline for one RPC call in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Advisory fee-payer balance floor in lamports
    #[serde(default = "default_min_payer_balance")]
    pub min_payer_balance_lamports: u64,

    /// Include the placeholder metadata-update step in dry runs
    #[serde(default)]
    pub include_metadata_update: bool,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_probe_interval() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    2
}
fn default_call_timeout() -> u64 {
    10
}
fn default_min_payer_balance() -> u64 {
    DEFAULT_MIN_PAYER_BALANCE_LAMPORTS
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_payer_balance_lamports: default_min_payer_balance(),
            include_metadata_update: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: vec!["https://api.mainnet-beta.solana.com".to_string()],
                failure_threshold: default_failure_threshold(),
                probe_interval_secs: default_probe_interval(),
                probe_timeout_secs: default_probe_timeout(),
                call_timeout_secs: default_call_timeout(),
            },
            flow: FlowConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            EngineError::validation(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.endpoints.is_empty() {
            return Err(EngineError::validation(
                "config must list at least one rpc endpoint".to_string(),
            ));
        }
        if self.rpc.call_timeout_secs == 0 {
            return Err(EngineError::validation(
                "rpc.call_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gateway_config(&self) -> RpcGatewayConfig {
        RpcGatewayConfig {
            failure_threshold: self.rpc.failure_threshold,
            probe_interval: Duration::from_secs(self.rpc.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.rpc.probe_timeout_secs),
            call_timeout: Duration::from_secs(self.rpc.call_timeout_secs),
        }
    }
}
