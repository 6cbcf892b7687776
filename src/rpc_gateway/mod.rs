//! RPC gateway: endpoint health tracking and failover execution
//!
//! The gateway owns the only shared mutable state in the engine: the endpoint
//! health table. Callers hand it an operation over the read-only [`LedgerRpc`]
//! seam and it executes against the best available endpoint, failing over in
//! ascending priority order. A background loop probes demoted endpoints and
//! promotes them back independently of traffic.
//!
//! There are no ambient globals: the gateway is constructed explicitly and
//! passed by reference into every component that needs network access.

mod client;
mod endpoint;

pub use client::{LedgerRpc, SolanaRpc};
pub use endpoint::{EndpointHealth, EndpointSnapshot, EndpointState};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Failures surfaced by the gateway layer.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Network or server-side failure from one endpoint.
    #[error("transport error ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },

    /// A call against one endpoint exceeded its deadline.
    #[error("timeout after {timeout_ms}ms ({endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The gateway was constructed without endpoints.
    #[error("no rpc endpoints configured")]
    NoEndpoints,

    /// A secondary-endpoint operation was requested but only one endpoint
    /// exists. Diagnostic fallbacks treat this as "skipped", not as failure.
    #[error("no secondary endpoint distinct from {primary} is configured")]
    NoSecondaryEndpoint { primary: String },

    /// Every candidate endpoint was tried and failed.
    #[error("all rpc endpoints failed (attempted: {})", attempted.join(", "))]
    AllEndpointsFailed {
        attempted: Vec<String>,
        last_error: String,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::AllEndpointsFailed { .. } => true,
            Self::NoEndpoints | Self::NoSecondaryEndpoint { .. } => false,
        }
    }

    /// Endpoint this error came from, when attributable to one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transport { endpoint, .. } | Self::Timeout { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

/// Tunables for health accounting and call deadlines.
#[derive(Debug, Clone)]
pub struct RpcGatewayConfig {
    /// Consecutive failures before an endpoint is demoted.
    pub failure_threshold: u32,
    /// Interval of the background health probe.
    pub probe_interval: Duration,
    /// Deadline for one health probe.
    pub probe_timeout: Duration,
    /// Deadline for one dispatched operation against one endpoint.
    pub call_timeout: Duration,
}

impl Default for RpcGatewayConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Health-tracked set of RPC endpoints with priority-ordered failover.
pub struct RpcGateway {
    endpoints: Vec<Arc<EndpointState>>,
    config: RpcGatewayConfig,
}

impl RpcGateway {
    /// Build from explicit `(client, priority)` pairs. Lower priority is
    /// tried first.
    pub fn new(clients: Vec<(Arc<dyn LedgerRpc>, u32)>, config: RpcGatewayConfig) -> Self {
        let mut endpoints: Vec<Arc<EndpointState>> = clients
            .into_iter()
            .map(|(rpc, priority)| Arc::new(EndpointState::new(rpc, priority)))
            .collect();
        endpoints.sort_by_key(|e| e.priority());
        Self { endpoints, config }
    }

    /// Build from URLs; list order is priority order.
    pub fn from_urls<I, S>(urls: I, config: RpcGatewayConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clients = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                (
                    Arc::new(SolanaRpc::new(url.into())) as Arc<dyn LedgerRpc>,
                    i as u32,
                )
            })
            .collect();
        Self::new(clients, config)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// URL of the endpoint `with_best_endpoint` would try first right now.
    pub async fn primary_url(&self) -> Option<String> {
        for ep in &self.endpoints {
            if ep.is_healthy().await {
                return Some(ep.url().to_string());
            }
        }
        self.endpoints.first().map(|e| e.url().to_string())
    }

    /// Execute `op` against the best available endpoint with failover.
    ///
    /// Healthy endpoints are tried in ascending priority order; if none is
    /// healthy, all endpoints are tried anyway as a last resort so the
    /// gateway cannot wedge between probe cycles. On exhaustion the error
    /// names every endpoint attempted. A success resets that endpoint's
    /// failure streak.
    pub async fn with_best_endpoint<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn LedgerRpc>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send,
    {
        if self.endpoints.is_empty() {
            return Err(GatewayError::NoEndpoints);
        }

        let mut candidates = Vec::with_capacity(self.endpoints.len());
        for ep in &self.endpoints {
            if ep.is_healthy().await {
                candidates.push(ep.clone());
            }
        }
        if candidates.is_empty() {
            debug!("no healthy endpoints, attempting all as last resort");
            candidates = self.endpoints.clone();
        }

        self.try_candidates(&candidates, op).await
    }

    /// Execute `op` against an endpoint other than `exclude_url`.
    ///
    /// Used by the simulator's RPC-inconsistency fallback: some simulation
    /// failures reflect a single node's stale view, not chain state, and
    /// replaying elsewhere is diagnostic evidence.
    pub async fn with_secondary_endpoint<T, F, Fut>(
        &self,
        exclude_url: &str,
        op: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn LedgerRpc>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send,
    {
        let mut candidates = Vec::new();
        for ep in &self.endpoints {
            if ep.url() != exclude_url && ep.is_healthy().await {
                candidates.push(ep.clone());
            }
        }
        if candidates.is_empty() {
            return Err(GatewayError::NoSecondaryEndpoint {
                primary: exclude_url.to_string(),
            });
        }

        self.try_candidates(&candidates, op).await
    }

    async fn try_candidates<T, F, Fut>(
        &self,
        candidates: &[Arc<EndpointState>],
        op: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn LedgerRpc>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send,
    {
        let mut attempted = Vec::with_capacity(candidates.len());
        let mut last_error = String::new();

        for ep in candidates {
            attempted.push(ep.url().to_string());
            let outcome = tokio::time::timeout(self.config.call_timeout, op(ep.rpc())).await;
            match outcome {
                Ok(Ok(value)) => {
                    ep.record_success().await;
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    warn!(url = %ep.url(), error = %err, "endpoint call failed, trying next");
                    ep.record_failure(self.config.failure_threshold).await;
                    last_error = err.to_string();
                }
                Err(_elapsed) => {
                    let err = GatewayError::Timeout {
                        endpoint: ep.url().to_string(),
                        timeout_ms: self.config.call_timeout.as_millis() as u64,
                    };
                    warn!(url = %ep.url(), error = %err, "endpoint call timed out, trying next");
                    ep.record_failure(self.config.failure_threshold).await;
                    last_error = err.to_string();
                }
            }
        }

        Err(GatewayError::AllEndpointsFailed {
            attempted,
            last_error,
        })
    }

    /// Probe every endpoint once, promoting and demoting independently of
    /// request traffic.
    pub async fn probe_all(&self) {
        for ep in &self.endpoints {
            let result =
                tokio::time::timeout(self.config.probe_timeout, ep.rpc().check_health()).await;
            match result {
                Ok(Ok(())) => ep.record_success().await,
                Ok(Err(err)) => {
                    debug!(url = %ep.url(), error = %err, "health probe failed");
                    ep.record_failure(self.config.failure_threshold).await;
                }
                Err(_elapsed) => {
                    debug!(url = %ep.url(), "health probe timed out");
                    ep.record_failure(self.config.failure_threshold).await;
                }
            }
        }
    }

    /// Spawn the periodic health-check task. The loop runs until the handle
    /// is aborted or the runtime shuts down.
    pub fn spawn_health_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway = self.clone();
        let interval = gateway.config.probe_interval;
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "starting rpc health loop");
            loop {
                gateway.probe_all().await;
                tokio::time::sleep(interval).await;
            }
        })
    }

    /// Snapshot of the health table for reports and logs.
    pub async fn snapshots(&self) -> Vec<EndpointSnapshot> {
        let mut out = Vec::with_capacity(self.endpoints.len());
        for ep in &self.endpoints {
            out.push(ep.snapshot().await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use solana_sdk::{
        account::Account, hash::Hash, message::Message, pubkey::Pubkey, transaction::Transaction,
    };
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use crate::types::SimulatedExecution;

    /// Scripted endpoint: fails while `failing` is set, counts calls.
    struct ScriptedRpc {
        url: String,
        failing: AtomicBool,
        calls: AtomicU32,
    }

    impl ScriptedRpc {
        fn new(url: &str, failing: bool) -> Arc<Self> {
            Arc::new(Self {
                url: url.to_string(),
                failing: AtomicBool::new(failing),
                calls: AtomicU32::new(0),
            })
        }

        fn result<T: Default>(&self) -> Result<T, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(GatewayError::Transport {
                    endpoint: self.url.clone(),
                    message: "scripted failure".to_string(),
                })
            } else {
                Ok(T::default())
            }
        }
    }

    #[async_trait]
    impl LedgerRpc for ScriptedRpc {
        fn url(&self) -> &str {
            &self.url
        }
        async fn check_health(&self) -> Result<(), GatewayError> {
            self.result()
        }
        async fn get_account(&self, _: &Pubkey) -> Result<Option<Account>, GatewayError> {
            self.result()
        }
        async fn get_balance(&self, _: &Pubkey) -> Result<u64, GatewayError> {
            self.result()
        }
        async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
            self.result()
        }
        async fn fee_for_message(&self, _: &Message) -> Result<u64, GatewayError> {
            self.result()
        }
        async fn simulate_transaction(
            &self,
            _: &Transaction,
        ) -> Result<SimulatedExecution, GatewayError> {
            self.result()
        }
    }

    fn gateway_of(rpcs: Vec<Arc<ScriptedRpc>>) -> RpcGateway {
        let clients = rpcs
            .into_iter()
            .enumerate()
            .map(|(i, rpc)| (rpc as Arc<dyn LedgerRpc>, i as u32))
            .collect();
        RpcGateway::new(clients, RpcGatewayConfig::default())
    }

    #[tokio::test]
    async fn fails_over_to_next_endpoint() {
        let bad = ScriptedRpc::new("http://bad", true);
        let good = ScriptedRpc::new("http://good", false);
        let gateway = gateway_of(vec![bad.clone(), good.clone()]);

        let balance = gateway
            .with_best_endpoint(|rpc| async move { rpc.get_balance(&Pubkey::new_unique()).await })
            .await
            .expect("second endpoint should serve the call");
        assert_eq!(balance, 0);
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_names_every_attempted_endpoint() {
        let a = ScriptedRpc::new("http://a", true);
        let b = ScriptedRpc::new("http://b", true);
        let gateway = gateway_of(vec![a, b]);

        let err = gateway
            .with_best_endpoint(|rpc| async move { rpc.latest_blockhash().await })
            .await
            .expect_err("all endpoints fail");
        match err {
            GatewayError::AllEndpointsFailed { attempted, .. } => {
                assert_eq!(attempted, vec!["http://a", "http://b"]);
            }
            other => panic!("expected AllEndpointsFailed, got {other:?}"),
        }

        // No endpoint is left in a limbo state: each is either healthy (below
        // the threshold) or unhealthy, and all remain usable as last resort.
        for snap in gateway.snapshots().await {
            assert!(snap.consecutive_failures >= 1);
        }
    }

    #[tokio::test]
    async fn demotes_after_threshold_and_promotes_on_probe() {
        let flaky = ScriptedRpc::new("http://flaky", true);
        let gateway = Arc::new(gateway_of(vec![flaky.clone()]));

        for _ in 0..3 {
            let _ = gateway
                .with_best_endpoint(
                    |rpc| async move { rpc.get_balance(&Pubkey::new_unique()).await },
                )
                .await;
        }
        let snap = &gateway.snapshots().await[0];
        assert!(!snap.healthy, "three consecutive failures demote");

        // Endpoint recovers; the probe promotes it without any traffic.
        flaky.failing.store(false, Ordering::SeqCst);
        gateway.probe_all().await;
        let snap = &gateway.snapshots().await[0];
        assert!(snap.healthy);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let rpc = ScriptedRpc::new("http://one", true);
        let gateway = gateway_of(vec![rpc.clone()]);

        let _ = gateway
            .with_best_endpoint(|rpc| async move { rpc.get_balance(&Pubkey::new_unique()).await })
            .await;
        assert_eq!(gateway.snapshots().await[0].consecutive_failures, 1);

        rpc.failing.store(false, Ordering::SeqCst);
        gateway
            .with_best_endpoint(|rpc| async move { rpc.get_balance(&Pubkey::new_unique()).await })
            .await
            .expect("recovered");
        assert_eq!(gateway.snapshots().await[0].consecutive_failures, 0);
    }

    #[tokio::test]
    async fn secondary_requires_a_distinct_endpoint() {
        let only = ScriptedRpc::new("http://only", false);
        let gateway = gateway_of(vec![only]);

        let err = gateway
            .with_secondary_endpoint("http://only", |rpc| async move {
                rpc.latest_blockhash().await
            })
            .await
            .expect_err("single endpoint cannot serve as its own secondary");
        assert!(matches!(err, GatewayError::NoSecondaryEndpoint { .. }));
    }

    #[tokio::test]
    async fn secondary_skips_the_primary() {
        let a = ScriptedRpc::new("http://a", false);
        let b = ScriptedRpc::new("http://b", false);
        let gateway = gateway_of(vec![a.clone(), b.clone()]);

        gateway
            .with_secondary_endpoint("http://a", |rpc| async move {
                rpc.latest_blockhash().await
            })
            .await
            .expect("secondary serves");
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }
}
