//! Per-endpoint health state machine
//!
//! `Healthy --(N consecutive failures)--> Unhealthy --(probe success)--> Healthy`
//!
//! Failure counting is shared between real traffic and the background probe:
//! either path can demote, either can promote. State is atomics plus a single
//! RwLock so independent `run()` calls can consult the table concurrently.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::client::LedgerRpc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Healthy,
    Unhealthy,
}

/// One configured RPC endpoint with its health accounting.
pub struct EndpointState {
    rpc: Arc<dyn LedgerRpc>,
    priority: u32,
    health: RwLock<EndpointHealth>,
    consecutive_failures: AtomicU32,
    total_calls: AtomicU64,
    failed_calls: AtomicU64,
}

impl EndpointState {
    pub fn new(rpc: Arc<dyn LedgerRpc>, priority: u32) -> Self {
        Self {
            rpc,
            priority,
            health: RwLock::new(EndpointHealth::Healthy),
            consecutive_failures: AtomicU32::new(0),
            total_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
        }
    }

    pub fn rpc(&self) -> Arc<dyn LedgerRpc> {
        self.rpc.clone()
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub async fn is_healthy(&self) -> bool {
        *self.health.read().await == EndpointHealth::Healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// A successful call resets the failure streak and re-promotes.
    pub async fn record_success(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut health = self.health.write().await;
        if *health == EndpointHealth::Unhealthy {
            info!(url = %self.url(), "endpoint recovered, promoting to healthy");
        }
        *health = EndpointHealth::Healthy;
    }

    /// Records one failed call; demotes once the streak reaches `threshold`.
    pub async fn record_failure(&self, threshold: u32) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= threshold {
            let mut health = self.health.write().await;
            if *health == EndpointHealth::Healthy {
                warn!(
                    url = %self.url(),
                    consecutive_failures = failures,
                    threshold,
                    "endpoint demoted to unhealthy"
                );
            }
            *health = EndpointHealth::Unhealthy;
        } else {
            debug!(
                url = %self.url(),
                consecutive_failures = failures,
                "endpoint call failed"
            );
        }
    }

    /// Point-in-time snapshot for reports and logs.
    pub async fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            url: self.url().to_string(),
            priority: self.priority,
            healthy: self.is_healthy().await,
            consecutive_failures: self.consecutive_failures(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    pub url: String,
    pub priority: u32,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub failed_calls: u64,
}
