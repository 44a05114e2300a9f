//! Lease-based leader elector
//!
//! Each process instance runs one election loop per role. Followers attempt
//! a conditional takeover every heartbeat; the leader renews on the same
//! cadence and demotes itself the instant a renewal fails, never waiting
//! for the old lease to run out. `is_leader` reflects only this instance's
//! last known state and never blocks on the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::model::LeaseRequest;
use crate::registry::LeaseRegistry;

/// Election cadence configuration
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Lease TTL in milliseconds (default: 15000ms). Bounds failover time:
    /// a crashed leader is replaced within ttl plus one heartbeat.
    pub lease_ttl_ms: u64,
    /// Renewal cadence in milliseconds, strictly less than the TTL
    /// (default: 5000ms, one third of the lease)
    pub heartbeat_interval_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: 15_000,
            heartbeat_interval_ms: 5_000,
        }
    }
}

impl ElectionConfig {
    /// Config with the conventional heartbeat of one third of the TTL.
    pub fn with_lease_ttl_ms(lease_ttl_ms: u64) -> Self {
        Self {
            lease_ttl_ms,
            heartbeat_interval_ms: (lease_ttl_ms / 3).max(1),
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

enum Command {
    Halt,
    StepDown,
}

/// One instance's claim on a named singleton role
pub struct LeaderElector {
    role_id: String,
    owner_id: String,
    registry: Arc<dyn LeaseRegistry>,
    is_leader: Arc<AtomicBool>,
    command_tx: mpsc::Sender<Command>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl LeaderElector {
    /// Start the election loop for `role_id`, identifying as `owner_id`.
    ///
    /// The first takeover attempt happens immediately, then the loop ticks
    /// at the heartbeat interval. One loop per elector keeps renewal
    /// attempts single-flight for the role on this instance.
    pub fn start(
        registry: Arc<dyn LeaseRegistry>,
        role_id: impl Into<String>,
        owner_id: impl Into<String>,
        config: ElectionConfig,
    ) -> Self {
        let role_id = role_id.into();
        let owner_id = owner_id.into();
        let is_leader = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = mpsc::channel(1);

        let request = LeaseRequest {
            role_id: role_id.clone(),
            owner_id: owner_id.clone(),
            ttl_ms: config.lease_ttl_ms,
            heartbeat_interval_ms: config.heartbeat_interval_ms,
        };
        let handle = tokio::spawn(election_loop(
            registry.clone(),
            request,
            config.heartbeat_interval(),
            is_leader.clone(),
            command_rx,
        ));

        info!(role = %role_id, owner = %owner_id, "leader elector started");
        Self {
            role_id,
            owner_id,
            registry,
            is_leader,
            command_tx,
            handle: Some(handle),
        }
    }

    /// Whether this instance currently believes it is the leader.
    /// Local state only; never re-queries the registry.
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Best-effort read of the current role owner; may be momentarily stale.
    pub async fn current_leader_id(&self) -> Option<String> {
        match self.registry.get(&self.role_id).await {
            Ok(record) => record.map(|r| r.owner_id),
            Err(err) => {
                debug!(role = %self.role_id, error = %err, "leader lookup failed");
                None
            }
        }
    }

    /// Stop competing and free the role immediately if held, rather than
    /// letting the lease run out. Used for planned restarts.
    pub async fn step_down(&self) {
        let _ = self.command_tx.send(Command::StepDown).await;
    }

    /// Stop the election loop without touching the registry. The lease, if
    /// held, runs out on its own; used to simulate a crashed leader.
    pub fn halt(&self) {
        self.is_leader.store(false, Ordering::SeqCst);
        let _ = self.command_tx.try_send(Command::Halt);
    }

    /// Graceful shutdown: step down and wait for the loop to finish.
    pub async fn shutdown(mut self) {
        let _ = self.command_tx.send(Command::StepDown).await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

async fn election_loop(
    registry: Arc<dyn LeaseRegistry>,
    request: LeaseRequest,
    heartbeat: Duration,
    is_leader: Arc<AtomicBool>,
    mut command_rx: mpsc::Receiver<Command>,
) {
    let mut ticker = interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            command = command_rx.recv() => {
                let was_leader = is_leader.swap(false, Ordering::SeqCst);
                if matches!(command, Some(Command::StepDown)) && was_leader {
                    match registry.release(&request.role_id, &request.owner_id).await {
                        Ok(true) => {
                            info!(role = %request.role_id, "stepped down, lease freed");
                        }
                        Ok(false) => {
                            debug!(role = %request.role_id, "step down found no owned lease");
                        }
                        Err(err) => {
                            warn!(role = %request.role_id, error = %err, "step down release failed; lease will expire on its own");
                        }
                    }
                }
                break;
            }

            _ = ticker.tick() => {
                if is_leader.load(Ordering::SeqCst) {
                    renew(&*registry, &request, &is_leader).await;
                } else {
                    attempt_takeover(&*registry, &request, &is_leader).await;
                }
            }
        }
    }
}

async fn renew(registry: &dyn LeaseRegistry, request: &LeaseRequest, is_leader: &AtomicBool) {
    match registry.renew(request).await {
        Ok(true) => {
            counter!("lease_renew_total").increment(1);
            debug!(role = %request.role_id, "lease renewed");
        }
        Ok(false) => {
            // Leadership is lost the instant renewal fails, not when the
            // old lease would have expired
            is_leader.store(false, Ordering::SeqCst);
            counter!("leader_transitions_total", "to" => "follower").increment(1);
            warn!(role = %request.role_id, owner = %request.owner_id, "lease lost, demoting");
        }
        Err(err) => {
            is_leader.store(false, Ordering::SeqCst);
            counter!("leader_transitions_total", "to" => "follower").increment(1);
            warn!(role = %request.role_id, error = %err, "lease renewal failed, demoting");
        }
    }
}

async fn attempt_takeover(
    registry: &dyn LeaseRegistry,
    request: &LeaseRequest,
    is_leader: &AtomicBool,
) {
    match registry.try_acquire(request).await {
        Ok(true) => {
            is_leader.store(true, Ordering::SeqCst);
            counter!("leader_transitions_total", "to" => "leader").increment(1);
            info!(role = %request.role_id, owner = %request.owner_id, "became leader");
        }
        Ok(false) => {}
        Err(err) => {
            debug!(role = %request.role_id, error = %err, "takeover attempt failed");
        }
    }
}
