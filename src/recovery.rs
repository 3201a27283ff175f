//! Recovery supervisor: periodic health-driven repair.
//!
//! The supervisor never talks to the injector. Every tick it reads each
//! node's status and reacts: restart stopped nodes after a grace period
//! (bounded by a retry budget), resume suspended nodes, and clear injected
//! latency on running nodes. A stopped node's restart is only *counted* as
//! recovered on the tick that observes it running again, so the success
//! counter tracks observed health, not attempted repairs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cluster::Cluster;
use crate::events::{Event, EventBus};
use crate::node::{Node, NodeStatus};

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Tick period of the health-check loop.
    pub health_check_interval: Duration,
    /// Grace period between first sighting of a failure and intervention.
    pub recovery_delay: Duration,
    /// Restart attempts per failure; `0` means unlimited.
    pub max_retries: u32,
    /// Restart stopped nodes.
    pub auto_restart: bool,
    /// Resume suspended nodes.
    pub auto_resume: bool,
    /// Clear injected latency on running nodes.
    pub clear_delay: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(1),
            recovery_delay: Duration::from_secs(2),
            max_retries: 3,
            auto_restart: true,
            auto_resume: true,
            clear_delay: true,
        }
    }
}

/// Recovery statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RecoveryStats {
    /// Recovery attempts started.
    pub total_recoveries: u64,
    /// Recoveries confirmed successful.
    pub success_recoveries: u64,
    /// Recovery attempts that failed.
    pub failed_recoveries: u64,
    /// Nodes currently tracked as failed.
    pub currently_failed: u64,
}

/// Per-node health tracking.
#[derive(Debug, Clone)]
struct NodeTracking {
    last_seen: Instant,
    failed_at: Option<Instant>,
    retry_count: u32,
    is_recovered: bool,
}

struct SupervisorState {
    tracking: HashMap<String, NodeTracking>,
    stats: RecoveryStats,
}

enum StoppedAction {
    FirstSighting(Duration),
    Wait,
    Restart(u32),
}

/// The periodic health-checker and repairer.
pub struct Supervisor {
    config: RecoveryConfig,
    cluster: Arc<Cluster>,
    bus: Mutex<Option<Arc<EventBus>>>,
    running: AtomicBool,
    state: Mutex<SupervisorState>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Create a supervisor over `cluster`.
    pub fn new(cluster: Arc<Cluster>, config: RecoveryConfig) -> Self {
        Self {
            config,
            cluster,
            bus: Mutex::new(None),
            running: AtomicBool::new(false),
            state: Mutex::new(SupervisorState {
                tracking: HashMap::new(),
                stats: RecoveryStats::default(),
            }),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Wire an event bus; recovery attempts publish to it.
    pub fn set_event_bus(&self, bus: Arc<EventBus>) {
        *self.bus.lock() = Some(bus);
    }

    /// Launch the health-check loop. A second start is a no-op.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let token = parent.child_token();
        let this = Arc::clone(self);
        let loop_token = token.clone();
        *self.handle.lock() = Some(tokio::spawn(async move {
            this.health_check_loop(loop_token).await;
        }));
        *self.cancel.lock() = Some(token);

        info!(
            interval = ?self.config.health_check_interval,
            delay = ?self.config.recovery_delay,
            "recovery supervisor started"
        );
    }

    /// Stop the loop and wait for it to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let stats = self.stats();
        info!(
            success = stats.success_recoveries,
            failed = stats.failed_recoveries,
            "recovery supervisor stopped"
        );
    }

    /// Whether the loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the recovery statistics.
    pub fn stats(&self) -> RecoveryStats {
        self.state.lock().stats
    }

    /// Zero the statistics; tracking records are kept.
    pub fn reset_stats(&self) {
        self.state.lock().stats = RecoveryStats::default();
    }

    async fn health_check_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.check_and_recover(),
            }
        }
    }

    /// One tick: inspect every node and repair as configured.
    fn check_and_recover(&self) {
        let now = Instant::now();
        for node in self.cluster.nodes() {
            match node.status() {
                NodeStatus::Running => self.handle_running(&node, now),
                NodeStatus::Stopped => self.handle_stopped(&node, now),
                NodeStatus::Suspended => self.handle_suspended(&node, now),
            }
        }
    }

    fn handle_running(&self, node: &Arc<Node>, now: Instant) {
        if self.config.clear_delay && !node.delay().is_zero() {
            node.set_delay(Duration::ZERO);
            info!(node = %node.id(), "cleared injected delay");
        }

        let recovered = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let tracking = Self::tracking_entry(&mut state.tracking, node.id(), now);

            // A node observed running after restart attempts has recovered.
            let recovered = !tracking.is_recovered && tracking.retry_count > 0;
            if recovered {
                state.stats.success_recoveries += 1;
            }
            tracking.last_seen = now;
            tracking.retry_count = 0;
            tracking.failed_at = None;
            tracking.is_recovered = false;
            recovered
        };

        if recovered {
            info!(node = %node.id(), "node recovered");
            self.publish(Event::recovery_success(node.id()));
        }
    }

    fn handle_stopped(&self, node: &Arc<Node>, now: Instant) {
        if !self.config.auto_restart {
            return;
        }

        let action = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let tracking = Self::tracking_entry(&mut state.tracking, node.id(), now);

            match tracking.failed_at {
                None => {
                    let healthy_for = now.duration_since(tracking.last_seen);
                    tracking.failed_at = Some(now);
                    state.stats.currently_failed += 1;
                    StoppedAction::FirstSighting(healthy_for)
                }
                Some(failed_at) => {
                    if now.duration_since(failed_at) < self.config.recovery_delay {
                        StoppedAction::Wait
                    } else if self.config.max_retries > 0
                        && tracking.retry_count >= self.config.max_retries
                    {
                        StoppedAction::Wait
                    } else {
                        tracking.retry_count += 1;
                        tracking.failed_at = Some(now);
                        state.stats.total_recoveries += 1;
                        StoppedAction::Restart(tracking.retry_count)
                    }
                }
            }
        };

        match action {
            StoppedAction::FirstSighting(healthy_for) => {
                warn!(node = %node.id(), ?healthy_for, "detected stopped node");
            }
            StoppedAction::Wait => {}
            StoppedAction::Restart(attempt) => {
                self.publish(Event::recovery_start(node.id(), attempt));
                match node.start() {
                    Ok(()) => {
                        let mut state = self.state.lock();
                        state.stats.currently_failed -= 1;
                        if let Some(tracking) = state.tracking.get_mut(node.id()) {
                            tracking.failed_at = None;
                        }
                        drop(state);
                        info!(node = %node.id(), attempt, "restarted node");
                    }
                    Err(e) => {
                        self.state.lock().stats.failed_recoveries += 1;
                        error!(node = %node.id(), error = %e, "failed to restart node");
                        self.publish(Event::recovery_failed(node.id(), &e));
                    }
                }
            }
        }
    }

    fn handle_suspended(&self, node: &Arc<Node>, now: Instant) {
        if !self.config.auto_resume {
            return;
        }

        let attempt = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let tracking = Self::tracking_entry(&mut state.tracking, node.id(), now);

            match tracking.failed_at {
                None => {
                    tracking.failed_at = Some(now);
                    warn!(node = %node.id(), "detected suspended node");
                    None
                }
                Some(failed_at) => {
                    if now.duration_since(failed_at) < self.config.recovery_delay {
                        None
                    } else {
                        tracking.retry_count += 1;
                        tracking.failed_at = None;
                        state.stats.total_recoveries += 1;
                        Some(tracking.retry_count)
                    }
                }
            }
        };

        let Some(attempt) = attempt else { return };

        self.publish(Event::recovery_start(node.id(), attempt));
        match node.resume() {
            Ok(()) => {
                self.state.lock().stats.success_recoveries += 1;
                info!(node = %node.id(), "resumed node");
                self.publish(Event::recovery_success(node.id()));
            }
            Err(e) => {
                self.state.lock().stats.failed_recoveries += 1;
                error!(node = %node.id(), error = %e, "failed to resume node");
                self.publish(Event::recovery_failed(node.id(), &e));
            }
        }
    }

    fn tracking_entry<'a>(
        tracking: &'a mut HashMap<String, NodeTracking>,
        id: &str,
        now: Instant,
    ) -> &'a mut NodeTracking {
        tracking
            .entry(id.to_string())
            .or_insert_with(|| NodeTracking {
                last_seen: now,
                failed_at: None,
                retry_count: 0,
                is_recovered: false,
            })
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = self.bus.lock().as_ref() {
            bus.publish(event);
        }
    }
}
