//! Chaos injector: the periodic attacker.
//!
//! On every tick the injector snapshots the running nodes, shuffles them,
//! takes a handful of targets, picks one attack type at random, and applies
//! it. Suspend attacks are tracked so a second loop can auto-resume them
//! after `suspend_time`, and so [`Injector::stop`] can resume whatever is
//! still suspended on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::Cluster;
use crate::events::{AttackType, Event, EventBus};
use crate::node::{Node, NodeStatus};

const RESUME_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Injector configuration.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Tick period of the attack loop.
    pub interval: Duration,
    /// Nodes attacked per tick (capped at the running population).
    pub target_count: usize,
    /// Attack types to draw from; must be non-empty.
    pub attack_types: Vec<AttackType>,
    /// Latency injected by delay attacks.
    pub delay_duration: Duration,
    /// Auto-resume suspended nodes after this long; zero disables the
    /// auto-resume loop.
    pub suspend_time: Duration,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            target_count: 1,
            attack_types: vec![AttackType::Kill, AttackType::Suspend, AttackType::Delay],
            delay_duration: Duration::from_millis(100),
            suspend_time: Duration::from_secs(3),
        }
    }
}

/// Attack statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ChaosStats {
    /// Successful attacks across all types.
    pub total_attacks: u64,
    /// Successful attacks per type, keyed by the wire string.
    #[serde(rename = "attacks_by_type")]
    pub by_type: HashMap<String, u64>,
}

struct InjectorState {
    by_type: HashMap<AttackType, u64>,
    suspended: HashMap<String, Instant>,
}

/// The periodic attacker.
pub struct Injector {
    config: ChaosConfig,
    cluster: Arc<Cluster>,
    bus: Mutex<Option<Arc<EventBus>>>,
    running: AtomicBool,
    total_attacks: AtomicU64,
    state: Mutex<InjectorState>,
    cancel: Mutex<Option<CancellationToken>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Injector {
    /// Create an injector over `cluster`.
    pub fn new(cluster: Arc<Cluster>, config: ChaosConfig) -> Self {
        Self {
            config,
            cluster,
            bus: Mutex::new(None),
            running: AtomicBool::new(false),
            total_attacks: AtomicU64::new(0),
            state: Mutex::new(InjectorState {
                by_type: HashMap::new(),
                suspended: HashMap::new(),
            }),
            cancel: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Wire an event bus; attacks and auto-resumes publish to it.
    pub fn set_event_bus(&self, bus: Arc<EventBus>) {
        *self.bus.lock() = Some(bus);
    }

    /// Launch the attack loop (and the auto-resume loop when
    /// `suspend_time > 0`). A second start is a no-op.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let token = parent.child_token();
        let mut handles = Vec::new();

        {
            let this = Arc::clone(self);
            let token = token.clone();
            handles.push(tokio::spawn(async move { this.attack_loop(token).await }));
        }

        if !self.config.suspend_time.is_zero() {
            let this = Arc::clone(self);
            let token = token.clone();
            handles.push(tokio::spawn(async move { this.resume_loop(token).await }));
        }

        *self.cancel.lock() = Some(token);
        *self.handles.lock() = handles;

        info!(
            interval = ?self.config.interval,
            targets = self.config.target_count,
            "chaos injector started"
        );
    }

    /// Stop the loops and resume every node still tracked as suspended.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }

        self.resume_all();

        info!(
            total_attacks = self.total_attacks.load(Ordering::Relaxed),
            "chaos injector stopped"
        );
    }

    /// Whether the loops are active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Successful attacks so far.
    pub fn attack_count(&self) -> u64 {
        self.total_attacks.load(Ordering::Relaxed)
    }

    /// Snapshot of the attack statistics.
    pub fn stats(&self) -> ChaosStats {
        let state = self.state.lock();
        ChaosStats {
            total_attacks: self.total_attacks.load(Ordering::Relaxed),
            by_type: state
                .by_type
                .iter()
                .map(|(attack, count)| (attack.to_string(), *count))
                .collect(),
        }
    }

    async fn attack_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so attacks start
        // one full interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.attack(),
            }
        }
    }

    async fn resume_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(RESUME_CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.check_and_resume(),
            }
        }
    }

    /// One tick: pick targets and apply one attack type to each of them.
    fn attack(&self) {
        let mut running: Vec<Arc<Node>> = self
            .cluster
            .nodes()
            .into_iter()
            .filter(|n| n.status() == NodeStatus::Running)
            .collect();
        if running.is_empty() {
            return;
        }

        let attack_type = {
            let mut rng = rand::thread_rng();
            running.shuffle(&mut rng);
            *self
                .config
                .attack_types
                .choose(&mut rng)
                .unwrap_or(&AttackType::Kill)
        };
        running.truncate(self.config.target_count.min(running.len()));

        for node in &running {
            self.execute_attack(node, attack_type);
        }
    }

    fn execute_attack(&self, node: &Arc<Node>, attack_type: AttackType) {
        match attack_type {
            AttackType::Kill => self.attack_kill(node),
            AttackType::Suspend => self.attack_suspend(node),
            AttackType::Delay => self.attack_delay(node),
        }
    }

    fn attack_kill(&self, node: &Arc<Node>) {
        if let Err(e) = node.stop() {
            warn!(node = %node.id(), error = %e, "kill attack failed");
            return;
        }
        warn!(node = %node.id(), "killed node");

        self.record_attack(AttackType::Kill);
        self.publish(Event::chaos_attack(node.id(), AttackType::Kill));
    }

    fn attack_suspend(&self, node: &Arc<Node>) {
        if let Err(e) = node.suspend() {
            warn!(node = %node.id(), error = %e, "suspend attack failed");
            return;
        }
        warn!(node = %node.id(), "suspended node");

        {
            let mut state = self.state.lock();
            state.suspended.insert(node.id().to_string(), Instant::now());
            *state.by_type.entry(AttackType::Suspend).or_insert(0) += 1;
        }
        self.total_attacks.fetch_add(1, Ordering::Relaxed);
        self.publish(Event::chaos_attack(node.id(), AttackType::Suspend));
    }

    fn attack_delay(&self, node: &Arc<Node>) {
        node.set_delay(self.config.delay_duration);
        warn!(
            node = %node.id(),
            delay = ?self.config.delay_duration,
            "injected delay"
        );

        self.record_attack(AttackType::Delay);
        self.publish(Event::chaos_delay(node.id(), self.config.delay_duration));
    }

    fn record_attack(&self, attack_type: AttackType) {
        self.total_attacks.fetch_add(1, Ordering::Relaxed);
        *self.state.lock().by_type.entry(attack_type).or_insert(0) += 1;
    }

    /// Resume tracked nodes whose suspension has lasted `suspend_time`.
    fn check_and_resume(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let mut state = self.state.lock();
            let expired: Vec<String> = state
                .suspended
                .iter()
                .filter(|(_, suspended_at)| {
                    now.duration_since(**suspended_at) >= self.config.suspend_time
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                state.suspended.remove(id);
            }
            expired
        };

        for id in expired {
            if let Some(node) = self.cluster.get_node(&id) {
                if node.resume().is_ok() {
                    info!(node = %id, "auto-resumed node");
                    self.publish(Event::chaos_resume(&id));
                }
            }
        }
    }

    /// Resume everything still tracked, regardless of elapsed time.
    fn resume_all(&self) {
        let suspended: Vec<String> = {
            let mut state = self.state.lock();
            state.suspended.drain().map(|(id, _)| id).collect()
        };

        for id in suspended {
            if let Some(node) = self.cluster.get_node(&id) {
                if node.resume().is_ok() {
                    info!(node = %id, "resumed node on shutdown");
                }
            }
        }
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = self.bus.lock().as_ref() {
            bus.publish(event);
        }
    }
}
