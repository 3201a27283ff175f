//! Scenario engine: composes the whole simulator for one timed run.
//!
//! A run builds a cluster, starts the nodes, launches the load generator,
//! then the injector and the supervisor, waits out the configured duration
//! (or an external cancellation), collects a [`ScenarioResult`], and tears
//! everything down in reverse order. Early cancellation is not an error;
//! the run just reports a shorter duration.

pub mod presets;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chaos::{ChaosConfig, Injector};
use crate::client::{ClientConfig, LoadGenerator};
use crate::cluster::Cluster;
use crate::error::{ChaosKvsError, Result};
use crate::events::{AttackType, EventBus};
use crate::recovery::{RecoveryConfig, Supervisor};

/// Full configuration for one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Scenario name, echoed into the result.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Wall-clock length of the run.
    pub duration: Duration,
    /// Nodes to create (named `node-1 …`).
    pub node_count: usize,
    /// Load generator worker count; `0` means CPU count.
    pub client_workers: usize,
    /// Fraction of requests that are writes.
    pub write_ratio: f64,
    /// Run the chaos injector.
    pub enable_chaos: bool,
    /// Injector tick period.
    pub chaos_interval: Duration,
    /// Targets per injector tick.
    pub chaos_targets: usize,
    /// Attack types the injector draws from.
    pub attack_types: Vec<AttackType>,
    /// Run the recovery supervisor.
    pub enable_recovery: bool,
    /// Supervisor grace period before intervening.
    pub recovery_delay: Duration,
    /// Supervisor retry budget; `0` means unlimited.
    pub max_retries: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "Default scenario".to_string(),
            duration: Duration::from_secs(10),
            node_count: 5,
            client_workers: 10,
            write_ratio: 0.5,
            enable_chaos: true,
            chaos_interval: Duration::from_secs(2),
            chaos_targets: 1,
            attack_types: vec![AttackType::Kill, AttackType::Suspend, AttackType::Delay],
            enable_recovery: true,
            recovery_delay: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Name of the scenario that ran.
    pub scenario_name: String,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run finished.
    pub end_time: DateTime<Utc>,
    /// Actual wall-clock duration.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Total requests generated.
    pub total_requests: u64,
    /// Requests that succeeded.
    pub success_requests: u64,
    /// Requests that failed.
    pub failed_requests: u64,
    /// Failed / total.
    pub error_rate: f64,
    /// Mean request latency.
    #[serde(with = "humantime_serde")]
    pub avg_latency: Duration,
    /// P99 request latency.
    #[serde(with = "humantime_serde")]
    pub p99_latency: Duration,
    /// Attacks executed by the injector.
    pub total_attacks: u64,
    /// Recovery attempts started by the supervisor.
    pub total_recoveries: u64,
    /// Recoveries that succeeded.
    pub success_recoveries: u64,
    /// Recoveries that failed.
    pub failed_recoveries: u64,
    /// Status of every node at collection time, keyed by node id.
    pub final_node_status: BTreeMap<String, String>,
}

impl ScenarioResult {
    /// Render the result as a human-readable report.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let line = "=".repeat(80);

        let _ = writeln!(out, "{line}");
        let _ = writeln!(out, "{:^80}", format!("SCENARIO REPORT: {}", self.scenario_name));
        let _ = writeln!(out, "{line}");
        let _ = writeln!(out);
        let _ = writeln!(out, "EXECUTION SUMMARY");
        let _ = writeln!(out, "-----------------");
        let _ = writeln!(out, "  Start Time:     {}", self.start_time.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "  End Time:       {}", self.end_time.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "  Duration:       {:.2?}", self.duration);
        let _ = writeln!(out);
        let _ = writeln!(out, "TRAFFIC METRICS");
        let _ = writeln!(out, "---------------");
        let _ = writeln!(out, "  Total Requests:   {}", self.total_requests);
        let _ = writeln!(out, "  Success:          {}", self.success_requests);
        let _ = writeln!(out, "  Failed:           {}", self.failed_requests);
        let _ = writeln!(out, "  Error Rate:       {:.2}%", self.error_rate * 100.0);
        let _ = writeln!(out, "  Avg Latency:      {:.2?}", self.avg_latency);
        let _ = writeln!(out, "  P99 Latency:      {:.2?}", self.p99_latency);
        let _ = writeln!(out);
        let _ = writeln!(out, "CHAOS STATISTICS");
        let _ = writeln!(out, "----------------");
        let _ = writeln!(out, "  Total Attacks:    {}", self.total_attacks);
        let _ = writeln!(out);
        let _ = writeln!(out, "RECOVERY STATISTICS");
        let _ = writeln!(out, "-------------------");
        let _ = writeln!(out, "  Total Recoveries:   {}", self.total_recoveries);
        let _ = writeln!(out, "  Successful:         {}", self.success_recoveries);
        let _ = writeln!(out, "  Failed:             {}", self.failed_recoveries);
        let _ = writeln!(out);
        let _ = writeln!(out, "FINAL NODE STATUS");
        let _ = writeln!(out, "-----------------");
        for (node_id, status) in &self.final_node_status {
            let _ = writeln!(out, "  {:<20} {}", format!("{node_id}:"), status);
        }
        let _ = writeln!(out);
        let _ = write!(out, "{line}");
        out
    }
}

/// Composes cluster, load generator, injector, and supervisor for one run.
pub struct Engine {
    config: ScenarioConfig,
    bus: Mutex<Option<Arc<EventBus>>>,
    running: AtomicBool,
}

impl Engine {
    /// Create an engine for `config`.
    pub fn new(config: ScenarioConfig) -> Self {
        Self {
            config,
            bus: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Wire an event bus; the injector and supervisor publish to it.
    pub fn set_event_bus(&self, bus: Arc<EventBus>) {
        *self.bus.lock() = Some(bus);
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Execute the scenario.
    ///
    /// Cancelling `parent` ends the run early; the partial result is still
    /// returned without error. Only a second concurrent `run` or a setup
    /// failure produces an `Err`.
    pub async fn run(&self, parent: &CancellationToken) -> Result<ScenarioResult> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ChaosKvsError::ScenarioRunning);
        }

        let outcome = self.run_inner(parent).await;
        self.running.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_inner(&self, parent: &CancellationToken) -> Result<ScenarioResult> {
        info!(name = %self.config.name, "scenario started");
        info!(description = %self.config.description, "scenario description");

        let start_time = Utc::now();
        let started = std::time::Instant::now();

        // Cluster.
        let cluster = Arc::new(Cluster::new());
        cluster.create_nodes(self.config.node_count, "node")?;
        cluster.start_all().await?;

        // Load generator.
        let client = Arc::new(LoadGenerator::new(
            Arc::clone(&cluster),
            ClientConfig {
                num_workers: self.config.client_workers,
                write_ratio: self.config.write_ratio,
                ..ClientConfig::default()
            },
        ));

        // Chaos injector.
        let injector = self.config.enable_chaos.then(|| {
            let injector = Arc::new(Injector::new(
                Arc::clone(&cluster),
                ChaosConfig {
                    interval: self.config.chaos_interval,
                    target_count: self.config.chaos_targets,
                    attack_types: self.config.attack_types.clone(),
                    ..ChaosConfig::default()
                },
            ));
            if let Some(bus) = self.bus.lock().as_ref() {
                injector.set_event_bus(Arc::clone(bus));
            }
            injector
        });

        // Recovery supervisor.
        let supervisor = self.config.enable_recovery.then(|| {
            let supervisor = Arc::new(Supervisor::new(
                Arc::clone(&cluster),
                RecoveryConfig {
                    recovery_delay: self.config.recovery_delay,
                    max_retries: self.config.max_retries,
                    ..RecoveryConfig::default()
                },
            ));
            if let Some(bus) = self.bus.lock().as_ref() {
                supervisor.set_event_bus(Arc::clone(bus));
            }
            supervisor
        });

        // Run.
        let token = parent.child_token();
        client.start(&token);
        if let Some(injector) = &injector {
            injector.start(&token);
        }
        if let Some(supervisor) = &supervisor {
            supervisor.start(&token);
        }

        tokio::select! {
            _ = parent.cancelled() => info!("scenario cancelled, stopping early"),
            _ = tokio::time::sleep(self.config.duration) => {
                info!("scenario duration completed, stopping components");
            }
        }

        // Collect before teardown so the result reflects the live fleet.
        let end_time = Utc::now();
        let snapshot = client.metrics().snapshot();
        let chaos_stats = injector.as_ref().map(|i| i.stats());
        let recovery_stats = supervisor.as_ref().map(|s| s.stats());
        let final_node_status: BTreeMap<String, String> = cluster
            .nodes()
            .iter()
            .map(|n| (n.id().to_string(), n.status().to_string()))
            .collect();

        // Teardown in reverse order of ownership.
        token.cancel();
        client.stop().await;
        if let Some(injector) = &injector {
            injector.stop().await;
        }
        if let Some(supervisor) = &supervisor {
            supervisor.stop().await;
        }
        cluster.stop_all().await;

        info!(name = %self.config.name, "scenario completed");

        Ok(ScenarioResult {
            scenario_name: self.config.name.clone(),
            start_time,
            end_time,
            duration: started.elapsed(),
            total_requests: snapshot.total_requests,
            success_requests: snapshot.success_requests,
            failed_requests: snapshot.failed_requests,
            error_rate: snapshot.error_rate,
            avg_latency: snapshot.average_latency,
            p99_latency: snapshot.p99_latency,
            total_attacks: chaos_stats.map_or(0, |s| s.total_attacks),
            total_recoveries: recovery_stats.map_or(0, |s| s.total_recoveries),
            success_recoveries: recovery_stats.map_or(0, |s| s.success_recoveries),
            failed_recoveries: recovery_stats.map_or(0, |s| s.failed_recoveries),
            final_node_status,
        })
    }
}
