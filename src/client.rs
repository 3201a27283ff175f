//! Load generator: a traffic source over the worker pool.
//!
//! One producer task turns configuration into a stream of read/write jobs
//! against random nodes; the pool executes them and every outcome lands in
//! the shared [`Metrics`]. Failed operations (a killed or suspended node)
//! are recorded as failures, which is exactly the signal the chaos
//! scenarios measure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cluster::Cluster;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::node::Node;
use crate::worker::{Job, WorkerPool};

/// Load generator configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pool workers; `0` means the number of logical CPUs.
    pub num_workers: usize,
    /// Fraction of requests that are writes, in `[0.0, 1.0]`.
    pub write_ratio: f64,
    /// Keys are `key-0 … key-{key_range-1}`.
    pub key_range: usize,
    /// Bytes per written value.
    pub value_size: usize,
    /// Stop after this many requests; `0` means unlimited.
    pub requests_limit: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            write_ratio: 0.5,
            key_range: 10_000,
            value_size: 100,
            requests_limit: 0,
        }
    }
}

/// Worker-pool-backed traffic source.
pub struct LoadGenerator {
    config: ClientConfig,
    cluster: Arc<Cluster>,
    pool: Arc<WorkerPool>,
    metrics: Arc<Metrics>,
    requests_limit: AtomicU64,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl LoadGenerator {
    /// Create a generator over `cluster`.
    pub fn new(cluster: Arc<Cluster>, config: ClientConfig) -> Self {
        let pool = Arc::new(WorkerPool::new(config.num_workers));
        Self {
            requests_limit: AtomicU64::new(config.requests_limit),
            config,
            cluster,
            pool,
            metrics: Arc::new(Metrics::new()),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            producer: Mutex::new(None),
        }
    }

    /// Start the pool and the producer. A second start is a no-op.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let token = parent.child_token();
        self.pool.start(&token);

        let this = Arc::clone(self);
        let producer_token = token.clone();
        *self.producer.lock() = Some(tokio::spawn(async move {
            this.produce(producer_token).await;
        }));
        *self.cancel.lock() = Some(token);

        info!(
            workers = self.pool.num_workers(),
            write_ratio = self.config.write_ratio,
            "load generator started"
        );
    }

    /// Stop the producer and drain the pool.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        self.pool.stop().await;
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            let _ = producer.await;
        }

        info!(
            total = self.metrics.total_requests(),
            "load generator stopped"
        );
    }

    /// Generate load for `duration` (or until `parent` is cancelled) and
    /// return the final metrics snapshot.
    pub async fn run_for(
        self: &Arc<Self>,
        parent: &CancellationToken,
        duration: Duration,
    ) -> MetricsSnapshot {
        self.start(parent);

        tokio::select! {
            _ = parent.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }

        self.stop().await;
        self.metrics.snapshot()
    }

    /// Generate exactly `count` requests (or until `parent` is cancelled)
    /// and return the final metrics snapshot.
    pub async fn run_requests(
        self: &Arc<Self>,
        parent: &CancellationToken,
        count: u64,
    ) -> MetricsSnapshot {
        self.requests_limit.store(count, Ordering::SeqCst);
        self.start(parent);

        // The producer exits on its own once the limit is reached.
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            let _ = producer.await;
        }

        self.stop().await;
        self.metrics.snapshot()
    }

    /// The shared metrics aggregator.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Whether the generator is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn produce(&self, token: CancellationToken) {
        let nodes = self.cluster.nodes();
        if nodes.is_empty() {
            error!("no nodes available in cluster");
            return;
        }
        let key_range = self.config.key_range.max(1);

        loop {
            if token.is_cancelled() {
                return;
            }

            let limit = self.requests_limit.load(Ordering::SeqCst);
            if limit > 0 && self.metrics.total_requests() >= limit {
                return;
            }

            let (node, key, is_write) = {
                let mut rng = rand::thread_rng();
                let node = Arc::clone(&nodes[rng.gen_range(0..nodes.len())]);
                let key = format!("key-{}", rng.gen_range(0..key_range));
                let is_write = rng.gen::<f64>() < self.config.write_ratio;
                (node, key, is_write)
            };

            let job = self.make_job(node, key, is_write);
            if !self.pool.submit(job).await {
                return;
            }
        }
    }

    fn make_job(&self, node: Arc<Node>, key: String, is_write: bool) -> Job {
        let metrics = Arc::clone(&self.metrics);
        let value_size = self.config.value_size;

        Box::pin(async move {
            let start = Instant::now();

            let outcome = if is_write {
                let mut value = vec![0u8; value_size];
                rand::thread_rng().fill(&mut value[..]);
                node.set(key, Bytes::from(value)).await
            } else {
                // A missing key is still a successful read; only a
                // non-running node is a failure for metrics purposes.
                node.get(&key).await;
                Ok(())
            };

            let latency = start.elapsed();
            match outcome {
                Ok(()) => metrics.record_success(latency),
                Err(_) => metrics.record_failure(latency),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_cluster(count: usize) -> Arc<Cluster> {
        let cluster = Arc::new(Cluster::new());
        cluster.create_nodes(count, "node").expect("create");
        for node in cluster.nodes() {
            node.start().expect("start");
        }
        cluster
    }

    // -- request generation -------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_requests_hits_limit() {
        let cluster = running_cluster(2);
        let generator = Arc::new(LoadGenerator::new(
            cluster,
            ClientConfig {
                num_workers: 2,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        let snapshot = generator.run_requests(&token, 50).await;

        assert!(snapshot.total_requests >= 50);
        assert_eq!(snapshot.failed_requests, 0);
        assert!(!generator.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_for_produces_traffic() {
        let cluster = running_cluster(2);
        let generator = Arc::new(LoadGenerator::new(
            cluster,
            ClientConfig {
                num_workers: 2,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        let snapshot = generator
            .run_for(&token, Duration::from_millis(200))
            .await;

        assert!(snapshot.total_requests > 0);
        assert_eq!(
            snapshot.total_requests,
            snapshot.success_requests + snapshot.failed_requests
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_ratio_zero_never_writes() {
        let cluster = running_cluster(1);
        let node = cluster.get_node("node-1").expect("node");
        let generator = Arc::new(LoadGenerator::new(
            Arc::clone(&cluster),
            ClientConfig {
                num_workers: 2,
                write_ratio: 0.0,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        let snapshot = generator.run_requests(&token, 100).await;

        assert!(snapshot.total_requests >= 100);
        // Pure reads leave the store empty.
        assert!(node.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_ratio_one_populates_store() {
        let cluster = running_cluster(1);
        let node = cluster.get_node("node-1").expect("node");
        let generator = Arc::new(LoadGenerator::new(
            Arc::clone(&cluster),
            ClientConfig {
                num_workers: 2,
                write_ratio: 1.0,
                key_range: 8,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        generator.run_requests(&token, 100).await;

        assert!(!node.is_empty());
        assert!(node.len() <= 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_key_range_one_uses_single_key() {
        let cluster = running_cluster(1);
        let node = cluster.get_node("node-1").expect("node");
        let generator = Arc::new(LoadGenerator::new(
            Arc::clone(&cluster),
            ClientConfig {
                num_workers: 2,
                write_ratio: 1.0,
                key_range: 1,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        generator.run_requests(&token, 20).await;

        assert_eq!(node.keys(), vec!["key-0".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stopped_nodes_record_failures() {
        let cluster = running_cluster(1);
        cluster.get_node("node-1").expect("node").stop().expect("stop");

        let generator = Arc::new(LoadGenerator::new(
            cluster,
            ClientConfig {
                num_workers: 2,
                write_ratio: 1.0,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        let snapshot = generator.run_requests(&token, 20).await;

        assert!(snapshot.failed_requests > 0);
        assert!(snapshot.error_rate > 0.99);
    }

    // -- lifecycle ----------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancellation_stops_producer() {
        let cluster = running_cluster(1);
        let generator = Arc::new(LoadGenerator::new(
            cluster,
            ClientConfig {
                num_workers: 2,
                ..ClientConfig::default()
            },
        ));

        let token = CancellationToken::new();
        generator.start(&token);
        assert!(generator.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        generator.stop().await;

        let after = generator.metrics().total_requests();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(generator.metrics().total_requests(), after);
    }

    #[tokio::test]
    async fn test_double_start_and_stop_are_noops() {
        let cluster = running_cluster(1);
        let generator = Arc::new(LoadGenerator::new(cluster, ClientConfig::default()));

        let token = CancellationToken::new();
        generator.start(&token);
        generator.start(&token);
        generator.stop().await;
        generator.stop().await;
        assert!(!generator.is_running());
    }
}
