//! End-to-end scenario tests.
//!
//! These exercise the full stack — cluster, load generator, chaos injector,
//! recovery supervisor, event bus — the way a real run composes them,
//! either through the scenario engine or by wiring the components directly
//! when a test needs control-plane knobs the engine does not expose.
//!
//! The event bus sheds load under pressure, so assertions here check for
//! "at least one" of an event rather than exact counts.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use chaos_kvs::chaos::{ChaosConfig, Injector};
use chaos_kvs::cluster::Cluster;
use chaos_kvs::events::{AttackType, Event, EventBus, EventType};
use chaos_kvs::node::NodeStatus;
use chaos_kvs::recovery::{RecoveryConfig, Supervisor};
use chaos_kvs::scenario::{presets, Engine, ScenarioConfig};

fn running_cluster(count: usize) -> Arc<Cluster> {
    let cluster = Arc::new(Cluster::new());
    cluster.create_nodes(count, "node").expect("create nodes");
    for node in cluster.nodes() {
        node.start().expect("start node");
    }
    cluster
}

fn drain(subscriber: &mut chaos_kvs::events::EventSubscriber) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = subscriber.try_recv() {
        events.push(event);
    }
    events
}

// -- scenario 1: baseline without chaos --------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn basic_run_without_chaos() {
    let engine = Engine::new(ScenarioConfig {
        name: "basic".to_string(),
        duration: Duration::from_secs(1),
        node_count: 2,
        client_workers: 2,
        enable_chaos: false,
        enable_recovery: false,
        ..ScenarioConfig::default()
    });

    let token = CancellationToken::new();
    let result = engine.run(&token).await.expect("run");

    assert!(result.total_requests > 0);
    assert_eq!(result.failed_requests, 0);
    assert_eq!(result.total_attacks, 0);
    assert_eq!(result.total_recoveries, 0);
    assert_eq!(result.final_node_status.len(), 2);
    for status in result.final_node_status.values() {
        assert_eq!(status, "running");
    }
}

// -- scenario 2: kill followed by automatic restart ---------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn kill_then_restart_event_sequence() {
    let cluster = running_cluster(1);
    let bus = Arc::new(EventBus::new());
    let mut subscriber = bus.subscribe();

    let injector = Arc::new(Injector::new(
        Arc::clone(&cluster),
        ChaosConfig {
            interval: Duration::from_millis(50),
            attack_types: vec![AttackType::Kill],
            ..ChaosConfig::default()
        },
    ));
    injector.set_event_bus(Arc::clone(&bus));

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&cluster),
        RecoveryConfig {
            health_check_interval: Duration::from_millis(50),
            recovery_delay: Duration::from_millis(100),
            ..RecoveryConfig::default()
        },
    ));
    supervisor.set_event_bus(Arc::clone(&bus));

    let token = CancellationToken::new();
    injector.start(&token);
    supervisor.start(&token);

    tokio::time::sleep(Duration::from_secs(1)).await;
    injector.stop().await;

    // Give the supervisor room to repair the final kill.
    tokio::time::sleep(Duration::from_millis(600)).await;
    supervisor.stop().await;

    let node = cluster.get_node("node-1").expect("node");
    assert_eq!(node.status(), NodeStatus::Running);
    assert!(injector.attack_count() >= 1);
    assert!(supervisor.stats().success_recoveries >= 1);

    // The bus must show an attack, then a recovery start, then a success,
    // all naming node-1.
    let events = drain(&mut subscriber);
    assert!(events.iter().all(|e| e.node_id == "node-1"));

    let attack = events
        .iter()
        .position(|e| e.event_type == EventType::ChaosAttack)
        .expect("chaos_attack event");
    let start = events[attack..]
        .iter()
        .position(|e| e.event_type == EventType::RecoveryStart)
        .map(|i| attack + i)
        .expect("recovery_start after attack");
    assert!(
        events[start..]
            .iter()
            .any(|e| e.event_type == EventType::RecoverySuccess),
        "recovery_success after recovery_start"
    );
}

// -- scenario 3: suspend with injector auto-resume ----------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn suspend_auto_resume() {
    let cluster = running_cluster(3);
    let bus = Arc::new(EventBus::new());
    let mut subscriber = bus.subscribe();

    let injector = Arc::new(Injector::new(
        Arc::clone(&cluster),
        ChaosConfig {
            interval: Duration::from_millis(50),
            attack_types: vec![AttackType::Suspend],
            suspend_time: Duration::from_millis(200),
            ..ChaosConfig::default()
        },
    ));
    injector.set_event_bus(Arc::clone(&bus));

    let token = CancellationToken::new();
    injector.start(&token);

    // The auto-resume sweep runs on a 500ms cadence, so give the loop time
    // to fire at least once after the first suspensions expire.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    injector.stop().await;

    let events = drain(&mut subscriber);
    assert!(
        events
            .iter()
            .any(|e| e.event_type == EventType::ChaosResume),
        "expected at least one chaos_resume"
    );

    // Stop resumed anything still suspended.
    assert_eq!(cluster.suspended_count(), 0);
}

// -- scenario 4: delay injection cleared by recovery --------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delay_injected_then_cleared() {
    let cluster = running_cluster(1);
    let node = cluster.get_node("node-1").expect("node");

    let injector = Arc::new(Injector::new(
        Arc::clone(&cluster),
        ChaosConfig {
            interval: Duration::from_millis(30),
            attack_types: vec![AttackType::Delay],
            delay_duration: Duration::from_millis(100),
            ..ChaosConfig::default()
        },
    ));

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&cluster),
        RecoveryConfig {
            health_check_interval: Duration::from_millis(50),
            recovery_delay: Duration::ZERO,
            clear_delay: true,
            ..RecoveryConfig::default()
        },
    ));

    let token = CancellationToken::new();
    injector.start(&token);
    supervisor.start(&token);

    // The delay must be observable while the injector is attacking.
    let mut observed = Duration::ZERO;
    for _ in 0..300 {
        observed = node.delay();
        if !observed.is_zero() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(observed, Duration::from_millis(100));

    injector.stop().await;

    // With the injector gone the supervisor clears the knob for good.
    tokio::time::sleep(Duration::from_millis(200)).await;
    supervisor.stop().await;
    assert_eq!(node.delay(), Duration::ZERO);
    assert_eq!(node.status(), NodeStatus::Running);
}

// -- scenario 5: the quick preset end to end ----------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quick_preset_full_run() {
    let bus = Arc::new(EventBus::new());
    let engine = Engine::new(presets::quick());
    engine.set_event_bus(Arc::clone(&bus));

    let token = CancellationToken::new();
    let result = engine.run(&token).await.expect("run");

    assert_eq!(result.scenario_name, "quick");
    assert!(result.total_requests > 0);
    assert!(result.total_attacks >= 3, "attacks={}", result.total_attacks);
    assert!(
        result.total_recoveries >= 1,
        "recoveries={}",
        result.total_recoveries
    );
    assert!(result.error_rate < 1.0);
    assert!(
        result.total_recoveries >= result.success_recoveries + result.failed_recoveries
    );
    assert_eq!(
        result.total_requests,
        result.success_requests + result.failed_requests
    );
}

// -- scenario 6: early cancellation -------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_shortens_run_without_error() {
    let engine = Arc::new(Engine::new(ScenarioConfig {
        duration: Duration::from_secs(10),
        node_count: 2,
        client_workers: 2,
        ..ScenarioConfig::default()
    }));

    let token = CancellationToken::new();
    let run = {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        tokio::spawn(async move { engine.run(&token).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();

    let result = run.await.expect("join").expect("run returns ok");
    assert!(result.duration < Duration::from_secs(10));
    assert!(result.duration >= Duration::from_millis(400));
    assert_eq!(result.final_node_status.len(), 2);
}
