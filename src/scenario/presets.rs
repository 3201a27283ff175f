//! Preset scenario catalog.
//!
//! Named, ready-to-run configurations covering the common study shapes:
//! a clean baseline, kill-and-recover, latency injection, a stress mix,
//! and a quick smoke run.

use std::time::Duration;

use crate::events::AttackType;
use crate::scenario::ScenarioConfig;

/// Pure load test: no chaos, no recovery.
pub fn basic() -> ScenarioConfig {
    ScenarioConfig {
        name: "basic".to_string(),
        description: "Basic load test without chaos injection".to_string(),
        duration: Duration::from_secs(10),
        node_count: 3,
        client_workers: 10,
        write_ratio: 0.5,
        enable_chaos: false,
        enable_recovery: false,
        ..ScenarioConfig::default()
    }
}

/// Kill attacks with automatic restart.
pub fn resilience() -> ScenarioConfig {
    ScenarioConfig {
        name: "resilience".to_string(),
        description: "Resilience test with node kills and recovery".to_string(),
        duration: Duration::from_secs(15),
        node_count: 5,
        client_workers: 10,
        write_ratio: 0.5,
        enable_chaos: true,
        chaos_interval: Duration::from_secs(3),
        chaos_targets: 1,
        attack_types: vec![AttackType::Kill],
        enable_recovery: true,
        recovery_delay: Duration::from_secs(1),
        max_retries: 3,
        ..ScenarioConfig::default()
    }
}

/// Delay injection with automatic clearing.
pub fn latency() -> ScenarioConfig {
    ScenarioConfig {
        name: "latency".to_string(),
        description: "Latency injection test".to_string(),
        duration: Duration::from_secs(10),
        node_count: 3,
        client_workers: 10,
        write_ratio: 0.5,
        enable_chaos: true,
        chaos_interval: Duration::from_secs(2),
        chaos_targets: 1,
        attack_types: vec![AttackType::Delay],
        enable_recovery: true,
        recovery_delay: Duration::from_millis(500),
        max_retries: 0,
        ..ScenarioConfig::default()
    }
}

/// High load with every attack type in the mix.
pub fn stress() -> ScenarioConfig {
    ScenarioConfig {
        name: "stress".to_string(),
        description: "High load stress test with multiple attack types".to_string(),
        duration: Duration::from_secs(20),
        node_count: 7,
        client_workers: 50,
        write_ratio: 0.3,
        enable_chaos: true,
        chaos_interval: Duration::from_secs(2),
        chaos_targets: 2,
        attack_types: vec![AttackType::Kill, AttackType::Suspend, AttackType::Delay],
        enable_recovery: true,
        recovery_delay: Duration::from_millis(500),
        max_retries: 5,
        ..ScenarioConfig::default()
    }
}

/// Short smoke run for quick verification.
pub fn quick() -> ScenarioConfig {
    ScenarioConfig {
        name: "quick".to_string(),
        description: "Quick test for verification".to_string(),
        duration: Duration::from_secs(5),
        node_count: 3,
        client_workers: 5,
        write_ratio: 0.5,
        enable_chaos: true,
        chaos_interval: Duration::from_secs(1),
        chaos_targets: 1,
        attack_types: vec![AttackType::Suspend],
        enable_recovery: true,
        recovery_delay: Duration::from_millis(500),
        max_retries: 2,
        ..ScenarioConfig::default()
    }
}

/// Look up a preset by name.
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    match name {
        "basic" => Some(basic()),
        "resilience" => Some(resilience()),
        "latency" => Some(latency()),
        "stress" => Some(stress()),
        "quick" => Some(quick()),
        _ => None,
    }
}

/// Names of all available presets.
pub fn preset_names() -> &'static [&'static str] {
    &["basic", "resilience", "latency", "stress", "quick"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_resolves() {
        for name in preset_names() {
            let config = preset(name).expect("preset exists");
            assert_eq!(&config.name, name);
            assert!(config.node_count >= 1);
            if config.enable_chaos {
                assert!(!config.attack_types.is_empty());
            }
        }
    }

    #[test]
    fn test_unknown_preset() {
        assert!(preset("nope").is_none());
    }

    #[test]
    fn test_basic_disables_control_plane() {
        let config = basic();
        assert!(!config.enable_chaos);
        assert!(!config.enable_recovery);
    }

    #[test]
    fn test_resilience_is_kill_only() {
        let config = resilience();
        assert_eq!(config.attack_types, vec![AttackType::Kill]);
        assert!(config.enable_recovery);
    }

    #[test]
    fn test_quick_is_suspend_only() {
        let config = quick();
        assert_eq!(config.attack_types, vec![AttackType::Suspend]);
        assert_eq!(config.max_retries, 2);
    }
}
