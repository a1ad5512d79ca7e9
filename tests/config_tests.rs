// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use histeq::config::{BackendPreference, Config, PowerPreference};
use histeq::errors::ConfigError;
use std::path::PathBuf;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("histeq-config-{}-{}", std::process::id(), name))
        .join("config.json")
}

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.backend, BackendPreference::Auto);
    assert_eq!(config.power_preference, PowerPreference::HighPerformance);
    assert!(
        config.concurrent_channels,
        "Channels should run concurrently by default"
    );
    assert!(!config.report_timings);
    assert_eq!(config.device_index, None);
}

#[test]
fn test_config_save_and_load() {
    let path = scratch_path("roundtrip");
    let config = Config {
        backend: BackendPreference::Cpu,
        power_preference: PowerPreference::LowPower,
        device_index: Some(1),
        concurrent_channels: false,
        report_timings: true,
    };
    config.save_to(&path).unwrap();
    assert_eq!(Config::load_from(&path).unwrap(), config);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_partial_file_uses_defaults() {
    let path = scratch_path("partial");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "backend": "gpu" }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.backend, BackendPreference::Gpu);
    assert!(config.concurrent_channels);
    assert_eq!(config.device_index, None);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_device_index() {
    let path = scratch_path("device");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "device_index": 2 }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.device_index, Some(2));
    assert_eq!(config.backend, BackendPreference::Auto);

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_malformed_file() {
    let path = scratch_path("malformed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ backend = gpu").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(ConfigError::Parse(_))
    ));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_config_missing_file() {
    let path = scratch_path("missing");
    assert!(matches!(Config::load_from(&path), Err(ConfigError::Io(_))));
}

#[test]
fn test_config_serialized_names() {
    let json = serde_json::to_string(&Config::default()).unwrap();
    assert!(json.contains(r#""backend":"auto""#));
    assert!(json.contains(r#""power_preference":"high_performance""#));
}

#[test]
fn test_backend_preference_from_str() {
    assert_eq!("cpu".parse::<BackendPreference>(), Ok(BackendPreference::Cpu));
    assert_eq!("GPU".parse::<BackendPreference>(), Ok(BackendPreference::Gpu));
    assert!("opencl".parse::<BackendPreference>().is_err());
}
