// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_ipu::config::{
    Capabilities, ConfigError, HardwareProfile, SchedulerConfig, DEFAULT_TIMEOUT, MIN_TIMEOUT,
    RESOURCE_MARGIN,
};
use std::{fs, time::Duration};

#[test]
fn test_presets() {
    for name in HardwareProfile::PRESETS {
        let profile = HardwareProfile::preset(name).unwrap();
        assert_eq!(profile.name, name);
        assert!(profile.units >= 1);
    }
    assert_eq!(HardwareProfile::preset("imx6q").unwrap().slots(), 4);
    assert_eq!(HardwareProfile::preset("imx6dl").unwrap().slots(), 2);
    assert_eq!(
        HardwareProfile::preset("imx53").unwrap().capabilities.max_in_width,
        2048
    );
    assert!(HardwareProfile::preset("imx8").is_none());
    assert_eq!(HardwareProfile::default(), HardwareProfile::preset("imx6q").unwrap());
}

#[test]
fn test_defaults() {
    let config = SchedulerConfig::default();
    assert_eq!(config.workers(), 4);
    assert_eq!(config.with_workers(0).workers(), 1);

    let config = SchedulerConfig::default();
    assert_eq!(config.timeout_for(None), DEFAULT_TIMEOUT);
    assert_eq!(config.timeout_for(Some(Duration::from_millis(10))), DEFAULT_TIMEOUT);
    assert_eq!(config.timeout_for(Some(MIN_TIMEOUT)), MIN_TIMEOUT);
    assert_eq!(config.resource_margin, RESOURCE_MARGIN);
}

#[test]
fn test_json_overrides() {
    let config = SchedulerConfig::from_json(
        r#"{
            "profile": "imx6dl",
            "workers": 3,
            "default_timeout_ms": 500,
            "capabilities": { "max_out_width": 2048, "max_out_height": 2048 }
        }"#,
    )
    .unwrap();
    assert_eq!(config.profile.name, "imx6dl");
    assert_eq!(config.profile.units, 1);
    assert_eq!(config.workers(), 3);
    assert_eq!(config.default_timeout, Duration::from_millis(500));
    assert_eq!(config.min_timeout, MIN_TIMEOUT);
    // Missing ceilings keep their defaults.
    assert_eq!(
        config.capabilities(),
        &Capabilities {
            max_out_width: 2048,
            max_out_height: 2048,
            ..Capabilities::default()
        }
    );

    let empty = SchedulerConfig::from_json("{}").unwrap();
    assert_eq!(empty, SchedulerConfig::default());
}

#[test]
fn test_partial_capabilities_keep_profile_ceilings() {
    let config = SchedulerConfig::from_json(
        r#"{ "profile": "imx51", "capabilities": { "max_out_width": 512 } }"#,
    )
    .unwrap();
    let imx51 = HardwareProfile::preset("imx51").unwrap().capabilities;
    assert_eq!(
        config.capabilities(),
        &Capabilities {
            max_out_width: 512,
            ..imx51
        }
    );
    assert_eq!(config.capabilities().max_in_width, 2048);
    assert_eq!(config.capabilities().max_vdi_in_width, 720);

    assert!(matches!(
        SchedulerConfig::from_json(r#"{ "capabilities": { "max_width": 512 } }"#),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_json_errors() {
    assert!(matches!(
        SchedulerConfig::from_json(r#"{ "profile": "imx8" }"#),
        Err(ConfigError::UnknownProfile(name)) if name == "imx8"
    ));
    assert!(matches!(
        SchedulerConfig::from_json(r#"{ "units": 0 }"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json(r#"{ "default_timeout_ms": 10 }"#),
        Err(ConfigError::Invalid(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_json(r#"{ "worker": 2 }"#),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        SchedulerConfig::from_file("/nonexistent/ipu.json"),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("edgefirst-ipu-{}.json", std::process::id()));
    fs::write(&path, r#"{ "profile": "imx51", "units": 2, "resource_margin_ms": 5 }"#).unwrap();
    let config = SchedulerConfig::from_file(&path).unwrap();
    fs::remove_file(&path).unwrap();
    assert_eq!(config.profile.units, 2);
    assert_eq!(config.profile.capabilities.max_vdi_in_width, 720);
    assert_eq!(config.resource_margin, Duration::from_millis(5));
}
