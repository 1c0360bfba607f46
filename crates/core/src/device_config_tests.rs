// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

fn config(raw: serde_json::Value) -> DeviceConfig {
    serde_json::from_value(raw).unwrap()
}

#[test]
fn typed_accessors_read_recognized_sections() {
    let cfg = config(json!({
        "logging": { "level": "warn" },
        "settings": { "deviceReportIntervalMs": 15000 },
        "features": { "enableCloudJobs": true },
    }));
    assert_eq!(cfg.logging_level(), Some("warn"));
    assert_eq!(cfg.setting_ms("deviceReportIntervalMs"), Some(15_000));
    assert_eq!(cfg.feature_enabled("enableCloudJobs"), Some(true));
    assert_eq!(cfg.feature_enabled("enableShadow"), None);
}

#[test]
fn unknown_sections_survive_round_trip() {
    let raw = json!({
        "logging": { "level": "info" },
        "modbus": { "baud": 9600, "parity": "even" },
    });
    let cfg = config(raw.clone());
    assert_eq!(serde_json::to_value(&cfg).unwrap(), raw);
    assert_eq!(cfg.section("modbus").unwrap()["baud"], 9600);
}

#[test]
fn section_names_unions_both_sides() {
    let a = config(json!({ "logging": {}, "modbus": {} }));
    let b = config(json!({ "logging": {}, "can": {} }));
    assert_eq!(a.section_names(&b), vec!["can", "logging", "modbus"]);
}

#[parameterized(
    debug = { "debug", Some(LogLevel::Debug) },
    info = { "info", Some(LogLevel::Info) },
    warn = { "warn", Some(LogLevel::Warn) },
    error = { "error", Some(LogLevel::Error) },
    unknown = { "trace", None },
    empty = { "", None },
)]
fn log_level_parse(input: &str, expected: Option<LogLevel>) {
    assert_eq!(LogLevel::parse(input), expected);
}

#[test]
fn interval_kinds_cover_all_setting_keys() {
    let keys: Vec<_> = IntervalKind::ALL.iter().map(|k| k.setting_key()).collect();
    assert_eq!(
        keys,
        vec![
            "reconciliationIntervalMs",
            "targetStatePollIntervalMs",
            "deviceReportIntervalMs",
            "metricsIntervalMs",
            "cloudJobsPollingIntervalMs",
            "shadowPublishIntervalMs",
        ]
    );
}

#[test]
fn report_interval_floor_is_enforced_higher() {
    assert_eq!(IntervalKind::Report.floor_ms(), 10_000);
    assert_eq!(IntervalKind::TargetPoll.floor_ms(), 1_000);
}

#[test]
fn default_settings_match_documented_defaults() {
    let settings = AgentSettings::default();
    assert_eq!(settings.target_poll_interval_ms, 60_000);
    assert_eq!(settings.report_interval_ms, 10_000);
    assert_eq!(settings.metrics_interval_ms, 300_000);
    assert_eq!(settings.jobs_poll_interval_ms, 30_000);
    assert_eq!(settings.api_timeout_ms, 30_000);
    assert_eq!(settings.handler_timeout_ms, 60_000);
}
