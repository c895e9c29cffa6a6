//! Integration tests for configuration loading.

use dashframe::config::{self, Config};
use dashframe_media::fixture::DashcamFileBuilder;
use dashframe_media::{extract_telemetry, TelemetryRecord, Timeline};
use std::fs;
use tempfile::tempdir;

#[test]
fn explicit_path_takes_precedence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[engine]\ncache_capacity = 30\nlookahead = 2\n").unwrap();

    let config = config::load_config_or_default(Some(&path)).unwrap();
    let options = config.engine_options();
    assert_eq!(options.cache_capacity, 30);
    assert_eq!(options.lookahead, 2);
}

#[test]
fn explicit_missing_path_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(config::load_config_or_default(Some(&path)).is_err());
}

#[test]
fn default_config_is_valid() {
    config::validate_config(&Config::default()).unwrap();
}

#[test]
fn unknown_keys_are_ignored() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashframe.toml");
    fs::write(&path, "[engine]\nlookahead = 3\nhardware = true\n\n[overlay]\nstyle = \"racing\"\n")
        .unwrap();

    let config = config::load_config(&path).unwrap();
    assert_eq!(config.engine.lookahead, 3);
    assert_eq!(config.engine.cache_capacity, 60);
}

#[test]
fn config_round_trips_through_toml() {
    let mut config = Config::default();
    config.engine.cache_capacity = 45;
    config.telemetry.payload_marker = 0x70;

    let text = toml::to_string(&config).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashframe.toml");
    fs::write(&path, text).unwrap();

    assert_eq!(config::load_config(&path).unwrap(), config);
}

#[test]
fn schema_from_config_drives_extraction() {
    let record = TelemetryRecord {
        frame_seq_no: Some(11),
        ..Default::default()
    };
    let data = DashcamFileBuilder::new()
        .frames(10)
        .telemetry_at(4, record.clone())
        .build();

    let config = Config::default();
    let samples = extract_telemetry(&data, &config.telemetry_schema()).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].frame_index, 4);
    assert_eq!(samples[0].record, record);

    let timeline = Timeline::build(data, &config.telemetry_schema()).unwrap();
    assert!(timeline.telemetry_at(3).is_none());
    assert_eq!(timeline.telemetry_at(9).map(|r| r.frame_seq_no), Some(Some(11)));
}
