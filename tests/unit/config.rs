//! Configuration loading and token persistence tests

use std::fs;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::tempdir;
use test_log::test;

use fitbit_tracker::models::{Config, TokenPair, TokenStore};

use crate::common::{test_data, write_config_file};

#[test]
fn test_load_missing_file_is_fatal() {
    let dir = tempdir().unwrap();
    let err = Config::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_load_rejects_bad_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fitbit-config.json");
    fs::write(&path, "{not json").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn test_empty_tokens_detected_before_any_network_call() {
    let dir = tempdir().unwrap();
    let mut doc = test_data::sample_config_value("https://api.fitbit.com", "");
    doc["access_token"] = Value::String(String::new());
    let path = write_config_file(dir.path(), &doc);

    let config = Config::load(&path).unwrap();
    let err = config.validate_tokens().unwrap_err();
    assert!(err.to_string().contains("No access token found"));
}

#[test]
fn test_defaults_applied_for_missing_rate_limit() {
    let dir = tempdir().unwrap();
    let mut doc = test_data::sample_config_value("https://api.fitbit.com", "");
    doc.as_object_mut().unwrap().remove("rate_limit_per_hour");
    let path = write_config_file(dir.path(), &doc);

    let config = Config::load(&path).unwrap();
    assert_eq!(config.rate_limit_per_hour, 150);
}

#[test]
fn test_persist_updates_exactly_the_token_fields() {
    let dir = tempdir().unwrap();
    let mut doc = test_data::sample_config_value(
        "https://api.fitbit.com",
        "2024-03-09T00:00:00+00:00",
    );
    // Operator-owned field the tracker knows nothing about
    doc.as_object_mut().unwrap().insert(
        "notes".to_string(),
        Value::String("personal tracker config".to_string()),
    );
    let path = write_config_file(dir.path(), &doc);
    let before: serde_json::Map<String, Value> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    let expires_at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let store = TokenStore::new(path.clone());
    store
        .persist(&TokenPair {
            access_token: "new-access-token".to_string(),
            refresh_token: "new-refresh-token".to_string(),
            expires_at: Some(expires_at),
        })
        .unwrap();

    let after: serde_json::Map<String, Value> =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(after["access_token"], "new-access-token");
    assert_eq!(after["refresh_token"], "new-refresh-token");
    assert_eq!(after["token_expires"], expires_at.to_rfc3339());

    // Every other field survives the rewrite untouched, in the same order
    let untouched = |map: &serde_json::Map<String, Value>| -> Vec<(String, Value)> {
        map.iter()
            .filter(|(k, _)| {
                !matches!(k.as_str(), "access_token" | "refresh_token" | "token_expires")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    };
    assert_eq!(untouched(&before), untouched(&after));
    let keys = |map: &serde_json::Map<String, Value>| -> Vec<String> {
        map.keys().cloned().collect()
    };
    assert_eq!(keys(&before), keys(&after));
}

#[test]
fn test_persist_round_trips_through_load() {
    let dir = tempdir().unwrap();
    let doc = test_data::sample_config_value("https://api.fitbit.com", "");
    let path = write_config_file(dir.path(), &doc);

    let expires_at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let store = TokenStore::new(path.clone());
    store
        .persist(&TokenPair {
            access_token: "rotated-access".to_string(),
            refresh_token: "rotated-refresh".to_string(),
            expires_at: Some(expires_at),
        })
        .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.access_token, "rotated-access");
    assert_eq!(config.refresh_token, "rotated-refresh");

    let pair = TokenPair::from_config(&config);
    assert_eq!(pair.expires_at, Some(expires_at));
    assert!(!pair.needs_refresh(expires_at - chrono::Duration::hours(1)));
}
