//! Tests for configuration validation and loading

use std::collections::HashMap;

use studio_ledger::config::{
    LedgerConfig, OutboxConfig, StorageConfig, MAX_CUTOFF_HOURS, MAX_HORIZON_DAYS,
};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_default_config_validates() {
    let cfg = LedgerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.storage, StorageConfig::InMemory);
    assert_eq!(cfg.outbox, OutboxConfig::Disabled);
    assert_eq!(cfg.generation_days, 7);
    assert_eq!(cfg.booking_window.window_days, 7);
    assert_eq!(cfg.booking_window.cutoff_hours, 1);
}

#[test]
fn test_zero_generation_days_rejected() {
    let cfg = LedgerConfig {
        generation_days: 0,
        ..LedgerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_postgres_config_needs_url_and_pool() {
    let empty_url = LedgerConfig {
        storage: StorageConfig::Postgres {
            url: "  ".into(),
            max_connections: 5,
        },
        ..LedgerConfig::default()
    };
    assert!(empty_url.validate().is_err());

    let no_pool = LedgerConfig {
        storage: StorageConfig::Postgres {
            url: "postgres://localhost/studio".into(),
            max_connections: 0,
        },
        ..LedgerConfig::default()
    };
    assert!(no_pool.validate().is_err());
}

#[test]
fn test_file_outbox_needs_path_and_stream() {
    let cfg = LedgerConfig {
        outbox: OutboxConfig::File {
            path: "/tmp/outbox".into(),
            stream: String::new(),
        },
        ..LedgerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "storage": { "kind": "postgres", "url": "postgres://localhost/studio" },
        "outbox": { "kind": "in_memory" },
        "booking_window": { "window_days": 14, "cutoff_hours": 2 },
        "max_waitlist_depth": 5
    }"#;

    let cfg = LedgerConfig::from_json_str(json).unwrap();
    assert_eq!(
        cfg.storage,
        StorageConfig::Postgres {
            url: "postgres://localhost/studio".into(),
            max_connections: 10,
        }
    );
    assert_eq!(cfg.outbox, OutboxConfig::InMemory);
    assert_eq!(cfg.booking_window.window_days, 14);
    assert_eq!(cfg.max_waitlist_depth, 5);
    // Omitted fields fall back to defaults.
    assert_eq!(cfg.generation_days, 7);
}

#[test]
fn test_config_from_json_rejects_invalid_values() {
    assert!(LedgerConfig::from_json_str(r#"{ "generation_days": 0 }"#).is_err());
    assert!(LedgerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_lookup() {
    let cfg = LedgerConfig::from_lookup(lookup(&[
        ("DATABASE_URL", "postgres://db/studio"),
        ("STUDIO_DB_MAX_CONNECTIONS", "4"),
        ("BOOKING_WINDOW_DAYS", "3"),
        ("BOOKING_CUTOFF_HOURS", "0"),
        ("STUDIO_GENERATION_DAYS", "14"),
        ("STUDIO_OUTBOX", "file"),
        ("STUDIO_OUTBOX_PATH", "/var/lib/studio"),
    ]))
    .unwrap();

    assert_eq!(
        cfg.storage,
        StorageConfig::Postgres {
            url: "postgres://db/studio".into(),
            max_connections: 4,
        }
    );
    assert_eq!(cfg.booking_window.window_days, 3);
    assert_eq!(cfg.booking_window.cutoff_hours, 0);
    assert_eq!(cfg.generation_days, 14);
    assert_eq!(
        cfg.outbox,
        OutboxConfig::File {
            path: "/var/lib/studio".into(),
            stream: "notifications".into(),
        }
    );
}

#[test]
fn test_config_from_empty_lookup_is_default() {
    let cfg = LedgerConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, LedgerConfig::default());

    // Blank values count as unset.
    let cfg = LedgerConfig::from_lookup(lookup(&[("DATABASE_URL", " ")])).unwrap();
    assert_eq!(cfg.storage, StorageConfig::InMemory);
}

#[test]
fn test_config_from_lookup_reports_bad_values() {
    let err = LedgerConfig::from_lookup(lookup(&[("BOOKING_WINDOW_DAYS", "soon")])).unwrap_err();
    assert!(err.contains("BOOKING_WINDOW_DAYS"));

    let err = LedgerConfig::from_lookup(lookup(&[("STUDIO_OUTBOX", "carrier-pigeon")])).unwrap_err();
    assert!(err.contains("STUDIO_OUTBOX"));
}

#[test]
fn test_horizons_are_bounded() {
    let err = LedgerConfig::from_lookup(lookup(&[("BOOKING_WINDOW_DAYS", "4000000000")])).unwrap_err();
    assert!(err.contains("booking window"));

    let err = LedgerConfig::from_lookup(lookup(&[("BOOKING_CUTOFF_HOURS", "100000")])).unwrap_err();
    assert!(err.contains("cutoff"));

    let err = LedgerConfig::from_lookup(lookup(&[("STUDIO_GENERATION_DAYS", "4294967295")])).unwrap_err();
    assert!(err.contains("generation_days"));

    let (days, hours) = (MAX_HORIZON_DAYS.to_string(), MAX_CUTOFF_HOURS.to_string());
    let cfg = LedgerConfig::from_lookup(lookup(&[
        ("BOOKING_WINDOW_DAYS", days.as_str()),
        ("BOOKING_CUTOFF_HOURS", hours.as_str()),
    ]))
    .unwrap();
    assert_eq!(cfg.booking_window.window_days, MAX_HORIZON_DAYS);
}
