use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use rebid_tracker::config::ConfigError;
use rebid_tracker::{BlockTrigger, Config};

fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

const CREDS: [(&str, &str); 2] = [("REBID_RPC_USER", "alice"), ("REBID_RPC_PASSWORD", "s3cret")];

#[test]
fn defaults_apply_when_only_credentials_are_set() {
    let c = load(&CREDS).unwrap();
    assert_eq!(c.rpc_url, "http://127.0.0.1:8332");
    assert_eq!(c.rpc_user, "alice");
    assert_eq!(c.rpc_timeout, Duration::from_secs(30));
    assert_eq!(c.report_path, PathBuf::from("data/rebids.csv"));
    assert_eq!(c.store_path, PathBuf::from("data/rebid.sqlite"));
    assert_eq!(c.journal_path, None);
    assert_eq!(c.min_history, 3);
    assert_eq!(c.max_records, None);
    assert_eq!(c.block_trigger, BlockTrigger::HashBlock);
    assert_eq!(c.log_filter, "info");
    assert!(!c.log_json);
}

#[test]
fn overrides_are_parsed() {
    let mut vars = CREDS.to_vec();
    vars.extend([
        ("REBID_RPC_URL", "http://node:18443"),
        ("REBID_RPC_TIMEOUT_SECS", "5"),
        ("REBID_JOURNAL_PATH", "/tmp/events.txt"),
        ("REBID_MIN_HISTORY", "1"),
        ("REBID_MAX_RECORDS", "50000"),
        ("REBID_BLOCK_TRIGGER", "Sequence"),
        ("REBID_LOG_JSON", "true"),
    ]);
    let c = load(&vars).unwrap();
    assert_eq!(c.rpc_url, "http://node:18443");
    assert_eq!(c.rpc_timeout, Duration::from_secs(5));
    assert_eq!(c.journal_path, Some(PathBuf::from("/tmp/events.txt")));
    assert_eq!(c.min_history, 1);
    assert_eq!(c.max_records, Some(50_000));
    assert_eq!(c.block_trigger, BlockTrigger::SequenceConnected);
    assert!(c.log_json);
}

#[test]
fn credentials_are_required() {
    assert_eq!(
        load(&[("REBID_RPC_PASSWORD", "x")]).unwrap_err(),
        ConfigError::MissingEnvVar("REBID_RPC_USER".to_string())
    );
    // blank counts as unset
    assert_eq!(
        load(&[("REBID_RPC_USER", "alice"), ("REBID_RPC_PASSWORD", "  ")]).unwrap_err(),
        ConfigError::MissingEnvVar("REBID_RPC_PASSWORD".to_string())
    );
}

#[test]
fn bad_values_are_rejected() {
    for (key, value) in [
        ("REBID_MIN_HISTORY", "three"),
        ("REBID_MAX_RECORDS", "-1"),
        ("REBID_RPC_TIMEOUT_SECS", "0"),
        ("REBID_BLOCK_TRIGGER", "rawblock"),
    ] {
        let mut vars = CREDS.to_vec();
        vars.push((key, value));
        assert!(
            matches!(load(&vars), Err(ConfigError::InvalidValue(k, _)) if k == key),
            "{key}={value}"
        );
    }
}
