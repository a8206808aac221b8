//! Environment-based configuration for the `rebid-tracker` binary.
//!
//! # Environment variables
//! - `REBID_RPC_URL` - bitcoind JSON-RPC endpoint (default `http://127.0.0.1:8332`)
//! - `REBID_RPC_USER`, `REBID_RPC_PASSWORD` - RPC credentials (required)
//! - `REBID_RPC_TIMEOUT_SECS` - per-request timeout (default 30)
//! - `REBID_REPORT_PATH` - CSV report (default `data/rebids.csv`)
//! - `REBID_STORE_PATH` - SQLite progress store (default `data/rebid.sqlite`)
//! - `REBID_JOURNAL_PATH` - dump every event here when set
//! - `REBID_MIN_HISTORY` - report records with more observations than this (default 3)
//! - `REBID_MAX_RECORDS` - cap on records per block window (default: none)
//! - `REBID_BLOCK_TRIGGER` - `hashblock` or `sequence` (default `hashblock`)
//! - `REBID_LOG` - tracing filter (default `info`)
//! - `REBID_LOG_JSON` - `1`/`true` for JSON logs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::report::DEFAULT_MIN_HISTORY;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// A variable is set but does not parse.
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which notification closes a block window.
///
/// A node publishing both `hashblock` and `sequence` reports every block twice;
/// only one of them may drive the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTrigger {
    /// `hashblock` notifications.
    #[default]
    HashBlock,
    /// `sequence` notifications labelled block-connected.
    SequenceConnected,
}

impl FromStr for BlockTrigger {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashblock" => Ok(BlockTrigger::HashBlock),
            "sequence" | "connected" => Ok(BlockTrigger::SequenceConnected),
            _ => Err(ConfigError::InvalidValue(
                "REBID_BLOCK_TRIGGER".to_string(),
                format!("unknown trigger: {s}"),
            )),
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone)]
pub struct Config {
    /// bitcoind JSON-RPC endpoint.
    pub rpc_url: String,
    /// RPC user.
    pub rpc_user: String,
    /// RPC password.
    pub rpc_password: String,
    /// Per-request timeout for node calls.
    pub rpc_timeout: Duration,
    /// CSV report path.
    pub report_path: PathBuf,
    /// SQLite progress store path.
    pub store_path: PathBuf,
    /// Optional event journal path.
    pub journal_path: Option<PathBuf>,
    /// Emitter threshold.
    pub min_history: usize,
    /// Optional per-window record cap.
    pub max_records: Option<usize>,
    /// Which notification closes a window.
    pub block_trigger: BlockTrigger,
    /// tracing filter directive.
    pub log_filter: String,
    /// JSON log output.
    pub log_json: bool,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup (the environment, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let config = Config {
            rpc_url: get("REBID_RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8332".to_string()),
            rpc_user: required("REBID_RPC_USER")?,
            rpc_password: required("REBID_RPC_PASSWORD")?,
            rpc_timeout: Duration::from_secs(parse_or(&get, "REBID_RPC_TIMEOUT_SECS", 30)?),
            report_path: get("REBID_REPORT_PATH")
                .unwrap_or_else(|| "data/rebids.csv".to_string())
                .into(),
            store_path: get("REBID_STORE_PATH")
                .unwrap_or_else(|| "data/rebid.sqlite".to_string())
                .into(),
            journal_path: get("REBID_JOURNAL_PATH").map(PathBuf::from),
            min_history: parse_or(&get, "REBID_MIN_HISTORY", DEFAULT_MIN_HISTORY)?,
            max_records: get("REBID_MAX_RECORDS")
                .map(|v| parse(&v, "REBID_MAX_RECORDS"))
                .transpose()?,
            block_trigger: get("REBID_BLOCK_TRIGGER")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            log_filter: get("REBID_LOG").unwrap_or_else(|| "info".to_string()),
            log_json: get("REBID_LOG_JSON")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        if config.rpc_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "REBID_RPC_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw.to_string()))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key).map(|v| parse(&v, key)).unwrap_or(Ok(default))
}
