//! Configuration
//!
//! Runtime settings come from `CONVFLOW_*` environment variables. Plugin
//! wiring (vocabulary, flows) is validated at startup and any mistake there
//! is a [`ConfigError`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUEUE_DEPTH: usize = 32;
const DEFAULT_APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Startup configuration errors. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Flow {0} has no steps")]
    EmptyFlow(String),
    #[error("Flow selector must not be blank")]
    BlankSelector,
    #[error("Flow {0} registered twice")]
    DuplicateFlow(String),
    #[error("Keyword handler arms unregistered flow {0}")]
    UnknownFlow(String),
    #[error("Keyword handler #{0} has no trigger words")]
    EmptyWordSet(usize),
    #[error("Keyword handler #{0} has a blank trigger word")]
    BlankWord(usize),
    #[error("Keyword handler #{handler} duplicates handler #{earlier}")]
    DuplicateTrigger { handler: usize, earlier: usize },
}

/// Process configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// Base URL for links sent to users
    pub base_url: String,
    /// Sent in place of any internal failure
    pub apology: String,
    pub turn_timeout: Duration,
    /// Pending turns buffered per conversation
    pub queue_depth: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("CONVFLOW_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.convflow/convflow.db"))
            },
            PathBuf::from,
        );

        Self {
            db_path,
            port: parse_or(&lookup, "CONVFLOW_PORT", DEFAULT_PORT),
            base_url: lookup("CONVFLOW_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{DEFAULT_PORT}"))
                .trim_end_matches('/')
                .to_string(),
            apology: lookup("CONVFLOW_APOLOGY")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_APOLOGY.to_string()),
            turn_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONVFLOW_TURN_TIMEOUT_SECS",
                DEFAULT_TURN_TIMEOUT_SECS,
            )),
            queue_depth: parse_or(&lookup, "CONVFLOW_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH).max(1),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
