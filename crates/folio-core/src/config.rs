//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_PORT: u16 = 3004;
const DEFAULT_FRESHNESS_HOURS: u64 = 24;
const DEFAULT_DECISION_TTL_DAYS: u64 = 365;

/// Paths to the Folio data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Consent key/value database (`data/consent.db`).
    pub consent_db: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            consent_db: root.join("consent.db"),
            root,
        })
    }
}

/// Top-level Folio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Maximum age of a cached region classification.
    pub freshness_window: Duration,
    /// Maximum age of a persisted consent decision.
    pub decision_ttl: Duration,
    /// Whether the developer seeding/inspection routes are mounted.
    pub dev_tools: bool,
}

impl FolioConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::from_vars(data_dir, |key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_vars(
        data_dir: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::io::Result<Self> {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let freshness_window =
            duration_or(&lookup, "FOLIO_FRESHNESS_HOURS", 3600, DEFAULT_FRESHNESS_HOURS);
        let decision_ttl =
            duration_or(&lookup, "FOLIO_DECISION_TTL_DAYS", 86_400, DEFAULT_DECISION_TTL_DAYS);
        let dev_tools = lookup("FOLIO_DEV_TOOLS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            port,
            data_paths: DataPaths::new(data_dir)?,
            freshness_window,
            decision_ttl,
            dev_tools,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}='{}', using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Read a count of `unit_secs`-long units; a count too large to represent in
/// seconds is invalid like any unparsable value.
fn duration_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    unit_secs: u64,
    default: u64,
) -> Duration {
    let count = parse_or(lookup, key, default);
    match count.checked_mul(unit_secs) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!("Ignoring out-of-range {}={}, using {}", key, count, default);
            Duration::from_secs(default * unit_secs)
        }
    }
}
