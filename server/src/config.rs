//! Server configuration.
//!
//! Values load from an optional TOML file and may be overridden by
//! command-line flags. Byte sizes accept human-readable strings like
//! "256MB". Out-of-range numeric values are normalized by the cache
//! builder rather than rejected here.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// TCP bind address.
    pub listen_addr: SocketAddr,

    /// Hard byte ceiling for the cache (e.g. "256MB").
    #[serde(deserialize_with = "deserialize_size")]
    pub max_bytes: i64,

    /// Post-eviction watermark; 0 selects 95% of `max_bytes`.
    #[serde(deserialize_with = "deserialize_size")]
    pub target_bytes: i64,

    /// Victim budget per write operation.
    pub max_evict_per_op: usize,

    /// Sliding TTL in seconds applied on successful incr/decr; 0
    /// disables.
    pub incr_sliding_ttl_seconds: i64,

    /// Per-item bookkeeping charge added to key and value bytes.
    pub entry_overhead: i64,

    /// Worker threads for the runtime (default: number of CPUs).
    pub threads: Option<usize>,

    /// Emit readiness and per-connection error logs.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 11211)),
            max_bytes: 256 * 1024 * 1024,
            target_bytes: 0,
            max_evict_per_op: 64,
            incr_sliding_ttl_seconds: 0,
            entry_overhead: 200,
            threads: None,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Number of worker threads for the runtime.
    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

/// Deserialize a size as either an integer byte count or a string
/// like "64MB".
fn deserialize_size<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(i64),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "64MB", "4GB", or a bare byte count.
pub fn parse_size(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: i64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: i64 = match suffix.as_str() {
        "" => 1,
        "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}
