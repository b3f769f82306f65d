//! Gateway configuration.
//!
//! All configuration is driven by environment variables. See
//! [`GateConfig::from_env`] for the full list.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{GateError, GateResult};

/// Identity key source that makes the gateway generate a fresh key at startup.
pub const GENERATED_KEY: &str = "generated";

const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// A storage node the gateway keeps connections to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Network address of the node (`host:port`).
    pub address: String,
    /// Relative preference of the node; the healthiest heaviest node wins.
    pub weight: f64,
}

impl PeerConfig {
    /// Parse a single `address[=weight]` entry. A missing weight defaults to `1.0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use neofs_gate_core::config::PeerConfig;
    ///
    /// let peer = PeerConfig::parse("s01.neofs.devenv:8080=0.5").unwrap();
    /// assert_eq!(peer.address, "s01.neofs.devenv:8080");
    /// assert!((peer.weight - 0.5).abs() < f64::EPSILON);
    /// ```
    pub fn parse(entry: &str) -> GateResult<Self> {
        let entry = entry.trim();
        let (address, weight) = match entry.split_once('=') {
            Some((address, weight)) => {
                let weight = weight.trim().parse::<f64>().map_err(|_| {
                    GateError::Config(format!("invalid peer weight in {entry:?}"))
                })?;
                (address.trim(), weight)
            }
            None => (entry, 1.0),
        };

        if address.is_empty() {
            return Err(GateError::Config(format!("empty peer address in {entry:?}")));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(GateError::Config(format!("invalid peer weight in {entry:?}")));
        }

        Ok(Self {
            address: address.to_owned(),
            weight,
        })
    }
}

/// Gateway configuration.
///
/// # Examples
///
/// ```
/// use neofs_gate_core::config::GateConfig;
///
/// let config = GateConfig::default();
/// assert_eq!(config.listen_address, "0.0.0.0:8080");
/// assert!(!config.auth_permissive);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Bind address for the S3 endpoint.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub listen_address: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Identity key source: `generated`, a WIF string, a hex string, or a file path.
    #[builder(default = String::from(GENERATED_KEY))]
    pub neofs_key: String,

    /// Path to the PEM-encoded RSA key used to seal bearer tokens into access keys.
    #[builder(default, setter(strip_option))]
    pub auth_key_path: Option<String>,

    /// Storage nodes to keep connections to.
    #[builder(default)]
    pub peers: Vec<PeerConfig>,

    /// Per-peer connect timeout, also the startup connection deadline.
    #[builder(default = Duration::from_secs(30))]
    pub connect_timeout: Duration,

    /// Whole-request deadline enforced by the HTTP layer.
    #[builder(default = Duration::from_secs(15))]
    pub request_timeout: Duration,

    /// Largest request body the HTTP layer reads into memory, in bytes.
    #[builder(default = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,

    /// Interval between pool rebalances.
    #[builder(default = Duration::from_secs(15))]
    pub rebalance_timer: Duration,

    /// Log authentication failures and continue instead of rejecting the request.
    #[builder(default = false)]
    pub auth_permissive: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen_address: String::from("0.0.0.0:8080"),
            log_level: String::from("info"),
            neofs_key: String::from(GENERATED_KEY),
            auth_key_path: None,
            peers: Vec::new(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            rebalance_timer: Duration::from_secs(15),
            auth_permissive: false,
        }
    }
}

impl GateConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATE_LISTEN_ADDRESS` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `GATE_NEOFS_KEY` | `generated` |
    /// | `GATE_AUTH_KEY` | *(unset)* |
    /// | `GATE_PEERS` | *(empty)* |
    /// | `GATE_CONNECT_TIMEOUT` | `30` (seconds) |
    /// | `GATE_REQUEST_TIMEOUT` | `15` (seconds) |
    /// | `GATE_MAX_BODY_SIZE` | `67108864` (bytes) |
    /// | `GATE_REBALANCE_TIMER` | `15` (seconds) |
    /// | `GATE_AUTH_PERMISSIVE` | `false` |
    ///
    /// Malformed numeric values are rejected rather than silently defaulted.
    pub fn from_env() -> GateResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GateResult<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("GATE_LISTEN_ADDRESS") {
            config.listen_address = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("GATE_NEOFS_KEY") {
            config.neofs_key = v;
        }
        if let Some(v) = lookup("GATE_AUTH_KEY") {
            if !v.is_empty() {
                config.auth_key_path = Some(v);
            }
        }
        if let Some(v) = lookup("GATE_PEERS") {
            config.peers = parse_peers(&v)?;
        }
        if let Some(v) = lookup("GATE_CONNECT_TIMEOUT") {
            config.connect_timeout = parse_seconds("GATE_CONNECT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("GATE_REQUEST_TIMEOUT") {
            config.request_timeout = parse_seconds("GATE_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("GATE_MAX_BODY_SIZE") {
            config.max_body_size = parse_size("GATE_MAX_BODY_SIZE", &v)?;
        }
        if let Some(v) = lookup("GATE_REBALANCE_TIMER") {
            config.rebalance_timer = parse_seconds("GATE_REBALANCE_TIMER", &v)?;
        }
        if let Some(v) = lookup("GATE_AUTH_PERMISSIVE") {
            config.auth_permissive = parse_bool(&v);
        }

        Ok(config)
    }
}

/// Parse a comma-separated list of `address[=weight]` entries.
fn parse_peers(value: &str) -> GateResult<Vec<PeerConfig>> {
    value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(PeerConfig::parse)
        .collect()
}

fn parse_seconds(name: &str, value: &str) -> GateResult<Duration> {
    let secs = value.trim().parse::<u64>().map_err(|_| {
        GateError::Config(format!("{name} must be a number of seconds, got {value:?}"))
    })?;
    if secs == 0 {
        return Err(GateError::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_size(name: &str, value: &str) -> GateResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(GateError::Config(format!("{name} must be greater than zero"))),
        Ok(size) => Ok(size),
        Err(_) => Err(GateError::Config(format!(
            "{name} must be a number of bytes, got {value:?}"
        ))),
    }
}

/// Parse a boolean from a string, accepting `"1"`, `"true"`, `"yes"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_should_create_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert_eq!(config.neofs_key, GENERATED_KEY);
        assert!(config.auth_key_path.is_none());
        assert!(config.peers.is_empty());
        assert_eq!(config.rebalance_timer, Duration::from_secs(15));
    }

    #[test]
    fn test_should_load_config_from_lookup() {
        let config = GateConfig::from_lookup(lookup_from(&[
            ("GATE_LISTEN_ADDRESS", "127.0.0.1:9000"),
            ("GATE_AUTH_KEY", "/etc/neofs/auth.pem"),
            ("GATE_PEERS", "s01:8080=2, s02:8080"),
            ("GATE_CONNECT_TIMEOUT", "5"),
            ("GATE_AUTH_PERMISSIVE", "true"),
            ("GATE_MAX_BODY_SIZE", "1048576"),
        ]))
        .unwrap();

        assert_eq!(config.listen_address, "127.0.0.1:9000");
        assert_eq!(config.auth_key_path.as_deref(), Some("/etc/neofs/auth.pem"));
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].address, "s01:8080");
        assert!((config.peers[0].weight - 2.0).abs() < f64::EPSILON);
        assert!((config.peers[1].weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.auth_permissive);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[test]
    fn test_should_reject_malformed_body_size() {
        let result = GateConfig::from_lookup(lookup_from(&[("GATE_MAX_BODY_SIZE", "1MiB")]));
        assert!(matches!(result, Err(GateError::Config(_))));

        let result = GateConfig::from_lookup(lookup_from(&[("GATE_MAX_BODY_SIZE", "0")]));
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_should_reject_malformed_timeout() {
        let result = GateConfig::from_lookup(lookup_from(&[("GATE_REQUEST_TIMEOUT", "15s")]));
        assert!(matches!(result, Err(GateError::Config(_))));

        let result = GateConfig::from_lookup(lookup_from(&[("GATE_REBALANCE_TIMER", "0")]));
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_should_reject_invalid_peer_weight() {
        assert!(PeerConfig::parse("s01:8080=heavy").is_err());
        assert!(PeerConfig::parse("s01:8080=-1").is_err());
        assert!(PeerConfig::parse("=1").is_err());
    }

    #[test]
    fn test_should_build_config_with_builder() {
        let config = GateConfig::builder()
            .auth_key_path("/tmp/key.pem".to_owned())
            .auth_permissive(true)
            .build();
        assert_eq!(config.auth_key_path.as_deref(), Some("/tmp/key.pem"));
        assert!(config.auth_permissive);
        assert_eq!(config.log_level, "info");
    }
}
