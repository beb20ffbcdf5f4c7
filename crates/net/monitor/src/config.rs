//! Peer monitor configuration (TOML-serializable).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Default period of the health-check loop.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default period of both discovery loops.
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single address-list request during online discovery.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Failed attempts tolerated before a connected peer is evicted.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Registered peer count below which discovery dials.
pub const DEFAULT_TARGET_PEERS: usize = 25;

/// Configuration for [`PeerMonitor`](crate::PeerMonitor).
///
/// Durations are written as humantime strings (`"5s"`, `"1m 30s"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMonitorConfig {
    /// Period of the health-check loop.
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,

    /// Period of the online and offline discovery loops.
    #[serde(default = "default_discovery_interval", with = "humantime_serde")]
    pub discovery_interval: Duration,

    /// Per-peer deadline for address requests; expiry counts as a failed request.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// A peer whose address has more failed attempts than this is evicted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Discovery runs while fewer peers than this are registered.
    #[serde(default = "default_target_peers")]
    pub target_peers: usize,

    /// Bootstrap addresses, dialed while under target and released once stable.
    #[serde(default)]
    pub seeds: Vec<SocketAddr>,

    /// Blacklist peers evicted for an unsupported protocol version.
    #[serde(default)]
    pub blacklist_incompatible: bool,
}

impl Default for PeerMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            target_peers: DEFAULT_TARGET_PEERS,
            seeds: Vec::new(),
            blacklist_incompatible: false,
        }
    }
}

impl PeerMonitorConfig {
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_target_peers(mut self, target_peers: usize) -> Self {
        self.target_peers = target_peers;
        self
    }

    pub fn with_seeds(mut self, seeds: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.seeds = seeds.into_iter().collect();
        self
    }

    pub fn with_blacklist_incompatible(mut self, enabled: bool) -> Self {
        self.blacklist_incompatible = enabled;
        self
    }

    pub fn is_seed(&self, addr: &SocketAddr) -> bool {
        self.seeds.contains(addr)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, MonitorError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.check_interval.is_zero() {
            return Err(MonitorError::InvalidConfig("check_interval must be non-zero"));
        }
        if self.discovery_interval.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "discovery_interval must be non-zero",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(MonitorError::InvalidConfig("request_timeout must be non-zero"));
        }
        if self.target_peers == 0 {
            return Err(MonitorError::InvalidConfig("target_peers must be non-zero"));
        }
        Ok(())
    }
}

fn default_check_interval() -> Duration {
    DEFAULT_CHECK_INTERVAL
}

fn default_discovery_interval() -> Duration {
    DEFAULT_DISCOVERY_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_target_peers() -> usize {
    DEFAULT_TARGET_PEERS
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*d))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerMonitorConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(5));
        assert_eq!(config.discovery_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.target_peers, DEFAULT_TARGET_PEERS);
        assert!(config.seeds.is_empty());
        assert!(!config.blacklist_incompatible);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PeerMonitorConfig::from_toml_str("").unwrap();
        assert_eq!(config, PeerMonitorConfig::default());
    }

    #[test]
    fn test_parse_toml() {
        let config = PeerMonitorConfig::from_toml_str(
            r#"
            check_interval = "2s"
            discovery_interval = "1m 30s"
            request_timeout = "750ms"
            max_attempts = 4
            target_peers = 8
            seeds = ["1.2.3.4:13802", "[2001:db8::1]:13802"]
            blacklist_incompatible = true
            "#,
        )
        .unwrap();

        assert_eq!(config.check_interval, Duration::from_secs(2));
        assert_eq!(config.discovery_interval, Duration::from_secs(90));
        assert_eq!(config.request_timeout, Duration::from_millis(750));
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.target_peers, 8);
        assert_eq!(config.seeds.len(), 2);
        assert!(config.is_seed(&"1.2.3.4:13802".parse().unwrap()));
        assert!(config.blacklist_incompatible);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = PeerMonitorConfig::default()
            .with_check_interval(Duration::from_millis(1500))
            .with_seeds(["5.6.7.8:1".parse().unwrap()]);
        let encoded = toml::to_string(&config).unwrap();
        assert!(encoded.contains("1s 500ms"));
        assert_eq!(PeerMonitorConfig::from_toml_str(&encoded).unwrap(), config);
    }

    #[test]
    fn test_rejects_invalid() {
        assert_matches!(
            PeerMonitorConfig::from_toml_str("check_interval = \"0s\""),
            Err(MonitorError::InvalidConfig(_))
        );
        assert_matches!(
            PeerMonitorConfig::from_toml_str("request_timeout = \"0s\""),
            Err(MonitorError::InvalidConfig(_))
        );
        assert_matches!(
            PeerMonitorConfig::from_toml_str("target_peers = 0"),
            Err(MonitorError::InvalidConfig(_))
        );
        assert_matches!(
            PeerMonitorConfig::from_toml_str("check_interval = \"soon\""),
            Err(MonitorError::Toml(_))
        );
        assert_matches!(
            PeerMonitorConfig::from_toml_str("seeds = [\"not-an-addr\"]"),
            Err(MonitorError::Toml(_))
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_peers = 3").unwrap();
        let config = PeerMonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.target_peers, 3);

        assert_matches!(
            PeerMonitorConfig::load(file.path().with_extension("missing")),
            Err(MonitorError::Io(_))
        );
    }
}
