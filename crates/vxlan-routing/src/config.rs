//! Configuration for vxlan-routingd.
//!
//! Loaded from a JSON file. Every field has a default, so an empty object
//! (or a missing file) yields a working standalone daemon.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use vxlan_oper_db::{AgentPath, OperDb, OperDbConfig, RouteKey, TableId, VmInterface, VnEntry, VrfEntry};
use vxlan_types::{IpAddress, IpPrefix};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// A route installed at startup. `evpn` selects the VRF's EVPN Type-5
/// table instead of its Inet table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRoute {
    pub vrf: String,
    pub prefix: IpPrefix,
    #[serde(default)]
    pub evpn: bool,
    pub path: AgentPath,
}

/// Objects and routes loaded into the operational database at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub vrfs: Vec<VrfEntry>,
    #[serde(default)]
    pub vns: Vec<VnEntry>,
    #[serde(default)]
    pub interfaces: Vec<VmInterface>,
    #[serde(default)]
    pub routes: Vec<SeedRoute>,
    /// Addresses registered as BGP-as-a-Service sessions.
    #[serde(default)]
    pub bgp_as_a_service: Vec<IpAddress>,
}

impl SeedConfig {
    pub fn is_empty(&self) -> bool {
        self.vrfs.is_empty()
            && self.vns.is_empty()
            && self.interfaces.is_empty()
            && self.routes.is_empty()
            && self.bgp_as_a_service.is_empty()
    }

    /// Queues the seed on `db`: VRFs first so that their tables exist for
    /// the routes, then VNs, interfaces and routes.
    pub fn apply(&self, db: &OperDb) {
        for addr in &self.bgp_as_a_service {
            db.add_bgp_as_a_service(*addr);
        }
        for vrf in &self.vrfs {
            db.add_vrf(vrf.clone());
        }
        for vn in &self.vns {
            db.add_vn(vn.clone());
        }
        for intf in &self.interfaces {
            db.add_interface(intf.clone());
        }
        for route in &self.routes {
            let (table, key) = if route.evpn {
                (TableId::evpn(&route.vrf), RouteKey::type5(route.prefix))
            } else {
                (TableId::inet_for(&route.vrf, &route.prefix), RouteKey::Inet(route.prefix))
            };
            db.add_route(table, key, route.path.clone());
        }
    }
}

/// Complete vxlan-routingd configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Fabric VRF names and router id.
    #[serde(default)]
    pub db: OperDbConfig,

    /// Interval between two queue drains, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Requests applied per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval between two introspection dumps; 0 disables them.
    #[serde(default = "default_dump_interval_secs")]
    pub dump_interval_secs: u64,

    #[serde(default)]
    pub seed: SeedConfig,
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_batch_size() -> usize {
    256
}

fn default_dump_interval_secs() -> u64 {
    60
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            db: OperDbConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            batch_size: default_batch_size(),
            dump_interval_secs: default_dump_interval_secs(),
            seed: SeedConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// Loads and validates the configuration at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file), falling back to defaults when
    /// the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::from_file(&path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "vxlan-routingd: config file {} not found, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// `None` when periodic dumps are disabled.
    pub fn dump_interval(&self) -> Option<Duration> {
        (self.dump_interval_secs > 0).then(|| Duration::from_secs(self.dump_interval_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if self.db.fabric_vrf == self.db.fabric_policy_vrf {
            return Err(ConfigError::Invalid(
                "fabric_vrf and fabric_policy_vrf must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use vxlan_oper_db::{NextHop, Peer, PeerType};
    use vxlan_types::Ipv4Address;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = RoutingConfig::default();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.dump_interval(), Some(Duration::from_secs(60)));
        assert!(config.seed.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let file = write_config("{}");
        let config = RoutingConfig::from_file(file.path()).unwrap();
        assert_eq!(config, RoutingConfig::default());
    }

    #[test]
    fn test_load_with_seed() {
        let file = write_config(
            r#"{
                "db": { "router_id": "10.0.0.1" },
                "tick_interval_ms": 50,
                "dump_interval_secs": 0,
                "seed": {
                    "vrfs": [ { "name": "vrf-r", "vn": "vn-r", "vxlan_id": 5000 } ],
                    "vns": [ { "name": "vn-r", "vrf": "vrf-r", "vxlan_routing_vn": true,
                               "logical_router": "5f0c1a3e-8c5e-4f7a-9d9b-0c6c1c2f1e11" } ],
                    "routes": [ {
                        "vrf": "vrf-r",
                        "prefix": "8.8.8.0/24",
                        "evpn": true,
                        "path": {
                            "peer": { "name": "bgp-1", "peer_type": "bgp" },
                            "nexthop": { "tunnel": { "dip": "192.168.100.1" } },
                            "vxlan_id": 5000
                        }
                    } ],
                    "bgp_as_a_service": [ "9.9.9.9" ]
                }
            }"#,
        );
        let config = RoutingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.db.router_id, Ipv4Address::new(10, 0, 0, 1));
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.dump_interval(), None);
        assert_eq!(config.seed.vrfs[0].vxlan_id, 5000);
        assert!(config.seed.vns[0].vxlan_routing_vn);

        let route = &config.seed.routes[0];
        assert_eq!(route.path.peer, Peer::new("bgp-1", PeerType::Bgp));
        assert_eq!(route.path.nexthop, NextHop::tunnel(Ipv4Address::new(192, 168, 100, 1)));

        let db = OperDb::new(config.db.clone());
        config.seed.apply(&db);
        db.process();
        assert!(db.vrf("vrf-r").is_some());
        assert!(db
            .find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(route.prefix))
            .is_some());
        assert!(db.is_bgp_as_a_service(&"9.9.9.9".parse().unwrap()));
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("{ not json");
        assert!(matches!(
            RoutingConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_batch_size() {
        let file = write_config(r#"{ "batch_size": 0 }"#);
        assert!(matches!(
            RoutingConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoutingConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, RoutingConfig::default());

        assert!(matches!(
            RoutingConfig::from_file(dir.path().join("absent.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
