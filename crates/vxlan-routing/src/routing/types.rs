//! Routing engine types and data structures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;
use vxlan_oper_db::{AgentPath, DbError, EcmpLoadBalance, NextHop, PathPreference, Peer, PeerType};
use vxlan_types::{IpAddress, MacAddress};

/// Logical router identifier.
pub type LogicalRouterId = Uuid;

/// Error type for routing engine operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// A state the engine never produces was observed, e.g. an unexpected
    /// next-hop kind on an exported path.
    #[error("internal invariant violation in {context}: {detail}")]
    InternalInvariantViolation { context: &'static str, detail: String },

    /// Externally supplied data could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

impl RoutingError {
    pub fn invariant(context: &'static str, detail: impl Into<String>) -> Self {
        RoutingError::InternalInvariantViolation {
            context,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// The three synthetic peers owning engine-originated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticPeers {
    /// Owns bridge paths exported into a routing VRF.
    pub export: Peer,
    /// Owns BGP-learned routes re-synthesized into the routing Inet table.
    pub vxlan_bgp: Peer,
    /// Owns VRF-indirection paths fanned out into bridge VRFs.
    pub routing: Peer,
}

impl Default for SyntheticPeers {
    fn default() -> Self {
        Self {
            export: Peer::new("local_vm_export", PeerType::LocalVmExport),
            vxlan_bgp: Peer::new("vxlan_bgp", PeerType::VxlanBgp),
            routing: Peer::new("evpn_routing", PeerType::EvpnRouting),
        }
    }
}

impl SyntheticPeers {
    /// Returns true if `peer` is one of the synthetic peers.
    pub fn owns(&self, peer: &Peer) -> bool {
        peer == &self.export || peer == &self.vxlan_bgp || peer == &self.routing
    }
}

/// Path attributes carried from a source path to its leaked copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParameters {
    /// Next-hop addresses of remote routes (first one is the tunnel endpoint).
    pub nh_addresses: Vec<IpAddress>,
    pub nh_mac: MacAddress,
    pub dest_vns: BTreeSet<String>,
    pub sg_list: Vec<u32>,
    pub communities: Vec<String>,
    pub tags: Vec<u32>,
    pub preference: PathPreference,
    pub ecmp_load_balance: EcmpLoadBalance,
    pub sequence_number: u64,
}

impl RouteParameters {
    /// Copies the attributes of `path`.
    pub fn from_path(path: &AgentPath) -> Self {
        Self {
            nh_addresses: Vec::new(),
            nh_mac: MacAddress::ZERO,
            dest_vns: path.dest_vns.clone(),
            sg_list: path.sg_list.clone(),
            communities: path.communities.clone(),
            tags: path.tags.clone(),
            preference: path.preference,
            ecmp_load_balance: path.ecmp_load_balance,
            sequence_number: path.sequence_number,
        }
    }

    pub fn with_nh_addresses(mut self, nh_addresses: Vec<IpAddress>) -> Self {
        self.nh_addresses = nh_addresses;
        self
    }

    pub fn with_nh_mac(mut self, nh_mac: MacAddress) -> Self {
        self.nh_mac = nh_mac;
        self
    }

    pub fn with_dest_vns(mut self, dest_vns: BTreeSet<String>) -> Self {
        self.dest_vns = dest_vns;
        self
    }

    pub fn with_preference(mut self, preference: PathPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn nh_addr(&self) -> Option<&IpAddress> {
        self.nh_addresses.first()
    }

    /// Builds a path owned by `peer` carrying these attributes.
    pub fn to_path(&self, peer: Peer, nexthop: NextHop, vxlan_id: u32) -> AgentPath {
        AgentPath {
            peer,
            nexthop,
            dest_vns: self.dest_vns.clone(),
            sg_list: self.sg_list.clone(),
            communities: self.communities.clone(),
            tags: self.tags.clone(),
            preference: self.preference,
            ecmp_load_balance: self.ecmp_load_balance,
            vxlan_id,
            origin_vn: None,
            sequence_number: self.sequence_number,
        }
    }
}

/// Counters of the routing engine.
#[derive(Debug, Default)]
pub struct RoutingStats {
    pub notifications: AtomicU64,
    pub routes_leaked: AtomicU64,
    pub routes_withdrawn: AtomicU64,
    pub fanout_adds: AtomicU64,
    pub fanout_deletes: AtomicU64,
    pub walks_started: AtomicU64,
    pub walks_coalesced: AtomicU64,
    pub malformed_inputs: AtomicU64,
    pub invariant_violations: AtomicU64,
    pub advertise_failures: AtomicU64,
}

impl RoutingStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RoutingStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RoutingStatsSnapshot {
            notifications: load(&self.notifications),
            routes_leaked: load(&self.routes_leaked),
            routes_withdrawn: load(&self.routes_withdrawn),
            fanout_adds: load(&self.fanout_adds),
            fanout_deletes: load(&self.fanout_deletes),
            walks_started: load(&self.walks_started),
            walks_coalesced: load(&self.walks_coalesced),
            malformed_inputs: load(&self.malformed_inputs),
            invariant_violations: load(&self.invariant_violations),
            advertise_failures: load(&self.advertise_failures),
        }
    }
}

/// Point-in-time copy of [`RoutingStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStatsSnapshot {
    pub notifications: u64,
    pub routes_leaked: u64,
    pub routes_withdrawn: u64,
    pub fanout_adds: u64,
    pub fanout_deletes: u64,
    pub walks_started: u64,
    pub walks_coalesced: u64,
    pub malformed_inputs: u64,
    pub invariant_violations: u64,
    pub advertise_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_synthetic_peers_are_distinct() {
        let peers = SyntheticPeers::default();
        assert_ne!(peers.export, peers.vxlan_bgp);
        assert_ne!(peers.export, peers.routing);
        assert!(peers.owns(&peers.routing));
        assert!(!peers.owns(&Peer::new("bgp-1", PeerType::Bgp)));
    }

    #[test]
    fn test_route_parameters_to_path() {
        let source = AgentPath::new(Peer::new("tap1", PeerType::LocalVmPort), NextHop::interface("tap1"))
            .with_sg_list(vec![8000001])
            .with_tags(vec![5]);
        let params = RouteParameters::from_path(&source).with_dest_vns(BTreeSet::from(["vn-r".to_string()]));

        let peers = SyntheticPeers::default();
        let path = params.to_path(peers.export.clone(), NextHop::interface("tap1"), 5000);
        assert_eq!(path.peer, peers.export);
        assert_eq!(path.sg_list, vec![8000001]);
        assert_eq!(path.tags, vec![5]);
        assert_eq!(path.vxlan_id, 5000);
        assert_eq!(path.dest_vns.len(), 1);
        assert!(params.nh_addr().is_none());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = RoutingStats::default();
        RoutingStats::incr(&stats.routes_leaked);
        RoutingStats::incr(&stats.routes_leaked);
        RoutingStats::incr(&stats.walks_coalesced);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.routes_leaked, 2);
        assert_eq!(snapshot.walks_coalesced, 1);
        assert_eq!(snapshot.fanout_adds, 0);
    }
}
