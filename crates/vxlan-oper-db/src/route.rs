//! Route entries, paths, peers and next hops.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use vxlan_types::{IpAddress, IpPrefix, Ipv4Address, MacAddress};

use crate::table::TableKind;

/// Kind of the peer that contributed a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerType {
    /// Local VM port (interface) routes.
    LocalVmPort,
    /// Routes exported from a local interface into a routing VRF.
    LocalVmExport,
    /// Routes learned from a BGP/XMPP speaker.
    Bgp,
    /// Routes re-synthesized from BGP into a routing VRF Inet table.
    VxlanBgp,
    /// VRF-indirection routes fanned out among bridge VRFs.
    EvpnRouting,
    /// Agent-local routes (receive, subnet broadcast, fabric).
    Local,
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerType::LocalVmPort => "local_vm_port",
            PeerType::LocalVmExport => "local_vm_export",
            PeerType::Bgp => "bgp",
            PeerType::VxlanBgp => "vxlan_bgp",
            PeerType::EvpnRouting => "evpn_routing",
            PeerType::Local => "local",
        };
        f.write_str(name)
    }
}

/// Identity of a route contributor. Two peers are the same path owner iff
/// both the name and the type match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Peer {
    name: String,
    peer_type: PeerType,
}

impl Peer {
    pub fn new(name: impl Into<String>, peer_type: PeerType) -> Self {
        Self {
            name: name.into(),
            peer_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    pub fn is_bgp(&self) -> bool {
        self.peer_type == PeerType::Bgp
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.peer_type)
    }
}

/// Interface next hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceNextHop {
    /// Name of the VM interface.
    pub interface: String,
    /// MPLS label, present on interfaces reachable through the controller.
    #[serde(default)]
    pub label: Option<u32>,
    /// Set on next hops re-issued for routing VRF lookups.
    #[serde(default)]
    pub vxlan_routing: bool,
    /// VRF the next hop was re-issued for.
    #[serde(default)]
    pub vrf: Option<String>,
}

impl InterfaceNextHop {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            label: None,
            vxlan_routing: false,
            vrf: None,
        }
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }
}

/// VXLAN tunnel next hop towards another compute node or gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelNextHop {
    pub dip: Ipv4Address,
    #[serde(default)]
    pub dmac: MacAddress,
}

impl TunnelNextHop {
    pub fn new(dip: Ipv4Address) -> Self {
        Self {
            dip,
            dmac: MacAddress::ZERO,
        }
    }

    pub fn with_dmac(mut self, dmac: MacAddress) -> Self {
        self.dmac = dmac;
        self
    }
}

/// Next hop of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextHop {
    Interface(InterfaceNextHop),
    Composite(Vec<NextHop>),
    Tunnel(TunnelNextHop),
    /// Redirects the lookup into the named VRF.
    Vrf(String),
}

impl NextHop {
    pub fn interface(name: impl Into<String>) -> Self {
        NextHop::Interface(InterfaceNextHop::new(name))
    }

    pub fn tunnel(dip: Ipv4Address) -> Self {
        NextHop::Tunnel(TunnelNextHop::new(dip))
    }

    pub fn vrf(name: impl Into<String>) -> Self {
        NextHop::Vrf(name.into())
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHop::Interface(nh) => {
                write!(f, "interface:{}", nh.interface)?;
                if let Some(label) = nh.label {
                    write!(f, " label:{}", label)?;
                }
                if let Some(vrf) = &nh.vrf {
                    write!(f, " vrf:{}", vrf)?;
                }
                Ok(())
            }
            NextHop::Composite(components) => {
                write!(f, "composite[")?;
                for (i, nh) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", nh)?;
                }
                write!(f, "]")
            }
            NextHop::Tunnel(nh) => write!(f, "tunnel:{} dmac:{}", nh.dip, nh.dmac),
            NextHop::Vrf(name) => write!(f, "vrf:{}", name),
        }
    }
}

/// Path preference and ECMP ordering attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathPreference {
    pub sequence: u32,
    pub preference: u32,
    pub ecmp: bool,
    /// Local sequence used to order ECMP member convergence.
    pub loc_sequence: u32,
}

/// ECMP hashing fields. An all-false value means "use the global default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcmpLoadBalance {
    pub source_ip: bool,
    pub destination_ip: bool,
    pub ip_protocol: bool,
    pub source_port: bool,
    pub destination_port: bool,
}

/// One peer's contribution to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPath {
    pub peer: Peer,
    pub nexthop: NextHop,
    #[serde(default)]
    pub dest_vns: BTreeSet<String>,
    #[serde(default)]
    pub sg_list: Vec<u32>,
    #[serde(default)]
    pub communities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<u32>,
    #[serde(default)]
    pub preference: PathPreference,
    #[serde(default)]
    pub ecmp_load_balance: EcmpLoadBalance,
    #[serde(default)]
    pub vxlan_id: u32,
    #[serde(default)]
    pub origin_vn: Option<String>,
    #[serde(default)]
    pub sequence_number: u64,
}

impl AgentPath {
    pub fn new(peer: Peer, nexthop: NextHop) -> Self {
        Self {
            peer,
            nexthop,
            dest_vns: BTreeSet::new(),
            sg_list: Vec::new(),
            communities: Vec::new(),
            tags: Vec::new(),
            preference: PathPreference::default(),
            ecmp_load_balance: EcmpLoadBalance::default(),
            vxlan_id: 0,
            origin_vn: None,
            sequence_number: 0,
        }
    }

    pub fn with_dest_vn(mut self, vn: impl Into<String>) -> Self {
        self.dest_vns.insert(vn.into());
        self
    }

    pub fn with_sg_list(mut self, sg_list: Vec<u32>) -> Self {
        self.sg_list = sg_list;
        self
    }

    pub fn with_communities(mut self, communities: Vec<String>) -> Self {
        self.communities = communities;
        self
    }

    pub fn with_tags(mut self, tags: Vec<u32>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_preference(mut self, preference: PathPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_vxlan_id(mut self, vxlan_id: u32) -> Self {
        self.vxlan_id = vxlan_id;
        self
    }
}

/// Key of an EVPN route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvpnKey {
    pub mac: MacAddress,
    pub prefix: IpPrefix,
    pub ethernet_tag: u32,
}

impl EvpnKey {
    /// Type-5 (IP prefix) key: zero MAC, ethernet tag 0.
    pub fn type5(prefix: IpPrefix) -> Self {
        Self {
            mac: MacAddress::ZERO,
            prefix,
            ethernet_tag: 0,
        }
    }

    pub fn is_type5(&self) -> bool {
        self.mac.is_zero()
    }
}

/// Key of a route in an Inet or EVPN table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKey {
    Inet(IpPrefix),
    Evpn(EvpnKey),
}

impl RouteKey {
    pub fn type5(prefix: IpPrefix) -> Self {
        RouteKey::Evpn(EvpnKey::type5(prefix))
    }

    pub fn prefix(&self) -> &IpPrefix {
        match self {
            RouteKey::Inet(prefix) => prefix,
            RouteKey::Evpn(key) => &key.prefix,
        }
    }

    pub fn is_type5(&self) -> bool {
        matches!(self, RouteKey::Evpn(key) if key.is_type5())
    }

    /// Table kind this key is stored in.
    pub fn table_kind(&self) -> TableKind {
        match self {
            RouteKey::Evpn(_) => TableKind::Evpn,
            RouteKey::Inet(prefix) if prefix.is_ipv4() => TableKind::Inet4,
            RouteKey::Inet(_) => TableKind::Inet6,
        }
    }

    /// Clears host bits of the prefix so LPM lookups find the entry.
    pub(crate) fn normalized(&self) -> RouteKey {
        match self {
            RouteKey::Inet(prefix) => RouteKey::Inet(prefix.network()),
            RouteKey::Evpn(key) => RouteKey::Evpn(EvpnKey {
                prefix: key.prefix.network(),
                ..key.clone()
            }),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKey::Inet(prefix) => write!(f, "{}", prefix),
            RouteKey::Evpn(key) => write!(f, "{}-{}/{}", key.ethernet_tag, key.mac, key.prefix),
        }
    }
}

/// A route and the paths contributed to it by each peer.
///
/// Paths are kept ordered by preference (highest first); equal preferences
/// keep arrival order, so the first path is the active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    vrf: String,
    key: RouteKey,
    paths: Vec<AgentPath>,
    deleted: bool,
}

impl RouteEntry {
    pub fn new(vrf: impl Into<String>, key: RouteKey) -> Self {
        Self {
            vrf: vrf.into(),
            key: key.normalized(),
            paths: Vec::new(),
            deleted: false,
        }
    }

    /// Builder used when composing entries outside a table.
    pub fn with_path(mut self, path: AgentPath) -> Self {
        self.upsert_path(path);
        self
    }

    pub fn vrf(&self) -> &str {
        &self.vrf
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn prefix(&self) -> &IpPrefix {
        self.key.prefix()
    }

    pub fn address(&self) -> &IpAddress {
        self.key.prefix().address()
    }

    pub fn is_type5(&self) -> bool {
        self.key.is_type5()
    }

    pub fn paths(&self) -> &[AgentPath] {
        &self.paths
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn active_path(&self) -> Option<&AgentPath> {
        self.paths.first()
    }

    pub fn find_path(&self, peer: &Peer) -> Option<&AgentPath> {
        self.paths.iter().find(|p| &p.peer == peer)
    }

    /// Returns true if the path was added or its attributes changed.
    pub(crate) fn upsert_path(&mut self, path: AgentPath) -> bool {
        if let Some(pos) = self.paths.iter().position(|p| p.peer == path.peer) {
            if self.paths[pos] == path {
                return false;
            }
            self.paths.remove(pos);
        }
        let at = self
            .paths
            .iter()
            .position(|p| p.preference.preference < path.preference.preference)
            .unwrap_or(self.paths.len());
        self.paths.insert(at, path);
        true
    }

    pub(crate) fn remove_path(&mut self, peer: &Peer) -> bool {
        let before = self.paths.len();
        self.paths.retain(|p| &p.peer != peer);
        self.paths.len() != before
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}
