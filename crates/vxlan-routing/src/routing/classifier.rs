//! Path and next-hop classification.
//!
//! Stateless helpers deciding how a route takes part in leaking: which of
//! its paths is the local export source, whether a next hop belongs to a
//! BGP-as-a-Service session, and whether a remote Type-5 route points
//! outside the local cluster.

use vxlan_oper_db::{AgentPath, NextHop, OperDb, PeerType, RouteEntry, RouteKey, TableId};
use vxlan_types::{IpAddress, IpPrefix, Ipv4Address, MacAddress};

use super::types::{Result, RoutingError};

/// Shape of a next hop as seen by the leak pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHopClass {
    Interface,
    /// Composite whose components are all interfaces.
    CompositeOfInterfaces,
    CompositeMixed,
    Tunnel,
    Vrf,
}

pub fn classify_nexthop(nh: &NextHop) -> NextHopClass {
    match nh {
        NextHop::Interface(_) => NextHopClass::Interface,
        NextHop::Composite(components) => {
            if !components.is_empty() && components.iter().all(|c| matches!(c, NextHop::Interface(_))) {
                NextHopClass::CompositeOfInterfaces
            } else {
                NextHopClass::CompositeMixed
            }
        }
        NextHop::Tunnel(_) => NextHopClass::Tunnel,
        NextHop::Vrf(_) => NextHopClass::Vrf,
    }
}

pub fn is_host_route(prefix: &IpPrefix) -> bool {
    prefix.is_host_route()
}

/// Composite match. `strict` requires every component to be an interface,
/// otherwise one interface component suffices.
pub fn is_interface_composite(nh: &NextHop, strict: bool) -> bool {
    let NextHop::Composite(components) = nh else {
        return false;
    };
    let is_interface = |c: &NextHop| matches!(c, NextHop::Interface(_));
    if strict {
        components.iter().all(is_interface)
    } else {
        components.iter().any(is_interface)
    }
}

fn is_interface_or_composite(nh: &NextHop, strict: bool) -> bool {
    matches!(nh, NextHop::Interface(_)) || is_interface_composite(nh, strict)
}

/// First path of `peer_type` whose next hop is an interface or an
/// interface composite.
pub fn find_interface_path(entry: &RouteEntry, peer_type: PeerType, strict: bool) -> Option<&AgentPath> {
    entry
        .paths()
        .iter()
        .find(|p| p.peer.peer_type() == peer_type && is_interface_or_composite(&p.nexthop, strict))
}

pub fn find_path_with_peer_type(entry: &RouteEntry, peer_type: PeerType) -> Option<&AgentPath> {
    entry.paths().iter().find(|p| p.peer.peer_type() == peer_type)
}

/// Local VM port path used as the source of the forward leg.
pub fn find_local_vm_port_path(entry: &RouteEntry) -> Option<&AgentPath> {
    find_interface_path(entry, PeerType::LocalVmPort, true)
}

/// Interface next hop with a label, on a VM interface whose primary address
/// is a BGP-as-a-Service endpoint.
pub fn is_bgpaas_interface(db: &OperDb, nh: &NextHop) -> bool {
    let NextHop::Interface(intf_nh) = nh else {
        return false;
    };
    if intf_nh.label.is_none() {
        return false;
    }
    let Some(intf) = db.interface(&intf_nh.interface) else {
        return false;
    };
    let ip4 = intf.primary_ip4.map(IpAddress::V4);
    let ip6 = intf.primary_ip6.map(IpAddress::V6);
    [ip4, ip6]
        .iter()
        .flatten()
        .any(|addr| db.is_bgp_as_a_service(addr))
}

/// A composite with at least one BGP-as-a-Service interface component.
pub fn is_bgpaas_composite(db: &OperDb, nh: &NextHop) -> bool {
    match nh {
        NextHop::Composite(components) => components.iter().any(|c| is_bgpaas_interface(db, c)),
        _ => false,
    }
}

/// A path learned from a BGP-as-a-Service session on a local interface.
pub fn find_bgpaas_path<'a>(db: &OperDb, entry: &'a RouteEntry) -> Option<&'a AgentPath> {
    let path = find_interface_path(entry, PeerType::Bgp, false)?;
    (is_bgpaas_interface(db, &path.nexthop) || is_bgpaas_composite(db, &path.nexthop)).then_some(path)
}

/// Export path of a routing VRF entry: a composite wins over an interface.
pub fn local_vm_export_interface(entry: &RouteEntry) -> Option<&AgentPath> {
    let mut found = None;
    for path in entry.paths() {
        if path.peer.peer_type() != PeerType::LocalVmExport {
            continue;
        }
        match path.nexthop {
            NextHop::Composite(_) => return Some(path),
            NextHop::Interface(_) => found = Some(path),
            _ => {}
        }
    }
    found
}

/// True if any tunnel endpoint does not resolve to its own host route in
/// the fabric policy VRF.
pub fn is_external_type5(db: &OperDb, nh_addresses: &[IpAddress]) -> bool {
    let table = TableId::inet4(db.fabric_policy_vrf_name());
    nh_addresses.iter().any(|addr| match db.find_lpm(&table, addr) {
        Some(entry) => !entry.prefix().is_host_route() || entry.address() != addr,
        None => true,
    })
}

/// MAC of a neighbouring compute node, taken from the BGP tunnel path of
/// its host route in the fabric policy VRF. Zero when unknown.
pub fn nb_compute_mac(db: &OperDb, compute_ip: Ipv4Address) -> MacAddress {
    let table = TableId::inet4(db.fabric_policy_vrf_name());
    let key = RouteKey::Inet(IpPrefix::host(IpAddress::V4(compute_ip)));
    db.find_route(&table, &key)
        .and_then(|entry| {
            entry.paths().iter().find_map(|p| match &p.nexthop {
                NextHop::Tunnel(tunnel) if p.peer.is_bgp() => Some(tunnel.dmac),
                _ => None,
            })
        })
        .unwrap_or(MacAddress::ZERO)
}

/// Re-issues a next hop for lookups in `vrf_name`.
///
/// Interfaces gain the VXLAN routing flag and the target VRF; composites
/// are copied. Any other kind cannot be the source of a leaked path.
pub fn init_nh_request(nh: &NextHop, vrf_name: &str) -> Result<NextHop> {
    match nh {
        NextHop::Interface(intf) => {
            let mut intf = intf.clone();
            intf.vxlan_routing = true;
            intf.vrf = Some(vrf_name.to_string());
            Ok(NextHop::Interface(intf))
        }
        NextHop::Composite(_) => Ok(nh.clone()),
        NextHop::Tunnel(_) | NextHop::Vrf(_) => Err(RoutingError::invariant(
            "init_nh_request",
            format!("unexpected next hop {} for vrf {}", nh, vrf_name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vxlan_oper_db::{InterfaceNextHop, OperDbConfig, Peer, TunnelNextHop, VmInterface, VrfEntry};

    fn tunnel(last: u8) -> NextHop {
        NextHop::tunnel(Ipv4Address::new(10, 0, 0, last))
    }

    fn fabric_db() -> OperDb {
        let db = OperDb::new(OperDbConfig::default());
        db.add_vrf(VrfEntry::new(db.fabric_policy_vrf_name()));
        db.process();
        db
    }

    #[test]
    fn test_classify_nexthop() {
        let intf = NextHop::interface("tap1");
        assert_eq!(classify_nexthop(&intf), NextHopClass::Interface);
        assert_eq!(
            classify_nexthop(&NextHop::Composite(vec![intf.clone(), NextHop::interface("tap2")])),
            NextHopClass::CompositeOfInterfaces
        );
        let mixed = NextHop::Composite(vec![intf.clone(), tunnel(2)]);
        assert_eq!(classify_nexthop(&mixed), NextHopClass::CompositeMixed);
        assert_eq!(classify_nexthop(&tunnel(2)), NextHopClass::Tunnel);
        assert_eq!(classify_nexthop(&NextHop::vrf("vrf-r")), NextHopClass::Vrf);
        assert_eq!(classify_nexthop(&NextHop::Composite(Vec::new())), NextHopClass::CompositeMixed);

        assert!(is_interface_composite(&mixed, false));
        assert!(!is_interface_composite(&mixed, true));
        assert!(!is_interface_composite(&intf, false));
    }

    #[test]
    fn test_host_route() {
        assert!(is_host_route(&"1.1.1.10/32".parse().unwrap()));
        assert!(is_host_route(&"2001:db8::10/128".parse().unwrap()));
        assert!(!is_host_route(&"1.1.1.0/24".parse().unwrap()));
        assert!(!is_host_route(&"2001:db8::/64".parse().unwrap()));
    }

    #[test]
    fn test_find_local_vm_port_path_skips_other_peers() {
        let entry = RouteEntry::new("vrf1", RouteKey::Inet("1.1.1.10/32".parse().unwrap()))
            .with_path(AgentPath::new(Peer::new("bgp-1", PeerType::Bgp), tunnel(2)))
            .with_path(AgentPath::new(
                Peer::new("tap1", PeerType::LocalVmPort),
                NextHop::interface("tap1"),
            ));
        let path = find_local_vm_port_path(&entry).unwrap();
        assert_eq!(path.peer.name(), "tap1");

        let remote_only = RouteEntry::new("vrf1", RouteKey::Inet("1.1.1.11/32".parse().unwrap()))
            .with_path(AgentPath::new(Peer::new("bgp-1", PeerType::Bgp), tunnel(2)));
        assert!(find_local_vm_port_path(&remote_only).is_none());
    }

    #[test]
    fn test_bgpaas_detection() {
        let db = OperDb::new(OperDbConfig::default());
        db.add_interface(VmInterface::vm_port("tap-bgp", "vn1", "vrf1").with_ip4(Ipv4Address::new(1, 1, 1, 5)));
        db.add_interface(VmInterface::vm_port("tap1", "vn1", "vrf1").with_ip4(Ipv4Address::new(1, 1, 1, 10)));
        db.add_bgp_as_a_service(IpAddress::V4(Ipv4Address::new(1, 1, 1, 5)));
        db.process();

        let labelled = NextHop::Interface(InterfaceNextHop::new("tap-bgp").with_label(30));
        let unlabelled = NextHop::interface("tap-bgp");
        let plain = NextHop::Interface(InterfaceNextHop::new("tap1").with_label(31));
        assert!(is_bgpaas_interface(&db, &labelled));
        assert!(!is_bgpaas_interface(&db, &unlabelled));
        assert!(!is_bgpaas_interface(&db, &plain));
        assert!(is_bgpaas_composite(&db, &NextHop::Composite(vec![plain.clone(), labelled.clone()])));

        let entry = RouteEntry::new("vrf1", RouteKey::Inet("8.8.8.0/24".parse().unwrap()))
            .with_path(AgentPath::new(Peer::new("bgpaas-1", PeerType::Bgp), labelled));
        assert!(find_bgpaas_path(&db, &entry).is_some());

        let not_bgpaas = RouteEntry::new("vrf1", RouteKey::Inet("8.8.8.0/24".parse().unwrap()))
            .with_path(AgentPath::new(Peer::new("bgpaas-1", PeerType::Bgp), plain));
        assert!(find_bgpaas_path(&db, &not_bgpaas).is_none());
    }

    #[test]
    fn test_local_vm_export_interface_prefers_composite() {
        let export = |name: &str, nh: NextHop| AgentPath::new(Peer::new(name, PeerType::LocalVmExport), nh);
        let entry = RouteEntry::new("vrf-r", RouteKey::type5("1.1.1.10/32".parse().unwrap()))
            .with_path(export("a", NextHop::interface("tap1")))
            .with_path(export("b", NextHop::Composite(vec![NextHop::interface("tap2")])));
        let path = local_vm_export_interface(&entry).unwrap();
        assert!(matches!(path.nexthop, NextHop::Composite(_)));
    }

    #[test]
    fn test_external_type5() {
        let db = fabric_db();
        let fabric = TableId::inet4(db.fabric_policy_vrf_name());
        let compute = Ipv4Address::new(10, 0, 0, 2);
        db.add_route(
            fabric.clone(),
            RouteKey::Inet(IpPrefix::host(IpAddress::V4(compute))),
            AgentPath::new(
                Peer::new("bgp-1", PeerType::Bgp),
                NextHop::Tunnel(TunnelNextHop::new(compute).with_dmac("00:11:22:33:44:55".parse().unwrap())),
            ),
        );
        db.add_route(
            fabric.clone(),
            RouteKey::Inet("10.0.0.0/8".parse().unwrap()),
            AgentPath::new(Peer::new("fabric", PeerType::Local), NextHop::interface("vhost0")),
        );
        db.add_route(
            fabric,
            RouteKey::Inet("10.1.0.0/16".parse().unwrap()),
            AgentPath::new(Peer::new("fabric", PeerType::Local), NextHop::interface("vhost0")),
        );
        db.process();

        assert!(!is_external_type5(&db, &[IpAddress::V4(compute)]));
        // Only covered by the /8, so outside the cluster.
        assert!(is_external_type5(&db, &["10.0.0.99".parse().unwrap()]));
        assert!(is_external_type5(&db, &["192.168.1.1".parse().unwrap()]));
        // A subnet starting at the endpoint is not a host resolution.
        assert!(is_external_type5(&db, &["10.1.0.0".parse().unwrap()]));

        assert_eq!(nb_compute_mac(&db, compute).to_string(), "00:11:22:33:44:55");
        assert!(nb_compute_mac(&db, Ipv4Address::new(10, 0, 0, 3)).is_zero());
    }

    #[test]
    fn test_init_nh_request() {
        let nh = init_nh_request(&NextHop::interface("tap1"), "vrf-r").unwrap();
        match nh {
            NextHop::Interface(intf) => {
                assert!(intf.vxlan_routing);
                assert_eq!(intf.vrf.as_deref(), Some("vrf-r"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let composite = NextHop::Composite(vec![NextHop::interface("tap1")]);
        assert_eq!(init_nh_request(&composite, "vrf-r").unwrap(), composite);

        let err = init_nh_request(&tunnel(2), "vrf-r").unwrap_err();
        assert!(matches!(err, RoutingError::InternalInvariantViolation { .. }));
    }
}
