//! Route leaking between bridge VRFs and the routing VRF.
//!
//! Forward leg: a local host route in a bridge Inet table is exported as an
//! EVPN Type-5 entry of the routing VRF. Backward leg: a routing Type-5
//! entry is copied into the routing Inet table and fanned out into the
//! bridge VRFs as a VRF next hop.

use log::{debug, warn};
use vxlan_oper_db::{AgentPath, NextHop, OperDb, Peer, PeerType, RouteEntry, RouteKey, TableId};
use vxlan_types::IpPrefix;

use super::classifier::{
    classify_nexthop, find_bgpaas_path, find_local_vm_port_path, find_path_with_peer_type, init_nh_request,
    is_interface_composite, NextHopClass,
};
use super::manager::RoutingManager;
use super::types::{LogicalRouterId, Result, RouteParameters, RoutingError, RoutingStats};

/// First interface of a next hop: the interface itself or the first
/// interface component of a composite.
fn first_interface(nh: &NextHop) -> Option<&str> {
    match nh {
        NextHop::Interface(intf) => Some(&intf.interface),
        NextHop::Composite(components) => components.iter().find_map(|c| match c {
            NextHop::Interface(intf) => Some(intf.interface.as_str()),
            _ => None,
        }),
        _ => None,
    }
}

fn vxlan_id_of(db: &OperDb, vrf_name: &str) -> u32 {
    db.vrf(vrf_name).map(|vrf| vrf.vxlan_id).unwrap_or(0)
}

impl RoutingManager {
    /// True if the path's interface sits in `bridge_vrf`.
    fn path_in_vrf(db: &OperDb, path: &AgentPath, bridge_vrf: &str) -> bool {
        first_interface(&path.nexthop)
            .and_then(|name| db.interface(name))
            .and_then(|intf| intf.vrf)
            .is_some_and(|vrf| vrf == bridge_vrf)
    }

    /// True if a path exported from a bridge (export peer or
    /// BGP-as-a-Service) points at an interface of `bridge_vrf`.
    pub(super) fn is_local_interface(&self, db: &OperDb, routing_entry: &RouteEntry, bridge_vrf: &str) -> bool {
        routing_entry
            .paths()
            .iter()
            .filter(|path| path.peer == self.peers.export || path.peer.is_bgp())
            .any(|path| Self::path_in_vrf(db, path, bridge_vrf))
    }

    /// Host route whose address lies in an IPAM subnet of one of the
    /// logical router's bridges. Such routes are already reachable through
    /// the subnet routes and are not fanned out.
    pub(super) fn is_host_route_from_local_subnet(&self, db: &OperDb, entry: &RouteEntry) -> bool {
        if !entry.prefix().is_host_route() {
            return false;
        }
        let bridges = {
            let state = self.state.lock();
            let Some(lr) = state.mapper.logical_router_of(db, entry) else {
                return false;
            };
            state.mapper.bridges(&lr)
        };
        let addr = entry.address();
        bridges
            .iter()
            .filter_map(|vn| db.vn(vn))
            .any(|vn| vn.ipams.iter().any(|ipam| ipam.subnet.contains(addr)))
    }

    /// Forward leg for a bridge Inet route.
    pub(super) fn inet_route_notify(&self, db: &OperDb, entry: &RouteEntry) -> Result<()> {
        let addr = entry.address();
        if addr.is_ipv6() && addr.is_link_local() {
            return Ok(());
        }

        let Some(routing_vrf) = self.routing_vrf_for_route(db, entry) else {
            return Ok(());
        };
        if routing_vrf == entry.vrf() || !db.table_exists(&TableId::evpn(&routing_vrf)) {
            return Ok(());
        }

        let local_path = if entry.is_deleted() {
            None
        } else {
            find_local_vm_port_path(entry)
        };

        let Some(local_path) = local_path else {
            if !entry.is_deleted() {
                if let Some(bgpaas_path) = find_bgpaas_path(db, entry) {
                    return self.advertise_bgpaas_route(db, entry.prefix(), bgpaas_path, &routing_vrf);
                }
            }
            self.clear_redundant_vrf_path(db, entry);
            self.when_bridge_inet_intf_was_deleted(db, entry, &routing_vrf);
            return Ok(());
        };

        let mut preference = local_path.preference;
        preference.loc_sequence = self.next_local_sequence();
        let dest_vns = db
            .vrf(&routing_vrf)
            .and_then(|vrf| vrf.vn)
            .into_iter()
            .collect();
        let params = RouteParameters::from_path(local_path)
            .with_preference(preference)
            .with_dest_vns(dest_vns);

        let export = self.peers.export.clone();
        self.copy_interface_path_to_evpn_table(db, local_path, entry.prefix(), &export, &params, &routing_vrf)
    }

    /// Exports a BGP-as-a-Service path under its own BGP peer.
    pub(super) fn advertise_bgpaas_route(
        &self,
        db: &OperDb,
        prefix: &IpPrefix,
        path: &AgentPath,
        routing_vrf: &str,
    ) -> Result<()> {
        let params = RouteParameters::from_path(path);
        let peer = path.peer.clone();
        self.copy_interface_path_to_evpn_table(db, path, prefix, &peer, &params, routing_vrf)
    }

    /// Writes a host route's interface path as a Type-5 entry of
    /// `routing_vrf`. Subnet routes are not exported.
    pub(super) fn copy_interface_path_to_evpn_table(
        &self,
        db: &OperDb,
        path: &AgentPath,
        prefix: &IpPrefix,
        peer: &Peer,
        params: &RouteParameters,
        routing_vrf: &str,
    ) -> Result<()> {
        if !prefix.is_host_route() {
            return Ok(());
        }

        let nexthop = init_nh_request(&path.nexthop, routing_vrf)?;
        let leaked = if peer.is_bgp() {
            AgentPath {
                peer: peer.clone(),
                nexthop,
                ..path.clone()
            }
        } else {
            params.to_path(peer.clone(), nexthop, vxlan_id_of(db, routing_vrf))
        };

        debug!(
            "RoutingManager: export {} into {} under {}",
            prefix,
            routing_vrf,
            peer.name()
        );
        db.add_route(TableId::evpn(routing_vrf), RouteKey::type5(*prefix), leaked);
        RoutingStats::incr(&self.stats.routes_leaked);
        Ok(())
    }

    /// Backward leg for a routing VRF EVPN entry.
    pub(super) fn evpn_route_notify(&self, db: &OperDb, entry: &RouteEntry) -> Result<()> {
        if !entry.is_type5() {
            return Ok(());
        }

        let (export_path, bgp_path) = if entry.is_deleted() {
            (None, None)
        } else {
            (
                entry.find_path(&self.peers.export),
                find_path_with_peer_type(entry, PeerType::Bgp),
            )
        };
        let lr = self.vn_of_vrf(db, entry.vrf()).and_then(|vn| vn.logical_router);

        if let Some(bgp_path) = bgp_path {
            let result = self.xmpp_advertise_inet_route(db, entry, bgp_path);
            self.isolate("xmpp_advertise_inet_route", result);
        }

        if let Some(export_path) = export_path {
            let params = RouteParameters::from_path(export_path);
            let export = self.peers.export.clone();
            let result =
                self.copy_path_to_inet_table(db, export_path, entry.prefix(), &export, &params, entry.vrf());
            self.isolate("copy_path_to_inet_table", result);
        }

        if bgp_path.is_none() {
            let vxlan_bgp = self.peers.vxlan_bgp.clone();
            self.when_routing_evpn_route_was_deleted(db, entry, &vxlan_bgp);
        }
        if export_path.is_none() {
            let export = self.peers.export.clone();
            self.when_routing_evpn_route_was_deleted(db, entry, &export);
        }

        if let Some(lr) = lr {
            self.leak_routes_into_bridge_tables(db, entry, lr, None, true)?;
        }
        Ok(())
    }

    /// Copies a routing Type-5 path into the routing VRF Inet table.
    pub(super) fn copy_path_to_inet_table(
        &self,
        db: &OperDb,
        path: &AgentPath,
        prefix: &IpPrefix,
        peer: &Peer,
        params: &RouteParameters,
        routing_vrf: &str,
    ) -> Result<()> {
        let interface_like = match classify_nexthop(&path.nexthop) {
            NextHopClass::Interface | NextHopClass::CompositeOfInterfaces => true,
            NextHopClass::CompositeMixed => is_interface_composite(&path.nexthop, false),
            NextHopClass::Tunnel | NextHopClass::Vrf => false,
        };
        if !prefix.is_host_route() && interface_like {
            return Ok(());
        }

        let nexthop = init_nh_request(&path.nexthop, routing_vrf)?;
        let mut copy = params.to_path(peer.clone(), nexthop, vxlan_id_of(db, routing_vrf));
        if peer.peer_type() != PeerType::VxlanBgp {
            copy.origin_vn = self.origin_vn(db, routing_vrf, prefix);
        }
        db.add_route(TableId::inet_for(routing_vrf, prefix), RouteKey::Inet(*prefix), copy);
        Ok(())
    }

    /// First bridge of the routing VRF's logical router holding an exact
    /// match for `prefix`.
    fn origin_vn(&self, db: &OperDb, routing_vrf: &str, prefix: &IpPrefix) -> Option<String> {
        let lr = self.vn_of_vrf(db, routing_vrf)?.logical_router?;
        let bridges = self.state.lock().mapper.bridges(&lr);
        bridges.into_iter().find(|vn| {
            db.vn(vn)
                .and_then(|vn| vn.vrf)
                .and_then(|vrf| db.find_route(&TableId::inet_for(vrf, prefix), &RouteKey::Inet(*prefix)))
                .is_some()
        })
    }

    /// Re-synthesizes a BGP-learned Type-5 route in the routing Inet table
    /// under the vxlan-bgp peer and advertises it.
    pub(super) fn xmpp_advertise_inet_route(&self, db: &OperDb, entry: &RouteEntry, bgp_path: &AgentPath) -> Result<()> {
        let routing_vrf = entry.vrf();
        let nexthop = match &bgp_path.nexthop {
            NextHop::Tunnel(_) | NextHop::Composite(_) => bgp_path.nexthop.clone(),
            NextHop::Interface(_) => init_nh_request(&bgp_path.nexthop, routing_vrf)?,
            NextHop::Vrf(target) => {
                return Err(RoutingError::invariant(
                    "xmpp_advertise_inet_route",
                    format!("VRF next hop {} on BGP path of {}", target, entry.prefix()),
                ))
            }
        };

        let prefix = *entry.prefix();
        let path = RouteParameters::from_path(bgp_path).to_path(
            self.peers.vxlan_bgp.clone(),
            nexthop,
            vxlan_id_of(db, routing_vrf),
        );
        db.add_route(TableId::inet_for(routing_vrf, &prefix), RouteKey::Inet(prefix), path.clone());

        if let Err(e) = self
            .advertiser
            .advertise(&self.peers.vxlan_bgp, routing_vrf, &prefix, &path)
        {
            RoutingStats::incr(&self.stats.advertise_failures);
            warn!("RoutingManager: advertise {} in {} failed: {}", prefix, routing_vrf, e);
        }
        Ok(())
    }

    /// Drops the VRF next-hop path of a bridge route that has other paths.
    pub(super) fn clear_redundant_vrf_path(&self, db: &OperDb, entry: &RouteEntry) {
        if entry.paths().len() > 1 && entry.find_path(&self.peers.routing).is_some() {
            db.delete_route(
                TableId::inet_for(entry.vrf(), entry.prefix()),
                entry.key().clone(),
                self.peers.routing.clone(),
            );
        }
    }

    /// A bridge route lost its local path: withdraw what it exported into
    /// the routing VRF.
    pub(super) fn when_bridge_inet_intf_was_deleted(&self, db: &OperDb, entry: &RouteEntry, routing_vrf: &str) {
        if entry.find_path(&self.peers.routing).is_some() {
            return;
        }

        let prefix = *entry.prefix();
        let evpn = TableId::evpn(routing_vrf);
        let Some(routing_entry) = db.find_route(&evpn, &RouteKey::type5(prefix)) else {
            if entry.is_deleted() && !prefix.is_host_route() {
                let vn = self.vn_of_vrf(db, entry.vrf());
                self.delete_ipam_routes(db, vn.as_ref(), entry.vrf(), &prefix);
            }
            return;
        };

        // BGP-as-a-Service copies of this bridge that lost their source.
        for path in routing_entry.paths() {
            if path.peer.is_bgp()
                && entry.find_path(&path.peer).is_none()
                && Self::path_in_vrf(db, path, entry.vrf())
            {
                db.delete_route(evpn.clone(), RouteKey::type5(prefix), path.peer.clone());
                RoutingStats::incr(&self.stats.routes_withdrawn);
            }
        }

        if entry.is_deleted() || routing_entry.find_path(&self.peers.export).is_some() {
            db.delete_route(evpn, RouteKey::type5(prefix), self.peers.export.clone());
            RoutingStats::incr(&self.stats.routes_withdrawn);
        }
    }

    /// Removes the `peer` copy of a routing Type-5 entry from the routing
    /// Inet table.
    pub(super) fn when_routing_evpn_route_was_deleted(&self, db: &OperDb, routing_entry: &RouteEntry, peer: &Peer) {
        if routing_entry.find_path(&self.peers.routing).is_some() {
            return;
        }

        let prefix = *routing_entry.prefix();
        let table = TableId::inet_for(routing_entry.vrf(), &prefix);
        let Some(inet_entry) = db.find_route(&table, &RouteKey::Inet(prefix)) else {
            return;
        };

        let had_path = inet_entry.find_path(peer).is_some();
        if !(routing_entry.is_deleted() || had_path) {
            return;
        }
        db.delete_route(table, RouteKey::Inet(prefix), peer.clone());

        if had_path && peer == &self.peers.vxlan_bgp {
            if let Err(e) = self.advertiser.withdraw(peer, routing_entry.vrf(), &prefix) {
                RoutingStats::incr(&self.stats.advertise_failures);
                warn!(
                    "RoutingManager: withdraw {} in {} failed: {}",
                    prefix,
                    routing_entry.vrf(),
                    e
                );
            }
        }
    }

    /// Fans a routing Type-5 entry out into the bridges of `lr` as a VRF
    /// next hop. With `update` and `vn` only that bridge is refreshed.
    pub(super) fn leak_routes_into_bridge_tables(
        &self,
        db: &OperDb,
        entry: &RouteEntry,
        lr: LogicalRouterId,
        vn: Option<&str>,
        update: bool,
    ) -> Result<()> {
        if !entry.is_type5() || self.vn_of_vrf(db, entry.vrf()).is_none() {
            return Ok(());
        }
        if self.is_host_route_from_local_subnet(db, entry) {
            return Ok(());
        }

        let (bridges, routing_vrf) = {
            let state = self.state.lock();
            let bridges = match (update, vn) {
                (true, Some(vn)) => vec![vn.to_string()],
                _ => state.mapper.bridges(&lr),
            };
            (bridges, state.mapper.routing_vrf_of(&lr).map(str::to_string))
        };

        let prefix = *entry.prefix();
        for bridge in bridges {
            let Some(bridge_vrf) = db.vn(&bridge).and_then(|vn| vn.vrf) else {
                continue;
            };
            if self.is_local_interface(db, entry, &bridge_vrf) {
                continue;
            }
            let table = TableId::inet_for(&bridge_vrf, &prefix);

            if entry.is_deleted() {
                db.delete_route(table, RouteKey::Inet(prefix), self.peers.routing.clone());
                RoutingStats::incr(&self.stats.fanout_deletes);
                continue;
            }

            let Some(active) = entry.active_path() else {
                continue;
            };
            let Some(routing_vrf) = routing_vrf.as_deref() else {
                return Ok(());
            };
            let path = RouteParameters::from_path(active).to_path(
                self.peers.routing.clone(),
                NextHop::vrf(routing_vrf),
                vxlan_id_of(db, routing_vrf),
            );
            db.add_route(table, RouteKey::Inet(prefix), path);
            RoutingStats::incr(&self.stats.fanout_adds);
        }
        Ok(())
    }

    /// Walk visitor for a bridge leaving its logical router: withdraws the
    /// Type-5 entries the bridge exported and its own VRF next-hop paths.
    pub(super) fn withdraw_from_routing_vrf(&self, db: &OperDb, entry: &RouteEntry, routing_vrf: &str) {
        let prefix = *entry.prefix();

        if prefix.is_host_route() {
            let evpn = TableId::evpn(routing_vrf);
            if let Some(routing_entry) = db.find_route(&evpn, &RouteKey::type5(prefix)) {
                for path in routing_entry.paths() {
                    let exported = path.peer == self.peers.export || path.peer.is_bgp();
                    if exported && Self::path_in_vrf(db, path, entry.vrf()) {
                        db.delete_route(evpn.clone(), RouteKey::type5(prefix), path.peer.clone());
                        RoutingStats::incr(&self.stats.routes_withdrawn);
                    }
                }
            }
        }

        if entry.find_path(&self.peers.routing).is_some() {
            db.delete_route(
                TableId::inet_for(entry.vrf(), &prefix),
                entry.key().clone(),
                self.peers.routing.clone(),
            );
            RoutingStats::incr(&self.stats.fanout_deletes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::NoOpAdvertiser;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;
    use vxlan_oper_db::{OperDbConfig, VmInterface, VnEntry, VrfEntry};
    use vxlan_types::Ipv4Address;

    struct Fixture {
        db: Arc<OperDb>,
        manager: Arc<RoutingManager>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(OperDb::new(OperDbConfig::default()));
        let manager = RoutingManager::new(Arc::clone(&db), Arc::new(NoOpAdvertiser));
        manager.register();

        let lr = Uuid::new_v4();
        db.add_vrf(VrfEntry::new("vrf-r").with_vn("vn-r").with_vxlan_id(5000));
        db.add_vrf(VrfEntry::new("vrf1").with_vn("vn1"));
        db.add_vn(VnEntry::new("vn-r").with_vrf("vrf-r").routing_for(lr));
        db.add_vn(VnEntry::new("vn1").with_vrf("vrf1").with_ipam("1.1.1.0/24".parse().unwrap()));
        db.add_interface(VmInterface::lr_port("lr-port-1", "vn1", lr));
        db.add_interface(VmInterface::vm_port("tap1", "vn1", "vrf1").with_ip4(Ipv4Address::new(1, 1, 1, 10)));
        db.process();
        Fixture { db, manager }
    }

    fn local_path(intf: &str) -> AgentPath {
        AgentPath::new(Peer::new(intf, PeerType::LocalVmPort), NextHop::interface(intf))
    }

    #[test]
    fn test_first_interface() {
        assert_eq!(first_interface(&NextHop::interface("tap1")), Some("tap1"));
        let composite = NextHop::Composite(vec![NextHop::tunnel(Ipv4Address::new(10, 0, 0, 2)), NextHop::interface("tap2")]);
        assert_eq!(first_interface(&composite), Some("tap2"));
        assert_eq!(first_interface(&NextHop::vrf("vrf-r")), None);
    }

    #[test]
    fn test_forward_leg_exports_host_route() {
        let f = fixture();
        let prefix: IpPrefix = "1.1.1.10/32".parse().unwrap();
        f.db.add_route(TableId::inet4("vrf1"), RouteKey::Inet(prefix), local_path("tap1"));
        f.db.process();

        let entry = f.db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).unwrap();
        let export = entry.find_path(&f.manager.peers.export).unwrap();
        assert_eq!(export.vxlan_id, 5000);
        assert!(export.dest_vns.contains("vn-r"));
        assert!(export.preference.loc_sequence > 0);
        match &export.nexthop {
            NextHop::Interface(intf) => {
                assert!(intf.vxlan_routing);
                assert_eq!(intf.vrf.as_deref(), Some("vrf-r"));
            }
            other => panic!("unexpected next hop {:?}", other),
        }

        // The routing Inet copy records the originating bridge.
        let inet = f.db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(prefix)).unwrap();
        let copy = inet.find_path(&f.manager.peers.export).unwrap();
        assert_eq!(copy.origin_vn.as_deref(), Some("vn1"));
    }

    #[test]
    fn test_subnet_interface_route_not_exported() {
        let f = fixture();
        let prefix: IpPrefix = "1.1.1.0/24".parse().unwrap();
        f.db.add_route(TableId::inet4("vrf1"), RouteKey::Inet(prefix), local_path("tap1"));
        f.db.process();

        assert!(f.db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).is_none());
    }

    #[test]
    fn test_interface_subnet_not_copied_to_routing_inet() {
        let f = fixture();
        let tunnel = |last| NextHop::tunnel(Ipv4Address::new(10, 0, 0, last));
        let mixed: IpPrefix = "5.5.5.0/24".parse().unwrap();
        let tunnels: IpPrefix = "6.6.6.0/24".parse().unwrap();
        f.db.add_route(
            TableId::evpn("vrf-r"),
            RouteKey::type5(mixed),
            AgentPath::new(
                f.manager.peers.export.clone(),
                NextHop::Composite(vec![tunnel(2), NextHop::interface("tap1")]),
            ),
        );
        f.db.add_route(
            TableId::evpn("vrf-r"),
            RouteKey::type5(tunnels),
            AgentPath::new(f.manager.peers.export.clone(), NextHop::Composite(vec![tunnel(2), tunnel(3)])),
        );
        f.db.process();

        assert!(f.db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(mixed)).is_none());
        let inet = f.db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(tunnels)).unwrap();
        assert!(inet.find_path(&f.manager.peers.export).is_some());
    }

    #[test]
    fn test_link_local_v6_ignored() {
        let f = fixture();
        let prefix: IpPrefix = "fe80::10/128".parse().unwrap();
        f.db.add_route(TableId::inet6("vrf1"), RouteKey::Inet(prefix), local_path("tap1"));
        f.db.process();

        assert_eq!(f.db.route_count(&TableId::evpn("vrf-r")), 0);
    }

    #[test]
    fn test_local_subnet_host_route_not_fanned_out() {
        let f = fixture();
        let prefix: IpPrefix = "1.1.1.10/32".parse().unwrap();
        f.db.add_route(TableId::inet4("vrf1"), RouteKey::Inet(prefix), local_path("tap1"));
        f.db.process();

        let entry = f.db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).unwrap();
        assert!(f.manager.is_host_route_from_local_subnet(&f.db, &entry));
        assert!(f.manager.is_local_interface(&f.db, &entry, "vrf1"));
        assert!(!f.manager.is_local_interface(&f.db, &entry, "vrf2"));

        let bridge = f.db.find_route(&TableId::inet4("vrf1"), &RouteKey::Inet(prefix)).unwrap();
        assert!(bridge.find_path(&f.manager.peers.routing).is_none());
    }

    #[test]
    fn test_vrf_next_hop_on_bgp_path_is_invariant_violation() {
        let f = fixture();
        let entry = RouteEntry::new("vrf-r", RouteKey::type5("8.8.8.0/24".parse().unwrap()));
        let path = AgentPath::new(Peer::new("bgp-1", PeerType::Bgp), NextHop::vrf("vrf-x"));

        let err = f.manager.xmpp_advertise_inet_route(&f.db, &entry, &path).unwrap_err();
        assert!(matches!(err, RoutingError::InternalInvariantViolation { .. }));
    }

    #[test]
    fn test_clear_redundant_vrf_path() {
        let f = fixture();
        let prefix: IpPrefix = "9.9.9.9/32".parse().unwrap();
        let table = TableId::inet4("vrf1");
        f.db.add_route(
            table.clone(),
            RouteKey::Inet(prefix),
            AgentPath::new(f.manager.peers.routing.clone(), NextHop::vrf("vrf-r")),
        );
        f.db.add_route(
            table.clone(),
            RouteKey::Inet(prefix),
            AgentPath::new(Peer::new("bgp-1", PeerType::Bgp), NextHop::tunnel(Ipv4Address::new(10, 0, 0, 2))),
        );
        f.db.process();

        let entry = f.db.find_route(&table, &RouteKey::Inet(prefix)).unwrap();
        f.manager.clear_redundant_vrf_path(&f.db, &entry);
        f.db.process();

        let entry = f.db.find_route(&table, &RouteKey::Inet(prefix)).unwrap();
        assert!(entry.find_path(&f.manager.peers.routing).is_none());
        assert_eq!(entry.paths().len(), 1);
    }
}
