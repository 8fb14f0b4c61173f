//! Routes delivered by BGP/XMPP peers for a routing VRF.
//!
//! A route whose next-hop address is not this router is installed as a
//! VXLAN tunnel path. A route pointing back at this router re-uses the
//! local export path of the same prefix.

use log::debug;
use vxlan_oper_db::{NextHop, Peer, RouteKey, TableId, TunnelNextHop};
use vxlan_types::{IpAddress, IpPrefix};

use super::classifier::{find_local_vm_port_path, init_nh_request, is_external_type5, local_vm_export_interface, nb_compute_mac};
use super::manager::RoutingManager;
use super::types::{Result, RouteParameters, RoutingError};

/// Extracts the IP prefix of a component string. IPv4 prefixes may carry
/// a leading route descriptor such as `5-0:0-0-`.
fn parse_component_prefix(prefix_str: &str) -> Result<IpPrefix> {
    let trimmed = if prefix_str.contains('.') {
        prefix_str
            .rsplit(|c| c == ':' || c == '-' || c == ',')
            .next()
            .unwrap_or(prefix_str)
    } else {
        prefix_str
    };
    trimmed
        .parse()
        .map_err(|e| RoutingError::MalformedInput(format!("prefix '{}': {}", prefix_str, e)))
}

impl RoutingManager {
    fn is_tunnel(&self, params: &RouteParameters) -> bool {
        params.nh_addr() != Some(&IpAddress::V4(self.db.router_id()))
    }

    /// VXLAN tunnel next hop for the route's endpoints; a composite when
    /// there are several.
    fn tunnel_nexthop(&self, params: &RouteParameters) -> Result<NextHop> {
        let mut tunnels = Vec::with_capacity(params.nh_addresses.len());
        for addr in &params.nh_addresses {
            let Some(dip) = addr.as_ipv4() else {
                return Err(RoutingError::MalformedInput(format!(
                    "tunnel endpoint {} is not IPv4",
                    addr
                )));
            };
            let dmac = if params.nh_mac.is_zero() {
                nb_compute_mac(&self.db, *dip)
            } else {
                params.nh_mac
            };
            tunnels.push(NextHop::Tunnel(TunnelNextHop::new(*dip).with_dmac(dmac)));
        }
        match tunnels.len() {
            0 => Err(RoutingError::MalformedInput("route without next-hop address".to_string())),
            1 => Ok(tunnels.swap_remove(0)),
            _ => Ok(NextHop::Composite(tunnels)),
        }
    }

    /// Installs a remote EVPN Type-5 route delivered by `peer`. External
    /// tunnel routes are also installed in the Inet table since external
    /// routers only advertise them as EVPN. A route that cannot be
    /// installed is dropped and counted.
    pub fn xmpp_advertise_evpn_route(
        &self,
        prefix: &IpPrefix,
        vxlan_id: u32,
        vrf_name: &str,
        params: &RouteParameters,
        peer: &Peer,
    ) {
        let result = self.import_evpn_route(prefix, vxlan_id, vrf_name, params, peer);
        self.isolate("xmpp_advertise_evpn_route", result);
    }

    /// Installs a remote Inet route delivered by `peer`. A route that
    /// cannot be installed is dropped and counted.
    pub fn xmpp_import_inet_route(
        &self,
        prefix: &IpPrefix,
        vxlan_id: u32,
        vrf_name: &str,
        params: &RouteParameters,
        peer: &Peer,
    ) {
        let result = self.import_inet_route(prefix, vxlan_id, vrf_name, params, peer);
        self.isolate("xmpp_import_inet_route", result);
    }

    fn import_evpn_route(
        &self,
        prefix: &IpPrefix,
        vxlan_id: u32,
        vrf_name: &str,
        params: &RouteParameters,
        peer: &Peer,
    ) -> Result<()> {
        let evpn = TableId::evpn(vrf_name);
        if !self.db.table_exists(&evpn) {
            return Ok(());
        }

        if self.is_tunnel(params) {
            let path = params.to_path(peer.clone(), self.tunnel_nexthop(params)?, vxlan_id);
            debug!("RoutingManager: import tunnel {} into {} from {}", prefix, evpn, peer.name());
            self.db.add_route(evpn, RouteKey::type5(*prefix), path.clone());
            if is_external_type5(&self.db, &params.nh_addresses) {
                self.db
                    .add_route(TableId::inet_for(vrf_name, prefix), RouteKey::Inet(*prefix), path);
            }
            return Ok(());
        }

        let Some(entry) = self.db.find_route(&evpn, &RouteKey::type5(*prefix)) else {
            return Ok(());
        };
        let Some(path) = local_vm_export_interface(&entry) else {
            return Ok(());
        };
        self.copy_interface_path_to_evpn_table(&self.db, path, prefix, peer, params, vrf_name)
    }

    fn import_inet_route(
        &self,
        prefix: &IpPrefix,
        vxlan_id: u32,
        vrf_name: &str,
        params: &RouteParameters,
        peer: &Peer,
    ) -> Result<()> {
        let inet = TableId::inet_for(vrf_name, prefix);
        if !self.db.table_exists(&inet) {
            return Ok(());
        }

        if self.is_tunnel(params) {
            let path = params.to_path(peer.clone(), self.tunnel_nexthop(params)?, vxlan_id);
            self.db.add_route(inet, RouteKey::Inet(*prefix), path);
            return Ok(());
        }

        let Some(entry) = self.db.find_route(&inet, &RouteKey::Inet(*prefix)) else {
            return Ok(());
        };
        let Some(path) = local_vm_export_interface(&entry) else {
            return Ok(());
        };
        let nexthop = init_nh_request(&path.nexthop, vrf_name)?;
        self.db
            .add_route(inet, RouteKey::Inet(*prefix), params.to_path(peer.clone(), nexthop, vxlan_id));
        Ok(())
    }

    /// Removes what `peer` delivered for `prefix` in both tables.
    pub fn xmpp_withdraw_route(&self, vrf_name: &str, prefix: &IpPrefix, peer: &Peer) {
        self.db
            .delete_route(TableId::evpn(vrf_name), RouteKey::type5(*prefix), peer.clone());
        self.db
            .delete_route(TableId::inet_for(vrf_name, prefix), RouteKey::Inet(*prefix), peer.clone());
    }

    /// Appends the local interfaces reaching `prefix_str` in `vrf_name` to
    /// `components`. A composite contributes all of its members.
    pub fn add_interface_component_to_list(
        &self,
        prefix_str: &str,
        vrf_name: &str,
        components: &mut Vec<NextHop>,
    ) -> Result<()> {
        let prefix = parse_component_prefix(prefix_str)?;
        let entry = self
            .db
            .find_route(&TableId::evpn(vrf_name), &RouteKey::type5(prefix))
            .or_else(|| {
                self.db
                    .find_route(&TableId::inet_for(vrf_name, &prefix), &RouteKey::Inet(prefix))
            });
        let Some(entry) = entry else {
            return Ok(());
        };

        let path = find_local_vm_port_path(&entry).or_else(|| local_vm_export_interface(&entry));
        match path.map(|p| &p.nexthop) {
            Some(nh @ NextHop::Interface(_)) => components.push(nh.clone()),
            Some(NextHop::Composite(members)) => components.extend(members.iter().cloned()),
            _ => {}
        }
        Ok(())
    }

    /// Composite of the local interfaces behind `prefixes`. Malformed
    /// prefixes are dropped and counted.
    pub fn composite_from_prefixes(&self, prefixes: &[String], vrf_name: &str) -> Option<NextHop> {
        let mut components = Vec::new();
        for prefix in prefixes {
            let result = self.add_interface_component_to_list(prefix, vrf_name, &mut components);
            self.isolate("add_interface_component_to_list", result);
        }
        (!components.is_empty()).then_some(NextHop::Composite(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::NoOpAdvertiser;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;
    use vxlan_oper_db::{AgentPath, OperDb, OperDbConfig, PeerType, VnEntry, VrfEntry};
    use vxlan_types::Ipv4Address;

    fn setup() -> (Arc<OperDb>, Arc<RoutingManager>) {
        let db = Arc::new(OperDb::new(OperDbConfig::default()));
        let manager = RoutingManager::new(Arc::clone(&db), Arc::new(NoOpAdvertiser));
        manager.register();
        db.add_vrf(VrfEntry::new(db.fabric_policy_vrf_name()));
        db.add_vrf(VrfEntry::new("vrf-r").with_vn("vn-r"));
        db.add_vn(VnEntry::new("vn-r").with_vrf("vrf-r").routing_for(Uuid::new_v4()));
        db.process();
        (db, manager)
    }

    fn bgp_peer() -> Peer {
        Peer::new("bgp-1", PeerType::Bgp)
    }

    #[test]
    fn test_parse_component_prefix() {
        assert_eq!(
            parse_component_prefix("5-0:0-0-1.1.1.10/32").unwrap(),
            "1.1.1.10/32".parse().unwrap()
        );
        assert_eq!(parse_component_prefix("1.1.1.10/32").unwrap(), "1.1.1.10/32".parse().unwrap());
        assert_eq!(
            parse_component_prefix("2001:db8::10/128").unwrap(),
            "2001:db8::10/128".parse().unwrap()
        );
        assert!(matches!(
            parse_component_prefix("not-a-prefix"),
            Err(RoutingError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_external_tunnel_route_lands_in_both_tables() {
        let (db, manager) = setup();
        let prefix: IpPrefix = "8.8.8.0/24".parse().unwrap();
        let params = RouteParameters::default()
            .with_nh_addresses(vec![IpAddress::V4(Ipv4Address::new(192, 168, 100, 1))]);

        manager
            .xmpp_advertise_evpn_route(&prefix, 5000, "vrf-r", &params, &bgp_peer());
        db.process();

        let evpn = db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).unwrap();
        let path = evpn.find_path(&bgp_peer()).unwrap();
        assert_eq!(path.vxlan_id, 5000);
        assert!(matches!(path.nexthop, NextHop::Tunnel(_)));

        let inet = db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(prefix)).unwrap();
        assert!(inet.find_path(&bgp_peer()).is_some());

        manager.xmpp_withdraw_route("vrf-r", &prefix, &bgp_peer());
        db.process();
        assert!(db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).is_none());
    }

    #[test]
    fn test_cluster_tunnel_route_only_in_evpn() {
        let (db, manager) = setup();
        let compute = Ipv4Address::new(10, 0, 0, 2);
        db.add_route(
            TableId::inet4(db.fabric_policy_vrf_name()),
            RouteKey::Inet(IpPrefix::host(IpAddress::V4(compute))),
            AgentPath::new(
                bgp_peer(),
                NextHop::Tunnel(TunnelNextHop::new(compute).with_dmac("00:11:22:33:44:55".parse().unwrap())),
            ),
        );
        db.process();

        let prefix: IpPrefix = "3.3.3.0/24".parse().unwrap();
        let params = RouteParameters::default().with_nh_addresses(vec![IpAddress::V4(compute)]);
        manager
            .xmpp_advertise_evpn_route(&prefix, 5000, "vrf-r", &params, &bgp_peer());
        db.process();

        let evpn = db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).unwrap();
        match &evpn.find_path(&bgp_peer()).unwrap().nexthop {
            NextHop::Tunnel(tunnel) => assert_eq!(tunnel.dmac.to_string(), "00:11:22:33:44:55"),
            other => panic!("unexpected next hop {:?}", other),
        }
        // The routing Inet copy comes from the backward leg, not the import.
        let inet = db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(prefix)).unwrap();
        assert!(inet.find_path(&bgp_peer()).is_none());
        assert!(inet.find_path(&manager.peers().vxlan_bgp).is_some());
    }

    #[test]
    fn test_route_without_next_hop_is_malformed() {
        let (db, manager) = setup();
        let prefix: IpPrefix = "8.8.8.0/24".parse().unwrap();
        manager.xmpp_advertise_evpn_route(&prefix, 5000, "vrf-r", &RouteParameters::default(), &bgp_peer());
        db.process();

        assert_eq!(manager.stats().malformed_inputs, 1);
        assert!(db.find_route(&TableId::evpn("vrf-r"), &RouteKey::type5(prefix)).is_none());
    }

    #[test]
    fn test_ipv6_tunnel_endpoint_is_malformed() {
        let (db, manager) = setup();
        let prefix: IpPrefix = "8.8.8.0/24".parse().unwrap();
        let params = RouteParameters::default().with_nh_addresses(vec!["2001:db8::1".parse().unwrap()]);
        manager.xmpp_import_inet_route(&prefix, 5000, "vrf-r", &params, &bgp_peer());
        db.process();

        assert_eq!(manager.stats().malformed_inputs, 1);
        assert!(db.find_route(&TableId::inet4("vrf-r"), &RouteKey::Inet(prefix)).is_none());
        assert_eq!(manager.stats().invariant_violations, 0);
    }

    #[test]
    fn test_composite_from_prefixes_counts_malformed() {
        let (db, manager) = setup();
        let prefix: IpPrefix = "1.1.1.10/32".parse().unwrap();
        db.add_route(
            TableId::evpn("vrf-r"),
            RouteKey::type5(prefix),
            AgentPath::new(manager.peers().export.clone(), NextHop::interface("tap1")),
        );
        db.process();

        let composite = manager
            .composite_from_prefixes(&["1.1.1.10/32".to_string(), "garbage".to_string()], "vrf-r")
            .unwrap();
        assert_eq!(composite, NextHop::Composite(vec![NextHop::interface("tap1")]));
        assert_eq!(manager.stats().malformed_inputs, 1);

        assert!(manager.composite_from_prefixes(&["9.9.9.9/32".to_string()], "vrf-r").is_none());
    }
}
