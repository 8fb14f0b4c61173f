//! IPAM subnet routes between sibling bridges.
//!
//! Every bridge of a logical router reaches the IPAM subnets of its
//! siblings through a VRF next hop into the routing VRF.

use log::debug;
use vxlan_oper_db::{AgentPath, NextHop, OperDb, RouteKey, TableId, VnEntry};
use vxlan_types::IpPrefix;

use super::manager::RoutingManager;
use super::types::{LogicalRouterId, RoutingStats};

impl RoutingManager {
    /// Sibling bridges of `vn` with their VRF names.
    fn sibling_bridges(&self, db: &OperDb, lr: &LogicalRouterId, vn: &str) -> Vec<(VnEntry, String)> {
        let (bridges, cached) = {
            let state = self.state.lock();
            let bridges = state.mapper.bridges(lr);
            let cached: Vec<Option<String>> = bridges
                .iter()
                .map(|b| state.mapper.bridge_vrf_name(lr, b).map(str::to_string))
                .collect();
            (bridges, cached)
        };

        bridges
            .into_iter()
            .zip(cached)
            .filter(|(bridge, _)| bridge != vn)
            .filter_map(|(bridge, cached)| {
                let entry = db.vn(&bridge)?;
                let vrf = entry.vrf.clone().or(cached)?;
                Some((entry, vrf))
            })
            .collect()
    }

    /// Recomputes the subnet routes of the bridge owning `vrf_name`.
    pub(super) fn handle_subnet_route(&self, db: &OperDb, vrf_name: &str) {
        let Some(vn) = self.vn_of_vrf(db, vrf_name) else {
            return;
        };
        if vn.vxlan_routing_vn {
            return;
        }

        match self.routing_vrf_for(&vn.name) {
            Some(routing_vrf) => self.update_subnet_route(db, &vn, vrf_name, &routing_vrf),
            None => self.delete_subnet_route(db, &vn, vrf_name),
        }
    }

    /// Installs this bridge's subnets in every sibling and every sibling's
    /// subnets in this bridge.
    pub(super) fn update_subnet_route(&self, db: &OperDb, vn: &VnEntry, vrf_name: &str, routing_vrf: &str) {
        if vn.ipams.is_empty() {
            return;
        }
        let Some(lr) = self.state.lock().mapper.lr_of_vn(&vn.name) else {
            return;
        };

        let vxlan_id = db.vrf(routing_vrf).map(|vrf| vrf.vxlan_id).unwrap_or(0);
        let indirection = || {
            AgentPath::new(self.peers.routing.clone(), NextHop::vrf(routing_vrf)).with_vxlan_id(vxlan_id)
        };

        for (sibling, sibling_vrf) in self.sibling_bridges(db, &lr, &vn.name) {
            for ipam in &vn.ipams {
                self.add_subnet(db, &sibling_vrf, &ipam.subnet, indirection());
            }
            for ipam in &sibling.ipams {
                self.add_subnet(db, vrf_name, &ipam.subnet, indirection());
            }
        }
    }

    fn add_subnet(&self, db: &OperDb, vrf_name: &str, subnet: &IpPrefix, path: AgentPath) {
        debug!("RoutingManager: subnet {} -> {} in {}", subnet, path.nexthop, vrf_name);
        db.add_route(TableId::inet_for(vrf_name, subnet), RouteKey::Inet(*subnet), path);
        RoutingStats::incr(&self.stats.fanout_adds);
    }

    fn delete_subnet(&self, db: &OperDb, vrf_name: &str, subnet: &IpPrefix) {
        db.delete_route(
            TableId::inet_for(vrf_name, subnet),
            RouteKey::Inet(*subnet),
            self.peers.routing.clone(),
        );
        RoutingStats::incr(&self.stats.fanout_deletes);
    }

    /// Removes the subnet routes exchanged between this bridge and its
    /// siblings. `vrf_name` may be a cached name of a VRF already gone.
    pub(super) fn delete_subnet_route(&self, db: &OperDb, vn: &VnEntry, vrf_name: &str) {
        if vn.ipams.is_empty() || vrf_name.is_empty() {
            return;
        }
        let Some(lr) = self.state.lock().mapper.lr_of_vn(&vn.name) else {
            return;
        };

        for (sibling, sibling_vrf) in self.sibling_bridges(db, &lr, &vn.name) {
            for ipam in &vn.ipams {
                self.delete_subnet(db, &sibling_vrf, &ipam.subnet);
            }
            for ipam in &sibling.ipams {
                self.delete_subnet(db, vrf_name, &ipam.subnet);
            }
        }
    }

    /// Withdraws from every sibling the subnets `vn` carried in `previous`
    /// but no longer carries. A VN left without subnets also loses the
    /// siblings' subnets in its own VRF.
    pub(super) fn delete_stale_subnets(&self, db: &OperDb, vn: &VnEntry, previous: &[IpPrefix]) {
        let removed: Vec<&IpPrefix> = previous
            .iter()
            .filter(|subnet| !vn.ipams.iter().any(|ipam| &ipam.subnet == *subnet))
            .collect();
        if removed.is_empty() {
            return;
        }
        let (lr, cached_vrf) = {
            let state = self.state.lock();
            let Some(lr) = state.mapper.lr_of_vn(&vn.name) else {
                return;
            };
            (lr, state.mapper.bridge_vrf_name(&lr, &vn.name).map(str::to_string))
        };
        let own_vrf = vn.vrf.clone().or(cached_vrf);

        for (sibling, sibling_vrf) in self.sibling_bridges(db, &lr, &vn.name) {
            for subnet in &removed {
                debug!("RoutingManager: subnet {} of {} removed from {}", subnet, vn.name, sibling_vrf);
                self.delete_subnet(db, &sibling_vrf, subnet);
            }
            if !vn.ipams.is_empty() {
                continue;
            }
            if let Some(vrf_name) = own_vrf.as_deref() {
                for ipam in &sibling.ipams {
                    self.delete_subnet(db, vrf_name, &ipam.subnet);
                }
            }
        }
    }

    /// Removes the copies of a deleted subnet route of `vrf_name` from
    /// every sibling bridge.
    pub(super) fn delete_ipam_routes(&self, db: &OperDb, vn: Option<&VnEntry>, vrf_name: &str, prefix: &IpPrefix) {
        let Some(vn) = vn else {
            return;
        };
        if vrf_name.is_empty() {
            return;
        }
        let Some(lr) = self.state.lock().mapper.lr_of_vn(&vn.name) else {
            return;
        };

        for (_, sibling_vrf) in self.sibling_bridges(db, &lr, &vn.name) {
            self.delete_subnet(db, &sibling_vrf, prefix);
        }
    }
}
