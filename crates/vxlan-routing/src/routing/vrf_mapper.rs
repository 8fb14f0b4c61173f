//! Logical router bookkeeping.
//!
//! [`VrfMapper`] maps each logical router to its routing VRF and bridge
//! VNs, and each VN to the logical router it is bound to. It performs no
//! table mutation itself; callers schedule the walks a change requires.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use vxlan_oper_db::{OperDb, RouteEntry};

use super::types::LogicalRouterId;

/// Routing VRF and bridge networks of one logical router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutedVrfInfo {
    /// The routing VRF, set while a routing VN owns the logical router.
    pub routing_vrf: Option<String>,
    /// The routing VN that claimed the logical router.
    pub routing_vn: Option<String>,
    pub bridge_vns: BTreeSet<String>,
    /// VRF name of each bridge VN as last seen. A VN's VRF may already be
    /// gone while the VN is being withdrawn.
    pub bridge_vrf_names: BTreeMap<String, String>,
}

impl RoutedVrfInfo {
    /// True when nothing references the logical router any more.
    pub fn is_unused(&self) -> bool {
        self.routing_vrf.is_none() && self.bridge_vns.is_empty()
    }
}

/// Result of [`VrfMapper::bind_routing_vrf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The VN owns the logical router. `vrf_changed` is set when the
    /// routing VRF differs from the one bound before.
    Bound { vrf_changed: bool },
    /// Another routing VN already owns the logical router.
    Rejected { owner: String },
}

/// Logical router to routing/bridge VRF map plus the VN to logical router
/// index.
#[derive(Debug, Default)]
pub struct VrfMapper {
    lr_map: BTreeMap<LogicalRouterId, RoutedVrfInfo>,
    vn_lr: BTreeMap<String, LogicalRouterId>,
}

impl VrfMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lr_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lr_map.is_empty()
    }

    pub fn info(&self, lr: &LogicalRouterId) -> Option<&RoutedVrfInfo> {
        self.lr_map.get(lr)
    }

    /// Logical router the VN is currently bound to.
    pub fn lr_of_vn(&self, vn: &str) -> Option<LogicalRouterId> {
        self.vn_lr.get(vn).copied()
    }

    pub fn set_vn_lr(&mut self, vn: &str, lr: LogicalRouterId) {
        self.vn_lr.insert(vn.to_string(), lr);
    }

    pub fn remove_vn_lr(&mut self, vn: &str) -> Option<LogicalRouterId> {
        self.vn_lr.remove(vn)
    }

    /// Claims the logical router for routing VN `vn` with routing VRF `vrf`.
    ///
    /// The first routing VN to bind owns the logical router until it
    /// unbinds; later claims by other VNs are rejected.
    pub fn bind_routing_vrf(&mut self, lr: LogicalRouterId, vn: &str, vrf: &str) -> BindOutcome {
        let info = self.lr_map.entry(lr).or_default();
        if let Some(owner) = &info.routing_vn {
            if owner != vn {
                return BindOutcome::Rejected {
                    owner: owner.clone(),
                };
            }
        }
        info.routing_vn = Some(vn.to_string());
        let vrf_changed = info.routing_vrf.as_deref() != Some(vrf);
        if vrf_changed {
            info.routing_vrf = Some(vrf.to_string());
        }
        BindOutcome::Bound { vrf_changed }
    }

    /// Releases ownership if `vn` owns the logical router. Returns the
    /// routing VRF that was bound.
    pub fn unbind_routing_vrf(&mut self, lr: &LogicalRouterId, vn: &str) -> Option<String> {
        let info = self.lr_map.get_mut(lr)?;
        if info.routing_vn.as_deref() != Some(vn) {
            return None;
        }
        info.routing_vn = None;
        info.routing_vrf.take()
    }

    /// Adds a bridge VN, caching its VRF name when known. Returns true if
    /// the VN was not a member before.
    pub fn add_bridge(&mut self, lr: LogicalRouterId, vn: &str, vrf: Option<&str>) -> bool {
        let info = self.lr_map.entry(lr).or_default();
        if let Some(vrf) = vrf {
            info.bridge_vrf_names.insert(vn.to_string(), vrf.to_string());
        }
        info.bridge_vns.insert(vn.to_string())
    }

    /// Removes a bridge VN and its cached VRF name. Returns true if it was
    /// a member.
    pub fn remove_bridge(&mut self, lr: &LogicalRouterId, vn: &str) -> bool {
        let Some(info) = self.lr_map.get_mut(lr) else {
            return false;
        };
        info.bridge_vrf_names.remove(vn);
        info.bridge_vns.remove(vn)
    }

    pub fn is_bridge(&self, lr: &LogicalRouterId, vn: &str) -> bool {
        self.lr_map
            .get(lr)
            .map(|info| info.bridge_vns.contains(vn))
            .unwrap_or(false)
    }

    pub fn bridge_vrf_name(&self, lr: &LogicalRouterId, vn: &str) -> Option<&str> {
        self.lr_map
            .get(lr)
            .and_then(|info| info.bridge_vrf_names.get(vn))
            .map(String::as_str)
    }

    pub fn bridges(&self, lr: &LogicalRouterId) -> Vec<String> {
        self.lr_map
            .get(lr)
            .map(|info| info.bridge_vns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn routing_vrf_of(&self, lr: &LogicalRouterId) -> Option<&str> {
        self.lr_map.get(lr).and_then(|info| info.routing_vrf.as_deref())
    }

    /// Routing VRF of the logical router the VN is bound to.
    pub fn routing_vrf_for(&self, vn: &str) -> Option<String> {
        let lr = self.vn_lr.get(vn)?;
        self.routing_vrf_of(lr).map(str::to_string)
    }

    /// Logical router of a route's VRF.
    ///
    /// A route in a routing VRF resolves through the routing VN's own
    /// logical router id; a route in a bridge VRF through the VN index.
    pub fn logical_router_of(&self, db: &OperDb, route: &RouteEntry) -> Option<LogicalRouterId> {
        let vrf = db.vrf(route.vrf())?;
        let vn = db.vn(vrf.vn.as_deref()?)?;
        if vn.vxlan_routing_vn {
            return vn.logical_router;
        }
        self.lr_of_vn(&vn.name)
    }

    pub fn routing_vrf_for_route(&self, db: &OperDb, route: &RouteEntry) -> Option<String> {
        let lr = self.logical_router_of(db, route)?;
        self.routing_vrf_of(&lr).map(str::to_string)
    }

    /// Drops the logical router once it has neither a routing VRF nor
    /// bridges. Returns true if it was dropped.
    pub fn try_delete(&mut self, lr: &LogicalRouterId) -> bool {
        match self.lr_map.get(lr) {
            Some(info) if info.is_unused() => {
                self.lr_map.remove(lr);
                true
            }
            _ => false,
        }
    }

    /// Copy of every logical router entry, ordered by id.
    pub fn dump(&self) -> Vec<(LogicalRouterId, RoutedVrfInfo)> {
        self.lr_map.iter().map(|(lr, info)| (*lr, info.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use vxlan_oper_db::{AgentPath, NextHop, OperDbConfig, Peer, PeerType, RouteKey, VnEntry, VrfEntry};

    #[test]
    fn test_bind_first_writer_wins() {
        let mut mapper = VrfMapper::new();
        let lr = Uuid::new_v4();

        assert_eq!(
            mapper.bind_routing_vrf(lr, "vn-r", "vrf-r"),
            BindOutcome::Bound { vrf_changed: true }
        );
        assert_eq!(
            mapper.bind_routing_vrf(lr, "vn-r", "vrf-r"),
            BindOutcome::Bound { vrf_changed: false }
        );
        assert_eq!(
            mapper.bind_routing_vrf(lr, "vn-other", "vrf-other"),
            BindOutcome::Rejected {
                owner: "vn-r".to_string()
            }
        );
        assert_eq!(mapper.routing_vrf_of(&lr), Some("vrf-r"));

        // Only the owner can release.
        assert_eq!(mapper.unbind_routing_vrf(&lr, "vn-other"), None);
        assert_eq!(mapper.unbind_routing_vrf(&lr, "vn-r"), Some("vrf-r".to_string()));
        assert_eq!(
            mapper.bind_routing_vrf(lr, "vn-other", "vrf-other"),
            BindOutcome::Bound { vrf_changed: true }
        );
    }

    #[test]
    fn test_gc_only_when_unused() {
        let mut mapper = VrfMapper::new();
        let lr = Uuid::new_v4();

        mapper.bind_routing_vrf(lr, "vn-r", "vrf-r");
        assert!(mapper.add_bridge(lr, "vn1", Some("vrf1")));
        assert!(!mapper.add_bridge(lr, "vn1", Some("vrf1")));
        assert_eq!(mapper.bridge_vrf_name(&lr, "vn1"), Some("vrf1"));

        mapper.unbind_routing_vrf(&lr, "vn-r");
        assert!(!mapper.try_delete(&lr));

        assert!(mapper.remove_bridge(&lr, "vn1"));
        assert_eq!(mapper.bridge_vrf_name(&lr, "vn1"), None);
        assert!(mapper.try_delete(&lr));
        assert!(mapper.is_empty());
        assert!(!mapper.remove_bridge(&lr, "vn1"));
    }

    #[test]
    fn test_routing_vrf_for_vn() {
        let mut mapper = VrfMapper::new();
        let lr = Uuid::new_v4();
        mapper.set_vn_lr("vn1", lr);
        assert_eq!(mapper.routing_vrf_for("vn1"), None);

        mapper.bind_routing_vrf(lr, "vn-r", "vrf-r");
        assert_eq!(mapper.routing_vrf_for("vn1"), Some("vrf-r".to_string()));
        assert_eq!(mapper.routing_vrf_for("vn2"), None);

        assert_eq!(mapper.remove_vn_lr("vn1"), Some(lr));
        assert_eq!(mapper.routing_vrf_for("vn1"), None);
    }

    #[test]
    fn test_logical_router_of_route_both_directions() {
        let db = OperDb::new(OperDbConfig::default());
        let lr = Uuid::new_v4();
        db.add_vrf(VrfEntry::new("vrf-r").with_vn("vn-r"));
        db.add_vrf(VrfEntry::new("vrf1").with_vn("vn1"));
        db.add_vn(VnEntry::new("vn-r").with_vrf("vrf-r").routing_for(lr));
        db.add_vn(VnEntry::new("vn1").with_vrf("vrf1"));
        db.process();

        let mut mapper = VrfMapper::new();
        let path = AgentPath::new(Peer::new("tap1", PeerType::LocalVmPort), NextHop::interface("tap1"));
        let routing_route =
            RouteEntry::new("vrf-r", RouteKey::type5("1.1.1.10/32".parse().unwrap())).with_path(path.clone());
        let bridge_route = RouteEntry::new("vrf1", RouteKey::Inet("1.1.1.10/32".parse().unwrap())).with_path(path);

        assert_eq!(mapper.logical_router_of(&db, &routing_route), Some(lr));
        assert_eq!(mapper.logical_router_of(&db, &bridge_route), None);

        mapper.set_vn_lr("vn1", lr);
        mapper.bind_routing_vrf(lr, "vn-r", "vrf-r");
        assert_eq!(mapper.logical_router_of(&db, &bridge_route), Some(lr));
        assert_eq!(
            mapper.routing_vrf_for_route(&db, &bridge_route),
            Some("vrf-r".to_string())
        );

        let orphan = RouteEntry::new("missing", RouteKey::Inet("1.1.1.10/32".parse().unwrap()));
        assert_eq!(mapper.logical_router_of(&db, &orphan), None);
    }
}
