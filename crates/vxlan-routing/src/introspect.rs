//! Read-only views of the routing engine for operators.

use serde::Serialize;
use vxlan_oper_db::{PeerType, RouteEntry, TableId};

use crate::routing::{LogicalRouterId, RoutedVrfInfo, RoutingManager, RoutingStatsSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeDump {
    pub vn: String,
    pub vrf: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalRouterDump {
    pub uuid: String,
    pub routing_vrf: Option<String>,
    pub routing_vn: Option<String>,
    pub bridges: Vec<BridgeDump>,
}

impl LogicalRouterDump {
    fn new(lr: &LogicalRouterId, info: &RoutedVrfInfo) -> Self {
        Self {
            uuid: lr.to_string(),
            routing_vrf: info.routing_vrf.clone(),
            routing_vn: info.routing_vn.clone(),
            bridges: info
                .bridge_vns
                .iter()
                .map(|vn| BridgeDump {
                    vn: vn.clone(),
                    vrf: info.bridge_vrf_names.get(vn).cloned(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDump {
    pub peer: String,
    pub peer_type: PeerType,
    pub nexthop: String,
    pub vxlan_id: u32,
    pub dest_vns: Vec<String>,
    pub origin_vn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDump {
    pub prefix: String,
    pub paths: Vec<PathDump>,
}

impl From<&RouteEntry> for RouteDump {
    fn from(entry: &RouteEntry) -> Self {
        Self {
            prefix: entry.key().to_string(),
            paths: entry
                .paths()
                .iter()
                .map(|path| PathDump {
                    peer: path.peer.name().to_string(),
                    peer_type: path.peer.peer_type(),
                    nexthop: path.nexthop.to_string(),
                    vxlan_id: path.vxlan_id,
                    dest_vns: path.dest_vns.iter().cloned().collect(),
                    origin_vn: path.origin_vn.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDump {
    pub table: String,
    pub routes: Vec<RouteDump>,
}

/// Full engine snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDump {
    pub logical_routers: Vec<LogicalRouterDump>,
    pub stats: RoutingStatsSnapshot,
    pub walks_in_flight: usize,
    pub listened_vrfs: usize,
}

impl RoutingDump {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }

    /// One line per logical router and bridge, for the periodic log dump.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "RoutingManager: {} logical routers, {} VRFs listened, {} walks in flight",
            self.logical_routers.len(),
            self.listened_vrfs,
            self.walks_in_flight
        )];
        for lr in &self.logical_routers {
            lines.push(format!(
                "  lr {} routing_vrf={} routing_vn={}",
                lr.uuid,
                lr.routing_vrf.as_deref().unwrap_or("-"),
                lr.routing_vn.as_deref().unwrap_or("-")
            ));
            for bridge in &lr.bridges {
                lines.push(format!("    bridge {} vrf={}", bridge.vn, bridge.vrf.as_deref().unwrap_or("-")));
            }
        }
        lines
    }
}

pub fn logical_routers(manager: &RoutingManager) -> Vec<LogicalRouterDump> {
    manager
        .logical_routers()
        .iter()
        .map(|(lr, info)| LogicalRouterDump::new(lr, info))
        .collect()
}

pub fn snapshot(manager: &RoutingManager) -> RoutingDump {
    RoutingDump {
        logical_routers: logical_routers(manager),
        stats: manager.stats(),
        walks_in_flight: manager.walks_in_flight(),
        listened_vrfs: manager.listened_vrfs(),
    }
}

/// Dumps the EVPN, Inet-v4 and Inet-v6 tables of `vrf_name`. Missing
/// tables are skipped.
pub fn vrf_tables(manager: &RoutingManager, vrf_name: &str) -> Vec<TableDump> {
    let db = manager.db();
    [TableId::evpn(vrf_name), TableId::inet4(vrf_name), TableId::inet6(vrf_name)]
        .into_iter()
        .filter(|table| db.table_exists(table))
        .map(|table| TableDump {
            routes: db.table_entries(&table).iter().map(RouteDump::from).collect(),
            table: table.to_string(),
        })
        .collect()
}

/// VNs attached to a logical router, routing VN first.
pub fn list_attached_vns(manager: &RoutingManager, lr: &LogicalRouterId) -> Vec<String> {
    let Some(info) = manager.logical_router_info(lr) else {
        return Vec::new();
    };
    info.routing_vn.into_iter().chain(info.bridge_vns).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::NoOpAdvertiser;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use uuid::Uuid;
    use vxlan_oper_db::{OperDb, OperDbConfig, VmInterface, VnEntry, VrfEntry};

    fn setup(lr: Uuid) -> (Arc<OperDb>, Arc<RoutingManager>) {
        let db = Arc::new(OperDb::new(OperDbConfig::default()));
        let manager = RoutingManager::new(Arc::clone(&db), Arc::new(NoOpAdvertiser));
        manager.register();
        db.add_vrf(VrfEntry::new("vrf-r").with_vn("vn-r").with_vxlan_id(5000));
        db.add_vrf(VrfEntry::new("vrf1").with_vn("vn1"));
        db.add_vn(VnEntry::new("vn-r").with_vrf("vrf-r").routing_for(lr));
        db.add_vn(VnEntry::new("vn1").with_vrf("vrf1").with_ipam("1.1.1.0/24".parse().unwrap()));
        db.add_interface(VmInterface::lr_port("lr-port-1", "vn1", lr));
        db.process();
        (db, manager)
    }

    #[test]
    fn test_snapshot_lists_logical_router() {
        let lr = Uuid::new_v4();
        let (_db, manager) = setup(lr);

        let dump = snapshot(&manager);
        assert_eq!(
            dump.logical_routers,
            vec![LogicalRouterDump {
                uuid: lr.to_string(),
                routing_vrf: Some("vrf-r".to_string()),
                routing_vn: Some("vn-r".to_string()),
                bridges: vec![BridgeDump {
                    vn: "vn1".to_string(),
                    vrf: Some("vrf1".to_string()),
                }],
            }]
        );
        assert_eq!(dump.listened_vrfs, 2);

        let json: serde_json::Value = serde_json::from_str(&dump.to_json()).unwrap();
        assert_eq!(json["logical_routers"][0]["routing_vrf"], "vrf-r");
        assert!(dump.lines().iter().any(|line| line.contains("bridge vn1 vrf=vrf1")));
    }

    #[test]
    fn test_list_attached_vns() {
        let lr = Uuid::new_v4();
        let (_db, manager) = setup(lr);

        assert_eq!(list_attached_vns(&manager, &lr), vec!["vn-r".to_string(), "vn1".to_string()]);
        assert!(list_attached_vns(&manager, &Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_vrf_tables() {
        let lr = Uuid::new_v4();
        let (db, manager) = setup(lr);

        let tables = vrf_tables(&manager, "vrf-r");
        assert_eq!(tables.len(), 3);
        assert!(vrf_tables(&manager, "missing").is_empty());

        db.delete_vrf("vrf1");
        db.process();
        assert!(vrf_tables(&manager, "vrf1").is_empty());
    }
}
