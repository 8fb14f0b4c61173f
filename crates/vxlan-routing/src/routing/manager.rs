//! RoutingManager - logical router route leaking orchestration.
//!
//! The manager listens to the VN, VRF and VM interface tables and to the
//! Inet-v4, Inet-v6 and EVPN tables of every tenant VRF. Configuration
//! changes update the [`VrfMapper`] and schedule table walks; route changes
//! run the leak pipeline.
//!
//! # Architecture
//!
//! ```text
//! VN / VRF / VMI events
//!      │
//!      ▼
//! RoutingManager ──> VrfMapper (LR ↔ routing VRF / bridge VNs)
//!      │
//!      ├──> RouteWalker (coalesced walks)
//!      │
//!      ▼
//! route events ──> inet_route_notify ──> routing VRF EVPN
//!              └─> evpn_route_notify ──> routing VRF Inet, bridge Inet fan-out
//! ```
//!
//! All callbacks run inside [`OperDb::process`]; every mutation they issue
//! is queued and applied after the callback returns. The state lock is
//! held only around map operations.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use vxlan_oper_db::{
    EventKind, ListenerId, ObjectListener, ObjectTable, OperDb, RouteEntry, RouteEvent, RouteKey,
    RouteListener, TableId, TableKind, VmInterface, VnEntry, VrfEntry, WalkStatus,
};
use vxlan_types::IpPrefix;

use super::types::{LogicalRouterId, Result, RoutingError, RoutingStats, RoutingStatsSnapshot, SyntheticPeers};
use super::vrf_mapper::{BindOutcome, RoutedVrfInfo, VrfMapper};
use super::walker::{RouteWalker, WalkKey, WalkPurpose, WalkSink};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::xmpp::XmppAdvertiser;

const SOURCE: &str = "RoutingManager";

/// A VM interface attached to a VN, with the logical router it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct VmiRef {
    pub(super) name: String,
    pub(super) logical_router: Option<LogicalRouterId>,
}

#[derive(Debug, Clone, Default)]
pub(super) struct VnState {
    pub(super) is_routing_vn: bool,
    pub(super) vrf: Option<String>,
    pub(super) logical_router: Option<LogicalRouterId>,
    /// Logical router ports in arrival order. The first one decides the
    /// bridge VN's logical router.
    pub(super) vmis: Vec<VmiRef>,
    /// IPAM subnets seen on the last notification.
    pub(super) ipams: Vec<IpPrefix>,
}

impl VnState {
    /// Takes the logical router of the first port, pruning ports without
    /// one.
    fn update_logical_router(&mut self) {
        self.vmis.retain(|vmi| vmi.logical_router.is_some());
        self.logical_router = self.vmis.first().and_then(|vmi| vmi.logical_router);
    }
}

#[derive(Debug, Clone)]
pub(super) struct VmiState {
    pub(super) vn: String,
    pub(super) logical_router: LogicalRouterId,
}

#[derive(Debug, Clone, Default)]
pub(super) struct VrfListenerState {
    pub(super) routing_vrf: bool,
    pub(super) registrations: Vec<(TableId, ListenerId)>,
}

/// State shared by every notification, guarded by one lock.
#[derive(Debug, Default)]
pub(super) struct RoutingState {
    pub(super) mapper: VrfMapper,
    pub(super) vns: BTreeMap<String, VnState>,
    pub(super) vmis: BTreeMap<String, VmiState>,
    pub(super) vrfs: BTreeMap<String, VrfListenerState>,
}

/// Table listener forwarding events to the manager.
struct ManagerListener(Weak<RoutingManager>);

impl ObjectListener for ManagerListener {
    fn on_vn_event(&self, db: &OperDb, kind: EventKind, vn: &VnEntry) {
        if let Some(manager) = self.0.upgrade() {
            manager.vn_notify(db, kind, vn);
        }
    }

    fn on_vrf_event(&self, db: &OperDb, kind: EventKind, vrf: &VrfEntry) {
        if let Some(manager) = self.0.upgrade() {
            manager.vrf_notify(db, kind, vrf);
        }
    }

    fn on_interface_event(&self, db: &OperDb, kind: EventKind, intf: &VmInterface) {
        if let Some(manager) = self.0.upgrade() {
            manager.vmi_notify(db, kind, intf);
        }
    }
}

impl RouteListener for ManagerListener {
    fn on_route_event(&self, db: &OperDb, event: &RouteEvent<'_>) {
        if let Some(manager) = self.0.upgrade() {
            manager.route_notify(db, event.table, event.entry);
        }
    }
}

/// Route leaking engine for VXLAN logical routers.
pub struct RoutingManager {
    pub(super) db: Arc<OperDb>,
    pub(super) advertiser: Arc<dyn XmppAdvertiser>,
    pub(super) peers: SyntheticPeers,
    pub(super) state: Mutex<RoutingState>,
    pub(super) walker: RouteWalker,
    pub(super) stats: RoutingStats,
    listener: Arc<ManagerListener>,
    registrations: Mutex<Vec<(ObjectTable, ListenerId)>>,
    loc_sequence: AtomicU32,
    self_ref: Weak<RoutingManager>,
}

impl std::fmt::Debug for RoutingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RoutingManager")
            .field("logical_routers", &state.mapper.len())
            .field("vns", &state.vns.len())
            .field("vrfs", &state.vrfs.len())
            .field("walks_in_flight", &self.walker.in_flight())
            .finish()
    }
}

impl RoutingManager {
    pub fn new(db: Arc<OperDb>, advertiser: Arc<dyn XmppAdvertiser>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref: &Weak<RoutingManager>| Self {
            db,
            advertiser,
            peers: SyntheticPeers::default(),
            state: Mutex::new(RoutingState::default()),
            walker: RouteWalker::new(),
            stats: RoutingStats::default(),
            listener: Arc::new(ManagerListener(self_ref.clone())),
            registrations: Mutex::new(Vec::new()),
            loc_sequence: AtomicU32::new(0),
            self_ref: self_ref.clone(),
        })
    }

    pub fn db(&self) -> &Arc<OperDb> {
        &self.db
    }

    pub fn peers(&self) -> &SyntheticPeers {
        &self.peers
    }

    pub fn stats(&self) -> RoutingStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn walks_in_flight(&self) -> usize {
        self.walker.in_flight()
    }

    pub fn is_registered(&self) -> bool {
        !self.registrations.lock().is_empty()
    }

    /// Subscribes to the VRF, VN and interface tables and replays the
    /// objects already present.
    pub fn register(&self) {
        if self.is_registered() {
            return;
        }
        {
            let mut registrations = self.registrations.lock();
            for table in [ObjectTable::Vrf, ObjectTable::Vn, ObjectTable::Interface] {
                let listener: Arc<dyn ObjectListener> = self.listener.clone();
                let id = self.db.register_object_listener(table, listener);
                registrations.push((table, id));
            }
        }

        let db = Arc::clone(&self.db);
        for vrf in db.vrfs() {
            self.vrf_notify(&db, EventKind::Added, &vrf);
        }
        for vn in db.vns() {
            self.vn_notify(&db, EventKind::Added, &vn);
        }
        for intf in db.interfaces() {
            self.vmi_notify(&db, EventKind::Added, &intf);
        }

        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "register")
            .with_outcome(AuditOutcome::Success));
    }

    /// Unregisters every listener and releases outstanding walkers.
    pub fn shutdown(&self) {
        for (table, id) in std::mem::take(&mut *self.registrations.lock()) {
            if let Err(e) = self.db.unregister_object_listener(table, id) {
                debug!("{}: unregister {:?} listener: {}", SOURCE, table, e);
            }
        }

        let vrfs = std::mem::take(&mut self.state.lock().vrfs);
        for state in vrfs.values() {
            self.unregister_vrf(state);
        }

        let released = self.walker.release_all(&self.db);
        info!(
            "{}: shut down, unregistered {} VRF(s), released {} walker(s)",
            SOURCE,
            vrfs.len(),
            released
        );
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, SOURCE, "shutdown")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "vrfs": vrfs.len(),
                "walkers_released": released,
            })));
    }

    /// Next local sequence number for ECMP member ordering.
    pub fn next_local_sequence(&self) -> u32 {
        self.loc_sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Logs and counts a per-route failure. The route is skipped.
    pub(super) fn isolate(&self, context: &'static str, result: Result<()>) {
        let Err(err) = result else {
            return;
        };
        match &err {
            RoutingError::InternalInvariantViolation { .. } => {
                RoutingStats::incr(&self.stats.invariant_violations);
                error!("{}: {}: {}", SOURCE, context, err);
                audit_log!(AuditRecord::new(AuditCategory::InvariantViolation, SOURCE, context)
                    .with_error(err.to_string()));
            }
            RoutingError::MalformedInput(_) => {
                RoutingStats::incr(&self.stats.malformed_inputs);
                warn!("{}: {}: {}", SOURCE, context, err);
            }
            RoutingError::Db(_) => debug!("{}: {}: {}", SOURCE, context, err),
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub(super) fn vn_of_vrf(&self, db: &OperDb, vrf_name: &str) -> Option<VnEntry> {
        let vrf = db.vrf(vrf_name)?;
        db.vn(vrf.vn.as_deref()?)
    }

    /// Logical router of a route's VRF.
    pub fn logical_router_of(&self, route: &RouteEntry) -> Option<LogicalRouterId> {
        self.state.lock().mapper.logical_router_of(&self.db, route)
    }

    pub fn routing_vrf_for(&self, vn: &str) -> Option<String> {
        self.state.lock().mapper.routing_vrf_for(vn)
    }

    pub(super) fn routing_vrf_for_route(&self, db: &OperDb, route: &RouteEntry) -> Option<String> {
        self.state.lock().mapper.routing_vrf_for_route(db, route)
    }

    pub fn logical_router_info(&self, lr: &LogicalRouterId) -> Option<RoutedVrfInfo> {
        self.state.lock().mapper.info(lr).cloned()
    }

    pub fn logical_routers(&self) -> Vec<(LogicalRouterId, RoutedVrfInfo)> {
        self.state.lock().mapper.dump()
    }

    pub fn is_routing_vrf(&self, vrf_name: &str) -> bool {
        self.state
            .lock()
            .vrfs
            .get(vrf_name)
            .map(|s| s.routing_vrf)
            .unwrap_or(false)
    }

    /// Number of VRFs the manager holds table listeners for.
    pub fn listened_vrfs(&self) -> usize {
        self.state.lock().vrfs.len()
    }

    // ------------------------------------------------------------------
    // VN notifications
    // ------------------------------------------------------------------

    pub(crate) fn vn_notify(&self, db: &OperDb, kind: EventKind, vn: &VnEntry) {
        RoutingStats::incr(&self.stats.notifications);

        if kind == EventKind::Deleted || vn.is_deleted() {
            let Some(mut state) = self.state.lock().vns.remove(&vn.name) else {
                return;
            };
            if state.is_routing_vn {
                self.routing_vn_notify(db, vn, &mut state);
            } else {
                self.bridge_vn_notify(db, vn, &mut state);
            }
            return;
        }

        let mut state = self.state.lock().vns.get(&vn.name).cloned().unwrap_or_default();
        let was_routing = state.is_routing_vn;
        state.is_routing_vn = vn.vxlan_routing_vn;
        state.vrf = vn.vrf.clone();

        if was_routing && !state.is_routing_vn {
            // Lost the routing role: release the routing VRF first.
            self.routing_vn_notify(db, vn, &mut state);
        }
        let ipams = vn.ipams.iter().map(|ipam| ipam.subnet).collect();
        let previous_ipams = std::mem::replace(&mut state.ipams, ipams);
        if !state.is_routing_vn {
            self.delete_stale_subnets(db, vn, &previous_ipams);
            self.adopt_vmis(&vn.name, &mut state);
        }
        if state.is_routing_vn {
            state.logical_router = vn.logical_router;
            if let Some(vrf) = vn.vrf.as_deref() {
                if let Some(listener) = self.state.lock().vrfs.get_mut(vrf) {
                    listener.routing_vrf = true;
                }
            }
            self.routing_vn_notify(db, vn, &mut state);
        } else {
            self.bridge_vn_notify(db, vn, &mut state);
        }
        self.state.lock().vns.insert(vn.name.clone(), state);
    }

    /// Picks up logical router ports that arrived before their VN.
    fn adopt_vmis(&self, vn: &str, state: &mut VnState) {
        let guard = self.state.lock();
        for (name, vmi) in guard.vmis.iter().filter(|(_, vmi)| vmi.vn == vn) {
            if !state.vmis.iter().any(|v| &v.name == name) {
                state.vmis.push(VmiRef {
                    name: name.clone(),
                    logical_router: Some(vmi.logical_router),
                });
            }
        }
    }

    fn routing_vn_notify(&self, db: &OperDb, vn: &VnEntry, state: &mut VnState) {
        let bound_lr = self.state.lock().mapper.lr_of_vn(&vn.name);

        let (withdraw, update) = if vn.is_deleted() || vn.vrf.is_none() || !state.is_routing_vn {
            (true, false)
        } else {
            let moved = bound_lr.is_some_and(|lr| Some(lr) != state.logical_router);
            (moved, true)
        };

        if withdraw {
            if let Some(lr) = bound_lr {
                self.release_logical_router(db, lr, &vn.name);
            }
        }

        if !update {
            return;
        }
        let (Some(lr), Some(vrf)) = (state.logical_router, vn.vrf.as_deref()) else {
            return;
        };

        let outcome = {
            let mut guard = self.state.lock();
            guard.mapper.set_vn_lr(&vn.name, lr);
            guard.mapper.bind_routing_vrf(lr, &vn.name, vrf)
        };
        match outcome {
            BindOutcome::Bound { vrf_changed: true } => {
                info!("{}: LR {} routing VRF {} owned by {}", SOURCE, lr, vrf, vn.name);
                audit_log!(AuditRecord::new(AuditCategory::RoutingOwnership, SOURCE, "bind_routing_vrf")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(lr.to_string())
                    .with_object_type("logical_router")
                    .with_details(serde_json::json!({
                        "routing_vn": vn.name,
                        "routing_vrf": vrf,
                    })));
                self.walk_bridge_vrfs(db, &lr);
                // Type-5 routes learned before the routing VN was known.
                self.start_walk(db, TableId::evpn(vrf), WalkPurpose::Notify);
            }
            BindOutcome::Bound { vrf_changed: false } => {}
            BindOutcome::Rejected { owner } => {
                warn!(
                    "{}: {} cannot claim LR {}, already owned by {}",
                    SOURCE, vn.name, lr, owner
                );
                audit_log!(AuditRecord::new(AuditCategory::RoutingOwnership, SOURCE, "bind_routing_vrf")
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(lr.to_string())
                    .with_object_type("logical_router")
                    .with_details(serde_json::json!({
                        "routing_vn": vn.name,
                        "owner": owner,
                    })));
            }
        }
    }

    /// Drops routing VN `vn` from `lr`. The owner also deletes every engine
    /// path in the routing VRF and hands the logical router to the next
    /// routing VN waiting for it.
    fn release_logical_router(&self, db: &OperDb, lr: LogicalRouterId, vn: &str) {
        let (released, collected) = {
            let mut guard = self.state.lock();
            let released = guard.mapper.unbind_routing_vrf(&lr, vn);
            let collected = guard.mapper.try_delete(&lr);
            guard.mapper.remove_vn_lr(vn);
            (released, collected)
        };

        if let Some(vrf) = &released {
            self.routing_vrf_delete_all_routes(db, vrf);
            self.walk_withdraw_bridges(db, &lr, vrf);
            info!("{}: LR {} released routing VRF {}", SOURCE, lr, vrf);
            audit_log!(AuditRecord::new(AuditCategory::RoutingOwnership, SOURCE, "unbind_routing_vrf")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(lr.to_string())
                .with_object_type("logical_router")
                .with_details(serde_json::json!({
                    "routing_vn": vn,
                    "routing_vrf": vrf,
                })));
        }
        if collected {
            self.audit_collected(&lr);
        }
        if released.is_some() {
            // Bridges left without a routing VRF drop their subnet routes.
            self.walk_bridge_vrfs(db, &lr);
            self.reclaim_logical_router(db, lr, vn);
        }
    }

    /// Replays the next routing VN pointing at `lr` so it can claim it.
    fn reclaim_logical_router(&self, db: &OperDb, lr: LogicalRouterId, released_by: &str) {
        let candidate = db.vns().into_iter().find(|vn| {
            vn.vxlan_routing_vn
                && vn.logical_router == Some(lr)
                && vn.vrf.is_some()
                && vn.name != released_by
        });
        if let Some(vn) = candidate {
            debug!("{}: {} takes over LR {}", SOURCE, vn.name, lr);
            self.vn_notify(db, EventKind::Changed, &vn);
        }
    }

    fn audit_collected(&self, lr: &LogicalRouterId) {
        info!("{}: LR {} garbage-collected", SOURCE, lr);
        audit_log!(AuditRecord::new(AuditCategory::LogicalRouter, SOURCE, "delete_logical_router")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(lr.to_string())
            .with_object_type("logical_router"));
    }

    fn bridge_vn_notify(&self, db: &OperDb, vn: &VnEntry, state: &mut VnState) {
        if vn.logical_router.is_some() {
            return;
        }

        state.update_logical_router();
        let bound_lr = self.state.lock().mapper.lr_of_vn(&vn.name);

        let mut withdraw = false;
        let mut update = true;
        if vn.is_deleted() || vn.vrf.is_none() {
            withdraw = true;
            update = false;
        }
        if state.logical_router.is_some() && bound_lr.is_some_and(|lr| Some(lr) != state.logical_router) {
            withdraw = true;
        }
        if state.logical_router.is_none() {
            withdraw = true;
            update = false;
        }

        if withdraw {
            if let Some(lr) = bound_lr {
                self.withdraw_bridge(db, vn, lr, state.vrf.as_deref());
            }
            self.state.lock().mapper.remove_vn_lr(&vn.name);
        }

        if update {
            if let Some(lr) = state.logical_router {
                let attached = {
                    let mut guard = self.state.lock();
                    guard.mapper.set_vn_lr(&vn.name, lr);
                    guard.mapper.add_bridge(lr, &vn.name, vn.vrf.as_deref())
                };
                if attached {
                    info!("{}: bridge {} attached to LR {}", SOURCE, vn.name, lr);
                    audit_log!(AuditRecord::new(AuditCategory::BridgeMembership, SOURCE, "attach_bridge")
                        .with_outcome(AuditOutcome::Success)
                        .with_object_id(lr.to_string())
                        .with_object_type("logical_router")
                        .with_details(serde_json::json!({
                            "bridge_vn": vn.name,
                            "bridge_vrf": vn.vrf,
                        })));
                }
                self.walk_routing_vrf(db, lr, Some(&vn.name), true);
            }
        }

        let Some(vrf) = state.vrf.clone() else {
            return;
        };
        if update || withdraw {
            self.walk_bridge_inet_tables(db, &vrf);
        }
    }

    /// Detaches bridge `vn` from `lr`: removes the subnet routes exchanged
    /// with its siblings and walks its Inet tables to withdraw what it
    /// exported.
    fn withdraw_bridge(&self, db: &OperDb, vn: &VnEntry, lr: LogicalRouterId, current_vrf: Option<&str>) {
        let (cached_vrf, member, routing_vrf) = {
            let guard = self.state.lock();
            (
                guard.mapper.bridge_vrf_name(&lr, &vn.name).map(str::to_string),
                guard.mapper.is_bridge(&lr, &vn.name),
                guard.mapper.routing_vrf_of(&lr).map(str::to_string),
            )
        };

        if let Some(vrf) = &cached_vrf {
            self.delete_subnet_route(db, vn, vrf);
        }

        if member {
            if let (Some(bridge_vrf), Some(routing_vrf)) =
                (cached_vrf.as_deref().or(current_vrf), routing_vrf)
            {
                for kind in [TableKind::Inet4, TableKind::Inet6] {
                    self.start_walk(
                        db,
                        TableId::new(bridge_vrf, kind),
                        WalkPurpose::WithdrawFromRoutingVrf {
                            routing_vrf: routing_vrf.clone(),
                        },
                    );
                }
            }
            self.state.lock().mapper.remove_bridge(&lr, &vn.name);
            info!("{}: bridge {} detached from LR {}", SOURCE, vn.name, lr);
            audit_log!(AuditRecord::new(AuditCategory::BridgeMembership, SOURCE, "detach_bridge")
                .with_outcome(AuditOutcome::Success)
                .with_object_id(lr.to_string())
                .with_object_type("logical_router")
                .with_details(serde_json::json!({
                    "bridge_vn": vn.name,
                    "bridge_vrf": cached_vrf,
                })));
        }

        if self.state.lock().mapper.try_delete(&lr) {
            self.audit_collected(&lr);
        }
    }

    /// Deletes every export and vxlan-bgp path the engine wrote into the
    /// EVPN and Inet tables of `vrf_name`.
    pub(super) fn routing_vrf_delete_all_routes(&self, db: &OperDb, vrf_name: &str) {
        let entries = db.table_entries(&TableId::evpn(vrf_name));
        for entry in &entries {
            let prefix = *entry.prefix();
            for peer in [&self.peers.export, &self.peers.vxlan_bgp] {
                db.delete_route(TableId::evpn(vrf_name), RouteKey::type5(prefix), peer.clone());
                db.delete_route(TableId::inet_for(vrf_name, &prefix), RouteKey::Inet(prefix), peer.clone());
            }
        }
        debug!(
            "{}: deleting engine routes for {} prefixes in {}",
            SOURCE,
            entries.len(),
            vrf_name
        );
    }

    // ------------------------------------------------------------------
    // VM interface notifications
    // ------------------------------------------------------------------

    pub(crate) fn vmi_notify(&self, db: &OperDb, kind: EventKind, intf: &VmInterface) {
        RoutingStats::incr(&self.stats.notifications);
        let existing = self.state.lock().vmis.get(&intf.name).cloned();

        let deleted = kind == EventKind::Deleted || intf.is_deleted();
        let (Some(vn_name), Some(lr), false) = (intf.vn.as_deref(), intf.logical_router, deleted) else {
            if let Some(vmi) = existing {
                self.state.lock().vmis.remove(&intf.name);
                self.delete_vmi(db, &vmi.vn, &intf.name);
            }
            return;
        };

        if !intf.is_lr_port() {
            return;
        }

        if let Some(vmi) = &existing {
            if vmi.vn != vn_name {
                self.delete_vmi(db, &vmi.vn, &intf.name);
            }
        }

        {
            let mut guard = self.state.lock();
            guard.vmis.insert(
                intf.name.clone(),
                VmiState {
                    vn: vn_name.to_string(),
                    logical_router: lr,
                },
            );
            if let Some(vn_state) = guard.vns.get_mut(vn_name) {
                for vmi in vn_state.vmis.iter_mut().filter(|v| v.name == intf.name) {
                    vmi.logical_router = Some(lr);
                }
            }
        }

        let Some(vn) = db.vn(vn_name) else {
            return;
        };
        self.vn_notify(db, EventKind::Changed, &vn);
        self.add_vmi(db, &vn, &intf.name, lr);
    }

    fn add_vmi(&self, db: &OperDb, vn: &VnEntry, vmi: &str, lr: LogicalRouterId) {
        let Some(mut state) = self.state.lock().vns.get(&vn.name).cloned() else {
            return;
        };
        if state.vmis.iter().any(|v| v.name == vmi) {
            return;
        }
        state.vmis.push(VmiRef {
            name: vmi.to_string(),
            logical_router: Some(lr),
        });

        let first = state.vmis.first().is_some_and(|v| v.name == vmi);
        if state.logical_router != Some(lr) && first {
            self.bridge_vn_notify(db, vn, &mut state);
        }
        self.state.lock().vns.insert(vn.name.clone(), state);
    }

    fn delete_vmi(&self, db: &OperDb, vn_name: &str, vmi: &str) {
        let Some(mut state) = self.state.lock().vns.get(vn_name).cloned() else {
            return;
        };
        let before = state.vmis.len();
        state.vmis.retain(|v| v.name != vmi);
        if state.vmis.len() == before {
            return;
        }

        if let Some(vn) = db.vn(vn_name) {
            self.bridge_vn_notify(db, &vn, &mut state);
        }
        self.state.lock().vns.insert(vn_name.to_string(), state);
    }

    // ------------------------------------------------------------------
    // VRF notifications
    // ------------------------------------------------------------------

    pub(crate) fn vrf_notify(&self, db: &OperDb, kind: EventKind, vrf: &VrfEntry) {
        RoutingStats::incr(&self.stats.notifications);
        if vrf.name == db.fabric_vrf_name() || vrf.name == db.fabric_policy_vrf_name() {
            return;
        }

        if kind == EventKind::Deleted || vrf.is_deleted() {
            let removed = self.state.lock().vrfs.remove(&vrf.name);
            if let Some(state) = removed {
                self.unregister_vrf(&state);
                debug!("{}: stopped listening to VRF {}", SOURCE, vrf.name);
            }
            return;
        }

        let routing_vrf = vrf
            .vn
            .as_deref()
            .and_then(|vn| db.vn(vn))
            .is_some_and(|vn| vn.vxlan_routing_vn);

        if let Some(state) = self.state.lock().vrfs.get_mut(&vrf.name) {
            state.routing_vrf |= routing_vrf;
            return;
        }

        let mut registrations = Vec::new();
        for table_kind in TableKind::ALL {
            let table = TableId::new(vrf.name.clone(), table_kind);
            let listener: Arc<dyn RouteListener> = self.listener.clone();
            match db.register_route_listener(&table, listener) {
                Ok(id) => registrations.push((table, id)),
                Err(e) => warn!("{}: cannot listen to {}: {}", SOURCE, table, e),
            }
        }
        debug!("{}: listening to VRF {} (routing: {})", SOURCE, vrf.name, routing_vrf);
        self.state.lock().vrfs.insert(
            vrf.name.clone(),
            VrfListenerState {
                routing_vrf,
                registrations,
            },
        );
    }

    fn unregister_vrf(&self, state: &VrfListenerState) {
        for (table, id) in &state.registrations {
            if let Err(e) = self.db.unregister_route_listener(table, *id) {
                debug!("{}: unregister {}: {}", SOURCE, table, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Walks
    // ------------------------------------------------------------------

    pub(super) fn start_walk(&self, db: &OperDb, table: TableId, purpose: WalkPurpose) {
        let sink: Weak<dyn WalkSink> = self.self_ref.clone();
        match self.walker.start(db, table, purpose, sink) {
            Some(WalkStatus::Scheduled) => RoutingStats::incr(&self.stats.walks_started),
            Some(WalkStatus::Coalesced) | Some(WalkStatus::Rearmed) => {
                RoutingStats::incr(&self.stats.walks_coalesced)
            }
            None => {}
        }
    }

    /// Walks the routing VRF EVPN table of `lr` to leak its Type-5 routes
    /// into the bridges.
    fn walk_routing_vrf(&self, db: &OperDb, lr: LogicalRouterId, vn: Option<&str>, update: bool) {
        let Some(routing_vrf) = self.state.lock().mapper.routing_vrf_of(&lr).map(str::to_string) else {
            return;
        };
        self.start_walk(
            db,
            TableId::evpn(routing_vrf),
            WalkPurpose::LeakIntoBridges {
                lr,
                vn: vn.map(str::to_string),
                update,
            },
        );
    }

    /// Walks the Inet tables of every bridge of `lr`.
    fn walk_bridge_vrfs(&self, db: &OperDb, lr: &LogicalRouterId) {
        let bridges = self.state.lock().mapper.bridges(lr);
        for vn in bridges {
            if let Some(vrf) = db.vn(&vn).and_then(|vn| vn.vrf) {
                self.walk_bridge_inet_tables(db, &vrf);
            }
        }
    }

    /// Walks every bridge of `lr` to drop the VRF next hops pointing at
    /// `routing_vrf`.
    fn walk_withdraw_bridges(&self, db: &OperDb, lr: &LogicalRouterId, routing_vrf: &str) {
        let bridges = self.state.lock().mapper.bridges(lr);
        for vn in bridges {
            let Some(vrf) = db.vn(&vn).and_then(|vn| vn.vrf) else {
                continue;
            };
            for kind in [TableKind::Inet4, TableKind::Inet6] {
                self.start_walk(
                    db,
                    TableId::new(vrf.clone(), kind),
                    WalkPurpose::WithdrawFromRoutingVrf {
                        routing_vrf: routing_vrf.to_string(),
                    },
                );
            }
        }
    }

    pub(super) fn walk_bridge_inet_tables(&self, db: &OperDb, vrf_name: &str) {
        for kind in [TableKind::Inet4, TableKind::Inet6] {
            self.start_walk(db, TableId::new(vrf_name, kind), WalkPurpose::Notify);
        }
        self.handle_subnet_route(db, vrf_name);
    }

    pub(super) fn walk_visit(&self, db: &OperDb, key: &WalkKey, entry: &RouteEntry) {
        match &key.purpose {
            WalkPurpose::Notify => self.route_notify(db, &key.table, entry),
            WalkPurpose::LeakIntoBridges { lr, vn, update } => {
                let result = self.leak_routes_into_bridge_tables(db, entry, *lr, vn.as_deref(), *update);
                self.isolate("leak_routes_into_bridge_tables", result);
            }
            WalkPurpose::WithdrawFromRoutingVrf { routing_vrf } => {
                self.withdraw_from_routing_vrf(db, entry, routing_vrf)
            }
        }
    }

    // ------------------------------------------------------------------
    // Route notifications
    // ------------------------------------------------------------------

    /// Dispatches a route change: bridge Inet routes take the forward leg,
    /// routing VRF EVPN routes the backward leg.
    pub(crate) fn route_notify(&self, db: &OperDb, table: &TableId, entry: &RouteEntry) {
        RoutingStats::incr(&self.stats.notifications);
        let Some(vn) = self.vn_of_vrf(db, entry.vrf()) else {
            return;
        };

        if table.is_inet() && !vn.vxlan_routing_vn {
            let result = self.inet_route_notify(db, entry);
            self.isolate("inet_route_notify", result);
        } else if table.kind == TableKind::Evpn && vn.vxlan_routing_vn {
            let result = self.evpn_route_notify(db, entry);
            self.isolate("evpn_route_notify", result);
        }
    }
}

impl WalkSink for RoutingManager {
    fn visit(&self, db: &OperDb, key: &WalkKey, entry: &RouteEntry) {
        self.walk_visit(db, key, entry);
    }

    fn walk_done(&self, db: &OperDb, key: &WalkKey) {
        debug!("{}: walk of {} ({:?}) done", SOURCE, key.table, key.purpose);
        self.walker.finish(db, key);
        // Subnet routes are recomputed after the walk's own deletions.
        if key.purpose == WalkPurpose::Notify && key.table.kind == TableKind::Inet4 {
            self.handle_subnet_route(db, &key.table.vrf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmpp::NoOpAdvertiser;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use vxlan_oper_db::OperDbConfig;

    fn setup() -> (Arc<OperDb>, Arc<RoutingManager>) {
        let db = Arc::new(OperDb::new(OperDbConfig::default()));
        let manager = RoutingManager::new(Arc::clone(&db), Arc::new(NoOpAdvertiser));
        manager.register();
        (db, manager)
    }

    #[test]
    fn test_vrf_listener_lifecycle() {
        let (db, manager) = setup();
        db.add_vrf(VrfEntry::new("vrf1"));
        db.add_vrf(VrfEntry::new(db.fabric_vrf_name()));
        db.process();

        assert_eq!(manager.listened_vrfs(), 1);
        assert_eq!(db.route_listener_count(&TableId::evpn("vrf1")), 1);

        db.delete_vrf("vrf1");
        db.process();
        assert_eq!(manager.listened_vrfs(), 0);
        assert_eq!(db.stats().dangling_listeners, 0);
    }

    #[test]
    fn test_register_replays_existing_objects() {
        let db = Arc::new(OperDb::new(OperDbConfig::default()));
        let lr = Uuid::new_v4();
        db.add_vrf(VrfEntry::new("vrf-r").with_vn("vn-r"));
        db.add_vn(VnEntry::new("vn-r").with_vrf("vrf-r").routing_for(lr));
        db.process();

        let manager = RoutingManager::new(Arc::clone(&db), Arc::new(NoOpAdvertiser));
        manager.register();
        db.process();

        assert!(manager.is_routing_vrf("vrf-r"));
        let info = manager.logical_router_info(&lr).unwrap();
        assert_eq!(info.routing_vrf.as_deref(), Some("vrf-r"));
        assert_eq!(info.routing_vn.as_deref(), Some("vn-r"));
    }

    #[test]
    fn test_second_routing_vn_takes_over_after_release() {
        let (db, manager) = setup();
        let lr = Uuid::new_v4();
        db.add_vrf(VrfEntry::new("vrf-r1").with_vn("vn-r1"));
        db.add_vrf(VrfEntry::new("vrf-r2").with_vn("vn-r2"));
        db.add_vn(VnEntry::new("vn-r1").with_vrf("vrf-r1").routing_for(lr));
        db.add_vn(VnEntry::new("vn-r2").with_vrf("vrf-r2").routing_for(lr));
        db.process();

        let info = manager.logical_router_info(&lr).unwrap();
        assert_eq!(info.routing_vn.as_deref(), Some("vn-r1"));
        assert_eq!(info.routing_vrf.as_deref(), Some("vrf-r1"));

        db.delete_vn("vn-r1");
        db.process();
        let info = manager.logical_router_info(&lr).unwrap();
        assert_eq!(info.routing_vn.as_deref(), Some("vn-r2"));
        assert_eq!(info.routing_vrf.as_deref(), Some("vrf-r2"));
    }

    #[test]
    fn test_bridge_lr_follows_first_port() {
        let (db, manager) = setup();
        let lr1 = Uuid::new_v4();
        let lr2 = Uuid::new_v4();
        db.add_vrf(VrfEntry::new("vrf1").with_vn("vn1"));
        db.add_vn(VnEntry::new("vn1").with_vrf("vrf1"));
        db.add_interface(VmInterface::lr_port("lr-port-1", "vn1", lr1));
        db.process();

        let bridges = manager.logical_router_info(&lr1).unwrap().bridge_vns;
        assert!(bridges.contains("vn1"));

        // Moving the only port moves the bridge.
        db.add_interface(VmInterface::lr_port("lr-port-1", "vn1", lr2));
        db.process();
        assert!(manager.logical_router_info(&lr1).is_none());
        assert!(manager.logical_router_info(&lr2).unwrap().bridge_vns.contains("vn1"));

        db.delete_interface("lr-port-1");
        db.process();
        assert!(manager.logical_routers().is_empty());
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (db, manager) = setup();
        db.add_vrf(VrfEntry::new("vrf1"));
        db.process();

        manager.shutdown();
        assert!(!manager.is_registered());
        assert_eq!(manager.listened_vrfs(), 0);
        assert_eq!(db.route_listener_count(&TableId::inet4("vrf1")), 0);
        assert_eq!(manager.walks_in_flight(), 0);
    }

    #[test]
    fn test_local_sequence_is_monotonic() {
        let (_db, manager) = setup();
        let first = manager.next_local_sequence();
        let second = manager.next_local_sequence();
        assert!(second > first);
    }
}
