//! The operational database.

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use vxlan_types::{IpAddress, Ipv4Address};

use crate::listener::{
    EventKind, ListenerId, ListenerRegistry, ObjectListener, ObjectTable, RouteEvent, RouteListener,
};
use crate::objects::{ObjectStore, VmInterface, VnEntry, VrfEntry};
use crate::request::{DbRequest, ObjectRequest, RequestQueue, RouteRequest};
use crate::route::{AgentPath, Peer, RouteEntry, RouteKey};
use crate::table::{RouteTable, TableId, TableKind};
use crate::walker::{PassEnd, WalkHandle, WalkStatus, WalkVisitor, WalkerRegistry};
use crate::{DbError, Result};

/// Configuration for the operational database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperDbConfig {
    /// Name of the underlay (fabric) VRF.
    pub fabric_vrf: String,
    /// Name of the fabric policy VRF holding compute node host routes.
    pub fabric_policy_vrf: String,
    /// Address of this compute node.
    pub router_id: Ipv4Address,
}

impl Default for OperDbConfig {
    fn default() -> Self {
        Self {
            fabric_vrf: "default-domain:default-project:ip-fabric:__default__".to_string(),
            fabric_policy_vrf: "default-domain:default-project:ip-fabric:ip-fabric".to_string(),
            router_id: Ipv4Address::UNSPECIFIED,
        }
    }
}

/// Statistics for database processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    /// Route requests that changed a table.
    pub route_changes: u64,
    /// Route requests that matched the current state.
    pub route_noops: u64,
    /// Route requests for tables that do not exist.
    pub route_drops: u64,
    /// Object requests applied.
    pub object_changes: u64,
    /// Events delivered to listeners.
    pub events_dispatched: u64,
    /// Walk passes executed.
    pub walk_passes: u64,
    /// Route listeners still registered when their VRF was deleted.
    pub dangling_listeners: u64,
}

/// Outcome of one [`OperDb::process`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub requests: usize,
    pub walk_passes: usize,
}

/// In-memory VN/VRF/interface objects and per-VRF route tables.
///
/// All mutations are queued and applied by [`process`](Self::process), which
/// dispatches change events to listeners until the queue is empty. Reads are
/// served from the applied state.
pub struct OperDb {
    config: OperDbConfig,
    objects: RwLock<ObjectStore>,
    tables: RwLock<BTreeMap<TableId, RouteTable>>,
    bgp_as_a_service: RwLock<BTreeSet<IpAddress>>,
    queue: Mutex<RequestQueue>,
    listeners: RwLock<ListenerRegistry>,
    walkers: Mutex<WalkerRegistry>,
    stats: Mutex<DbStats>,
}

impl std::fmt::Debug for OperDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperDb")
            .field("config", &self.config)
            .field("table_count", &self.tables.read().len())
            .field("pending", &self.queue.lock().len())
            .finish()
    }
}

impl OperDb {
    pub fn new(config: OperDbConfig) -> Self {
        Self {
            config,
            objects: RwLock::new(ObjectStore::default()),
            tables: RwLock::new(BTreeMap::new()),
            bgp_as_a_service: RwLock::new(BTreeSet::new()),
            queue: Mutex::new(RequestQueue::default()),
            listeners: RwLock::new(ListenerRegistry::default()),
            walkers: Mutex::new(WalkerRegistry::default()),
            stats: Mutex::new(DbStats::default()),
        }
    }

    pub fn config(&self) -> &OperDbConfig {
        &self.config
    }

    pub fn router_id(&self) -> Ipv4Address {
        self.config.router_id
    }

    pub fn fabric_vrf_name(&self) -> &str {
        &self.config.fabric_vrf
    }

    pub fn fabric_policy_vrf_name(&self) -> &str {
        &self.config.fabric_policy_vrf
    }

    pub fn stats(&self) -> DbStats {
        self.stats.lock().clone()
    }

    // ------------------------------------------------------------------
    // Object requests
    // ------------------------------------------------------------------

    pub fn add_vn(&self, vn: VnEntry) {
        self.submit_object(ObjectRequest::AddVn(vn));
    }

    pub fn delete_vn(&self, name: impl Into<String>) {
        self.submit_object(ObjectRequest::DeleteVn(name.into()));
    }

    pub fn add_vrf(&self, vrf: VrfEntry) {
        self.submit_object(ObjectRequest::AddVrf(vrf));
    }

    pub fn delete_vrf(&self, name: impl Into<String>) {
        self.submit_object(ObjectRequest::DeleteVrf(name.into()));
    }

    pub fn add_interface(&self, intf: VmInterface) {
        self.submit_object(ObjectRequest::AddInterface(intf));
    }

    pub fn delete_interface(&self, name: impl Into<String>) {
        self.submit_object(ObjectRequest::DeleteInterface(name.into()));
    }

    pub fn submit_object(&self, request: ObjectRequest) {
        self.queue.lock().push_object(request);
    }

    // ------------------------------------------------------------------
    // Route requests
    // ------------------------------------------------------------------

    pub fn add_route(&self, table: TableId, key: RouteKey, path: AgentPath) {
        self.submit_route(RouteRequest::add(table, key, path));
    }

    pub fn delete_route(&self, table: TableId, key: RouteKey, peer: Peer) {
        self.submit_route(RouteRequest::delete(table, key, peer));
    }

    pub fn submit_route(&self, request: RouteRequest) {
        self.queue.lock().push_route(request);
    }

    // ------------------------------------------------------------------
    // BGP-as-a-Service registry
    // ------------------------------------------------------------------

    pub fn add_bgp_as_a_service(&self, addr: IpAddress) {
        self.bgp_as_a_service.write().insert(addr);
    }

    pub fn remove_bgp_as_a_service(&self, addr: &IpAddress) -> bool {
        self.bgp_as_a_service.write().remove(addr)
    }

    pub fn is_bgp_as_a_service(&self, addr: &IpAddress) -> bool {
        self.bgp_as_a_service.read().contains(addr)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn vn(&self, name: &str) -> Option<VnEntry> {
        self.objects.read().vns.get(name).cloned()
    }

    pub fn vrf(&self, name: &str) -> Option<VrfEntry> {
        self.objects.read().vrfs.get(name).cloned()
    }

    pub fn interface(&self, name: &str) -> Option<VmInterface> {
        self.objects.read().interfaces.get(name).cloned()
    }

    pub fn vns(&self) -> Vec<VnEntry> {
        self.objects.read().vns.values().cloned().collect()
    }

    pub fn vrfs(&self) -> Vec<VrfEntry> {
        self.objects.read().vrfs.values().cloned().collect()
    }

    pub fn interfaces(&self) -> Vec<VmInterface> {
        self.objects.read().interfaces.values().cloned().collect()
    }

    pub fn table_exists(&self, table: &TableId) -> bool {
        self.tables.read().contains_key(table)
    }

    pub fn find_route(&self, table: &TableId, key: &RouteKey) -> Option<RouteEntry> {
        self.tables.read().get(table)?.find_exact(key).cloned()
    }

    /// Longest-prefix match in an Inet table.
    pub fn find_lpm(&self, table: &TableId, addr: &IpAddress) -> Option<RouteEntry> {
        self.tables.read().get(table)?.find_lpm(addr).cloned()
    }

    pub fn table_entries(&self, table: &TableId) -> Vec<RouteEntry> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.snapshot())
            .unwrap_or_default()
    }

    pub fn route_count(&self, table: &TableId) -> usize {
        self.tables.read().get(table).map(|t| t.len()).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn register_route_listener(
        &self,
        table: &TableId,
        listener: Arc<dyn RouteListener>,
    ) -> Result<ListenerId> {
        if !self.table_exists(table) {
            return Err(DbError::TableNotFound(table.to_string()));
        }
        Ok(self.listeners.write().add_route(table.clone(), listener))
    }

    pub fn unregister_route_listener(&self, table: &TableId, id: ListenerId) -> Result<()> {
        if self.listeners.write().remove_route(table, id) {
            Ok(())
        } else {
            Err(DbError::ListenerNotFound(id))
        }
    }

    pub fn route_listener_count(&self, table: &TableId) -> usize {
        self.listeners.read().route_listener_count(table)
    }

    pub fn register_object_listener(
        &self,
        table: ObjectTable,
        listener: Arc<dyn ObjectListener>,
    ) -> ListenerId {
        self.listeners.write().add_object(table, listener)
    }

    pub fn unregister_object_listener(&self, table: ObjectTable, id: ListenerId) -> Result<()> {
        if self.listeners.write().remove_object(table, id) {
            Ok(())
        } else {
            Err(DbError::ListenerNotFound(id))
        }
    }

    // ------------------------------------------------------------------
    // Walkers
    // ------------------------------------------------------------------

    pub fn alloc_walker(&self, table: TableId, visitor: Arc<dyn WalkVisitor>) -> WalkHandle {
        self.walkers.lock().alloc(table, visitor)
    }

    /// Starts a pass of `handle`, or merges into the one already pending.
    pub fn walk(&self, handle: WalkHandle) -> Result<WalkStatus> {
        let status = self
            .walkers
            .lock()
            .request(handle)
            .ok_or(DbError::WalkerNotFound(handle))?;
        if status == WalkStatus::Scheduled {
            self.queue.lock().push_walk(handle);
        }
        Ok(status)
    }

    /// Releases a walker. A pending pass is cancelled and `walk_done` is not
    /// reported.
    pub fn release_walker(&self, handle: WalkHandle) -> Result<()> {
        if self.walkers.lock().release(handle) {
            Ok(())
        } else {
            Err(DbError::WalkerNotFound(handle))
        }
    }

    pub fn walker_count(&self) -> usize {
        self.walkers.lock().len()
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    pub fn has_pending(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    pub fn dump_pending(&self) -> Vec<String> {
        self.queue.lock().dump()
    }

    /// Applies queued requests until the queue is empty, including requests
    /// queued by listeners while processing.
    pub fn process(&self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        while let Some(walked) = self.process_one() {
            summary.requests += 1;
            if walked {
                summary.walk_passes += 1;
            }
        }
        summary
    }

    /// Applies a single queued request. Returns `None` when the queue is
    /// empty, otherwise whether the request was a walk pass.
    pub fn process_one(&self) -> Option<bool> {
        let request = self.queue.lock().pop()?;
        match request {
            DbRequest::Route(route) => {
                self.apply_route(route);
                Some(false)
            }
            DbRequest::Object(object) => {
                self.apply_object(object);
                Some(false)
            }
            DbRequest::Walk(handle) => {
                self.run_walk(handle);
                Some(true)
            }
        }
    }

    fn apply_route(&self, request: RouteRequest) {
        let outcome = {
            let mut tables = self.tables.write();
            let Some(table) = tables.get_mut(request.table()) else {
                debug!("OperDb: dropping request for missing table {}", request.table());
                self.stats.lock().route_drops += 1;
                return;
            };
            match &request {
                RouteRequest::AddOrUpdate { key, path, .. } => table.add_path(key, path.clone()),
                RouteRequest::Delete { key, peer, .. } => table.delete_path(key, peer),
            }
        };

        match outcome {
            Some((kind, entry)) => {
                self.stats.lock().route_changes += 1;
                self.dispatch_route(request.table(), kind, &entry);
            }
            None => self.stats.lock().route_noops += 1,
        }
    }

    fn dispatch_route(&self, table: &TableId, kind: EventKind, entry: &RouteEntry) {
        let listeners = self.listeners.read().route_listeners(table);
        let event = RouteEvent { kind, table, entry };
        for listener in &listeners {
            listener.on_route_event(self, &event);
        }
        self.stats.lock().events_dispatched += listeners.len() as u64;
    }

    fn apply_object(&self, request: ObjectRequest) {
        self.stats.lock().object_changes += 1;
        match request {
            ObjectRequest::AddVn(vn) => {
                let kind = upsert(&mut self.objects.write().vns, vn.name.clone(), vn.clone());
                self.dispatch_object(ObjectTable::Vn, |l| l.on_vn_event(self, kind, &vn));
            }
            ObjectRequest::DeleteVn(name) => {
                let Some(mut vn) = self.objects.write().vns.remove(&name) else {
                    return;
                };
                vn.deleted = true;
                self.dispatch_object(ObjectTable::Vn, |l| {
                    l.on_vn_event(self, EventKind::Deleted, &vn)
                });
            }
            ObjectRequest::AddVrf(vrf) => {
                let kind = upsert(&mut self.objects.write().vrfs, vrf.name.clone(), vrf.clone());
                if kind == EventKind::Added {
                    let mut tables = self.tables.write();
                    for table_kind in TableKind::ALL {
                        let id = TableId::new(vrf.name.clone(), table_kind);
                        tables.insert(id.clone(), RouteTable::new(id));
                    }
                    info!("OperDb: Added VRF {}", vrf.name);
                }
                self.dispatch_object(ObjectTable::Vrf, |l| l.on_vrf_event(self, kind, &vrf));
            }
            ObjectRequest::DeleteVrf(name) => self.remove_vrf(&name),
            ObjectRequest::AddInterface(intf) => {
                let kind = upsert(
                    &mut self.objects.write().interfaces,
                    intf.name.clone(),
                    intf.clone(),
                );
                self.dispatch_object(ObjectTable::Interface, |l| {
                    l.on_interface_event(self, kind, &intf)
                });
            }
            ObjectRequest::DeleteInterface(name) => {
                let Some(mut intf) = self.objects.write().interfaces.remove(&name) else {
                    return;
                };
                intf.deleted = true;
                self.dispatch_object(ObjectTable::Interface, |l| {
                    l.on_interface_event(self, EventKind::Deleted, &intf)
                });
            }
        }
    }

    /// Flushes the VRF's routes while the VRF is still readable (route
    /// listeners see each deletion), then removes the VRF, reports it and
    /// finally drops the tables.
    fn remove_vrf(&self, name: &str) {
        if !self.objects.read().vrfs.contains_key(name) {
            return;
        }

        for kind in TableKind::ALL {
            let id = TableId::new(name, kind);
            let flushed = self
                .tables
                .write()
                .get_mut(&id)
                .map(|t| t.flush())
                .unwrap_or_default();
            for entry in &flushed {
                self.dispatch_route(&id, EventKind::Deleted, entry);
            }
        }

        let Some(mut vrf) = self.objects.write().vrfs.remove(name) else {
            return;
        };
        vrf.deleted = true;
        self.dispatch_object(ObjectTable::Vrf, |l| {
            l.on_vrf_event(self, EventKind::Deleted, &vrf)
        });

        let mut tables = self.tables.write();
        for kind in TableKind::ALL {
            let id = TableId::new(name, kind);
            tables.remove(&id);
            let dangling = self.listeners.write().drop_table(&id);
            if dangling > 0 {
                warn!("OperDb: {} listener(s) still registered on deleted table {}", dangling, id);
                self.stats.lock().dangling_listeners += dangling as u64;
            }
        }
        info!("OperDb: Removed VRF {}", name);
    }

    fn dispatch_object<F>(&self, table: ObjectTable, notify: F)
    where
        F: Fn(&dyn ObjectListener),
    {
        let listeners = self.listeners.read().object_listeners(table);
        for listener in &listeners {
            notify(listener.as_ref());
        }
        self.stats.lock().events_dispatched += listeners.len() as u64;
    }

    fn run_walk(&self, handle: WalkHandle) {
        let Some((table, visitor)) = self.walkers.lock().begin(handle) else {
            debug!("OperDb: skipping released walker {}", handle);
            return;
        };

        let entries = self.table_entries(&table);
        for entry in &entries {
            visitor.visit(self, &table, entry);
        }
        self.stats.lock().walk_passes += 1;

        let end = self.walkers.lock().end(handle);
        match end {
            PassEnd::Again => self.queue.lock().push_walk(handle),
            PassEnd::Done(table, visitor) => visitor.walk_done(self, &table),
            PassEnd::Gone => {}
        }
    }
}

fn upsert<T: PartialEq>(map: &mut BTreeMap<String, T>, key: String, value: T) -> EventKind {
    match map.insert(key, value) {
        Some(_) => EventKind::Changed,
        None => EventKind::Added,
    }
}
