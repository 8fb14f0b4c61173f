//! Coalescing table walks.
//!
//! A walk is identified by its table and its purpose. At most one walker
//! exists per identity; requesting a walk that is already pending or
//! running re-arms the existing walker instead of allocating another one.
//! The walker is released when its last pass completes.

use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use vxlan_oper_db::{OperDb, RouteEntry, TableId, WalkHandle, WalkStatus, WalkVisitor};

use super::types::LogicalRouterId;

/// What a walk does with each visited entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WalkPurpose {
    /// Re-run route notification over every entry of the table.
    Notify,
    /// Leak routing VRF Type-5 entries into the bridges of `lr`; only into
    /// `vn` when it is given and `update` is set.
    LeakIntoBridges {
        lr: LogicalRouterId,
        vn: Option<String>,
        update: bool,
    },
    /// Withdraw what a departing bridge exported into `routing_vrf`.
    WithdrawFromRoutingVrf { routing_vrf: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalkKey {
    pub table: TableId,
    pub purpose: WalkPurpose,
}

/// Receiver of walk callbacks.
pub trait WalkSink: Send + Sync {
    fn visit(&self, db: &OperDb, key: &WalkKey, entry: &RouteEntry);

    fn walk_done(&self, db: &OperDb, key: &WalkKey);
}

struct KeyedVisitor {
    key: WalkKey,
    sink: Weak<dyn WalkSink>,
}

impl WalkVisitor for KeyedVisitor {
    fn visit(&self, db: &OperDb, _table: &TableId, entry: &RouteEntry) {
        if let Some(sink) = self.sink.upgrade() {
            sink.visit(db, &self.key, entry);
        }
    }

    fn walk_done(&self, db: &OperDb, _table: &TableId) {
        if let Some(sink) = self.sink.upgrade() {
            sink.walk_done(db, &self.key);
        }
    }
}

/// Per-(table, purpose) walker slots.
#[derive(Default)]
pub struct RouteWalker {
    slots: Mutex<BTreeMap<WalkKey, WalkHandle>>,
}

impl std::fmt::Debug for RouteWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteWalker")
            .field("in_flight", &self.slots.lock().len())
            .finish()
    }
}

impl RouteWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a pass over `table`. Returns how the request was merged, or
    /// `None` if the walk could not be started.
    pub fn start(
        &self,
        db: &OperDb,
        table: TableId,
        purpose: WalkPurpose,
        sink: Weak<dyn WalkSink>,
    ) -> Option<WalkStatus> {
        let key = WalkKey { table, purpose };
        let handle = {
            let mut slots = self.slots.lock();
            match slots.get(&key) {
                Some(handle) => *handle,
                None => {
                    let visitor = Arc::new(KeyedVisitor {
                        key: key.clone(),
                        sink,
                    });
                    let handle = db.alloc_walker(key.table.clone(), visitor);
                    slots.insert(key.clone(), handle);
                    handle
                }
            }
        };

        match db.walk(handle) {
            Ok(status) => {
                debug!("RouteWalker: {} {:?} -> {:?}", key.table, key.purpose, status);
                Some(status)
            }
            Err(e) => {
                warn!("RouteWalker: failed to start walk of {}: {}", key.table, e);
                self.slots.lock().remove(&key);
                None
            }
        }
    }

    /// Releases the walker of `key` after its last pass.
    pub fn finish(&self, db: &OperDb, key: &WalkKey) {
        let Some(handle) = self.slots.lock().remove(key) else {
            return;
        };
        if let Err(e) = db.release_walker(handle) {
            debug!("RouteWalker: release of {} failed: {}", handle, e);
        }
    }

    /// Releases every walker, cancelling pending passes. Returns how many
    /// were released.
    pub fn release_all(&self, db: &OperDb) -> usize {
        let slots = std::mem::take(&mut *self.slots.lock());
        for handle in slots.values() {
            if let Err(e) = db.release_walker(*handle) {
                debug!("RouteWalker: release of {} failed: {}", handle, e);
            }
        }
        slots.len()
    }

    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}
