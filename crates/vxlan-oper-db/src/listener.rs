//! Typed change notification for object and route tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::db::OperDb;
use crate::objects::{VmInterface, VnEntry, VrfEntry};
use crate::route::RouteEntry;
use crate::table::TableId;

/// Registration handle returned by the `register_*` calls.
pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Changed,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Added => write!(f, "added"),
            EventKind::Changed => write!(f, "changed"),
            EventKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A change of one route entry. For `Deleted` the entry is already gone
/// from the table and `entry.is_deleted()` is true.
#[derive(Debug, Clone, Copy)]
pub struct RouteEvent<'a> {
    pub kind: EventKind,
    pub table: &'a TableId,
    pub entry: &'a RouteEntry,
}

/// Subscriber of one route table.
///
/// Callbacks run with no database lock held. They may read the database and
/// queue further requests, which are applied after the callback returns.
pub trait RouteListener: Send + Sync {
    fn on_route_event(&self, db: &OperDb, event: &RouteEvent<'_>);
}

/// Object tables that accept listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectTable {
    Vn,
    Vrf,
    Interface,
}

/// Subscriber of the object tables. Only the handler of the table the
/// listener was registered on is invoked.
pub trait ObjectListener: Send + Sync {
    fn on_vn_event(&self, _db: &OperDb, _kind: EventKind, _vn: &VnEntry) {}

    fn on_vrf_event(&self, _db: &OperDb, _kind: EventKind, _vrf: &VrfEntry) {}

    fn on_interface_event(&self, _db: &OperDb, _kind: EventKind, _intf: &VmInterface) {}
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: ListenerId,
    routes: BTreeMap<TableId, BTreeMap<ListenerId, Arc<dyn RouteListener>>>,
    objects: BTreeMap<ObjectTable, BTreeMap<ListenerId, Arc<dyn ObjectListener>>>,
}

impl ListenerRegistry {
    fn allocate_id(&mut self) -> ListenerId {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    pub(crate) fn add_route(&mut self, table: TableId, listener: Arc<dyn RouteListener>) -> ListenerId {
        let id = self.allocate_id();
        self.routes.entry(table).or_default().insert(id, listener);
        id
    }

    pub(crate) fn remove_route(&mut self, table: &TableId, id: ListenerId) -> bool {
        let Some(listeners) = self.routes.get_mut(table) else {
            return false;
        };
        let removed = listeners.remove(&id).is_some();
        if listeners.is_empty() {
            self.routes.remove(table);
        }
        removed
    }

    /// Drops every registration on `table`, returning how many there were.
    pub(crate) fn drop_table(&mut self, table: &TableId) -> usize {
        self.routes.remove(table).map(|l| l.len()).unwrap_or(0)
    }

    pub(crate) fn route_listeners(&self, table: &TableId) -> Vec<Arc<dyn RouteListener>> {
        self.routes
            .get(table)
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn route_listener_count(&self, table: &TableId) -> usize {
        self.routes.get(table).map(|l| l.len()).unwrap_or(0)
    }

    pub(crate) fn add_object(&mut self, table: ObjectTable, listener: Arc<dyn ObjectListener>) -> ListenerId {
        let id = self.allocate_id();
        self.objects.entry(table).or_default().insert(id, listener);
        id
    }

    pub(crate) fn remove_object(&mut self, table: ObjectTable, id: ListenerId) -> bool {
        self.objects
            .get_mut(&table)
            .map(|l| l.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn object_listeners(&self, table: ObjectTable) -> Vec<Arc<dyn ObjectListener>> {
        self.objects
            .get(&table)
            .map(|l| l.values().cloned().collect())
            .unwrap_or_default()
    }
}
