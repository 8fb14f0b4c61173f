//! Queued mutation requests.
//!
//! Table and object mutations are never applied from inside a listener
//! callback. They are queued here and applied in arrival order by
//! [`OperDb::process`](crate::OperDb::process).
//!
//! # Deduplication
//!
//! Route requests for the same (table, key, peer) are merged while pending:
//! - a newer add replaces the path of a pending add in place
//! - a delete cancels the pending add and is queued behind everything else

use std::collections::{BTreeMap, HashMap};

use crate::objects::{VmInterface, VnEntry, VrfEntry};
use crate::route::{AgentPath, Peer, RouteKey};
use crate::table::TableId;
use crate::walker::WalkHandle;

/// A route table mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRequest {
    AddOrUpdate {
        table: TableId,
        key: RouteKey,
        path: AgentPath,
    },
    Delete {
        table: TableId,
        key: RouteKey,
        peer: Peer,
    },
}

impl RouteRequest {
    pub fn add(table: TableId, key: RouteKey, path: AgentPath) -> Self {
        RouteRequest::AddOrUpdate { table, key, path }
    }

    pub fn delete(table: TableId, key: RouteKey, peer: Peer) -> Self {
        RouteRequest::Delete { table, key, peer }
    }

    pub fn table(&self) -> &TableId {
        match self {
            RouteRequest::AddOrUpdate { table, .. } | RouteRequest::Delete { table, .. } => table,
        }
    }

    pub fn key(&self) -> &RouteKey {
        match self {
            RouteRequest::AddOrUpdate { key, .. } | RouteRequest::Delete { key, .. } => key,
        }
    }

    pub fn peer(&self) -> &Peer {
        match self {
            RouteRequest::AddOrUpdate { path, .. } => &path.peer,
            RouteRequest::Delete { peer, .. } => peer,
        }
    }

    fn dedup_key(&self) -> PendingRouteKey {
        (self.table().clone(), self.key().normalized(), self.peer().clone())
    }
}

/// An object table mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectRequest {
    AddVn(VnEntry),
    DeleteVn(String),
    AddVrf(VrfEntry),
    DeleteVrf(String),
    AddInterface(VmInterface),
    DeleteInterface(String),
}

pub(crate) enum DbRequest {
    Route(RouteRequest),
    Object(ObjectRequest),
    Walk(WalkHandle),
}

type PendingRouteKey = (TableId, RouteKey, Peer);

/// FIFO of pending requests with per-route deduplication.
#[derive(Default)]
pub(crate) struct RequestQueue {
    next_seq: u64,
    pending: BTreeMap<u64, DbRequest>,
    pending_adds: HashMap<PendingRouteKey, u64>,
}

impl RequestQueue {
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn push_back(&mut self, request: DbRequest) -> u64 {
        self.next_seq = self.next_seq.saturating_add(1);
        self.pending.insert(self.next_seq, request);
        self.next_seq
    }

    pub(crate) fn push_route(&mut self, request: RouteRequest) {
        let dedup_key = request.dedup_key();
        match request {
            RouteRequest::AddOrUpdate { .. } => {
                if let Some(seq) = self.pending_adds.get(&dedup_key) {
                    if let Some(slot) = self.pending.get_mut(seq) {
                        *slot = DbRequest::Route(request);
                        return;
                    }
                }
                let seq = self.push_back(DbRequest::Route(request));
                self.pending_adds.insert(dedup_key, seq);
            }
            RouteRequest::Delete { .. } => {
                if let Some(seq) = self.pending_adds.remove(&dedup_key) {
                    self.pending.remove(&seq);
                }
                self.push_back(DbRequest::Route(request));
            }
        }
    }

    pub(crate) fn push_object(&mut self, request: ObjectRequest) {
        self.push_back(DbRequest::Object(request));
    }

    pub(crate) fn push_walk(&mut self, handle: WalkHandle) {
        self.push_back(DbRequest::Walk(handle));
    }

    pub(crate) fn pop(&mut self) -> Option<DbRequest> {
        let (seq, request) = self.pending.pop_first()?;
        if let DbRequest::Route(route @ RouteRequest::AddOrUpdate { .. }) = &request {
            let dedup_key = route.dedup_key();
            if self.pending_adds.get(&dedup_key) == Some(&seq) {
                self.pending_adds.remove(&dedup_key);
            }
        }
        Some(request)
    }

    /// Dumps pending requests for debugging.
    pub(crate) fn dump(&self) -> Vec<String> {
        self.pending
            .iter()
            .map(|(seq, request)| match request {
                DbRequest::Route(RouteRequest::AddOrUpdate { table, key, path }) => {
                    format!("{}: ADD {} {} peer={}", seq, table, key, path.peer)
                }
                DbRequest::Route(RouteRequest::Delete { table, key, peer }) => {
                    format!("{}: DEL {} {} peer={}", seq, table, key, peer)
                }
                DbRequest::Object(object) => format!("{}: OBJECT {:?}", seq, object),
                DbRequest::Walk(handle) => format!("{}: WALK {}", seq, handle),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{NextHop, PeerType};
    use pretty_assertions::assert_eq;

    fn add(tags: Vec<u32>) -> RouteRequest {
        let peer = Peer::new("tap1", PeerType::LocalVmPort);
        RouteRequest::add(
            TableId::inet4("vrf1"),
            RouteKey::Inet("1.1.1.10/32".parse().unwrap()),
            AgentPath::new(peer, NextHop::interface("tap1")).with_tags(tags),
        )
    }

    fn del() -> RouteRequest {
        RouteRequest::delete(
            TableId::inet4("vrf1"),
            RouteKey::Inet("1.1.1.10/32".parse().unwrap()),
            Peer::new("tap1", PeerType::LocalVmPort),
        )
    }

    #[test]
    fn test_add_merges_into_pending_add() {
        let mut queue = RequestQueue::default();
        queue.push_route(add(vec![1]));
        queue.push_route(add(vec![2]));
        assert_eq!(queue.len(), 1);

        match queue.pop() {
            Some(DbRequest::Route(RouteRequest::AddOrUpdate { path, .. })) => {
                assert_eq!(path.tags, vec![2]);
            }
            _ => panic!("expected merged add"),
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_delete_cancels_pending_add() {
        let mut queue = RequestQueue::default();
        queue.push_route(add(vec![1]));
        queue.push_route(del());
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue.pop(),
            Some(DbRequest::Route(RouteRequest::Delete { .. }))
        ));
    }

    #[test]
    fn test_add_after_delete_keeps_order() {
        let mut queue = RequestQueue::default();
        queue.push_route(del());
        queue.push_route(add(vec![1]));
        assert_eq!(queue.len(), 2);
        assert!(matches!(queue.pop(), Some(DbRequest::Route(RouteRequest::Delete { .. }))));
        assert!(matches!(queue.pop(), Some(DbRequest::Route(RouteRequest::AddOrUpdate { .. }))));
    }

    #[test]
    fn test_dump() {
        let mut queue = RequestQueue::default();
        queue.push_route(add(vec![]));
        let dump = queue.dump();
        assert_eq!(dump.len(), 1);
        assert!(dump[0].contains("ADD vrf1.inet.0 1.1.1.10/32"));
    }
}
