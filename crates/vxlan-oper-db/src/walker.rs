//! Table walkers.
//!
//! A walker is allocated once per (table, visitor) and then started any
//! number of times. Starting a walker that is already queued is a no-op;
//! starting one that is running re-arms it, so a fresh pass follows the
//! current one. The visitor's `walk_done` runs once, after the last pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::db::OperDb;
use crate::route::RouteEntry;
use crate::table::TableId;

/// Visitor invoked for every entry of a walked table.
pub trait WalkVisitor: Send + Sync {
    fn visit(&self, db: &OperDb, table: &TableId, entry: &RouteEntry);

    fn walk_done(&self, _db: &OperDb, _table: &TableId) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalkHandle(u64);

impl fmt::Display for WalkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "walk#{}", self.0)
    }
}

/// Result of a walk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStatus {
    /// A new pass was queued.
    Scheduled,
    /// A pass was already queued; the request merged into it.
    Coalesced,
    /// A pass is running; another pass follows it.
    Rearmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Idle,
    Queued,
    Running { rearm: bool },
}

struct WalkerSlot {
    table: TableId,
    visitor: Arc<dyn WalkVisitor>,
    state: WalkState,
}

/// What to do once a pass has visited every entry.
pub(crate) enum PassEnd {
    /// Re-armed while running: queue another pass.
    Again,
    /// Settled: report completion.
    Done(TableId, Arc<dyn WalkVisitor>),
    /// Released while running.
    Gone,
}

#[derive(Default)]
pub(crate) struct WalkerRegistry {
    next_id: u64,
    slots: BTreeMap<WalkHandle, WalkerSlot>,
}

impl WalkerRegistry {
    pub(crate) fn alloc(&mut self, table: TableId, visitor: Arc<dyn WalkVisitor>) -> WalkHandle {
        self.next_id = self.next_id.saturating_add(1);
        let handle = WalkHandle(self.next_id);
        self.slots.insert(
            handle,
            WalkerSlot {
                table,
                visitor,
                state: WalkState::Idle,
            },
        );
        handle
    }

    pub(crate) fn request(&mut self, handle: WalkHandle) -> Option<WalkStatus> {
        let slot = self.slots.get_mut(&handle)?;
        let status = match slot.state {
            WalkState::Idle => {
                slot.state = WalkState::Queued;
                WalkStatus::Scheduled
            }
            WalkState::Queued => WalkStatus::Coalesced,
            WalkState::Running { .. } => {
                slot.state = WalkState::Running { rearm: true };
                WalkStatus::Rearmed
            }
        };
        Some(status)
    }

    /// Moves a queued walker to running. `None` if it was released.
    pub(crate) fn begin(&mut self, handle: WalkHandle) -> Option<(TableId, Arc<dyn WalkVisitor>)> {
        let slot = self.slots.get_mut(&handle)?;
        slot.state = WalkState::Running { rearm: false };
        Some((slot.table.clone(), Arc::clone(&slot.visitor)))
    }

    pub(crate) fn end(&mut self, handle: WalkHandle) -> PassEnd {
        let Some(slot) = self.slots.get_mut(&handle) else {
            return PassEnd::Gone;
        };
        match slot.state {
            WalkState::Running { rearm: true } => {
                slot.state = WalkState::Queued;
                PassEnd::Again
            }
            _ => {
                slot.state = WalkState::Idle;
                PassEnd::Done(slot.table.clone(), Arc::clone(&slot.visitor))
            }
        }
    }

    pub(crate) fn release(&mut self, handle: WalkHandle) -> bool {
        self.slots.remove(&handle).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
