//! Operational database for VXLAN routing.
//!
//! Holds the object tables (virtual networks, VRFs, VM interfaces) and one
//! Inet-v4, Inet-v6 and EVPN route table per VRF. Every mutation is queued
//! and applied by [`OperDb::process`], which notifies the registered
//! listeners of each change. Listeners may queue further mutations from
//! their callbacks; processing continues until the queue drains.
//!
//! Table walkers visit every entry of a table and coalesce repeated
//! requests into a single pending pass.

mod db;
mod listener;
mod objects;
mod request;
mod route;
mod table;
mod walker;

pub use db::{DbStats, OperDb, OperDbConfig, ProcessSummary};
pub use listener::{EventKind, ListenerId, ObjectListener, ObjectTable, RouteEvent, RouteListener};
pub use objects::{DeviceType, VmInterface, VmiType, VnEntry, VnIpam, VrfEntry};
pub use request::{ObjectRequest, RouteRequest};
pub use route::{
    AgentPath, EcmpLoadBalance, EvpnKey, InterfaceNextHop, NextHop, PathPreference, Peer, PeerType,
    RouteEntry, RouteKey, TunnelNextHop,
};
pub use table::{TableId, TableKind};
pub use walker::{WalkHandle, WalkStatus, WalkVisitor};

/// Errors returned by database registration calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    #[error("route table not found: {0}")]
    TableNotFound(String),

    #[error("listener not found: {0}")]
    ListenerNotFound(ListenerId),

    #[error("walker not found: {0}")]
    WalkerNotFound(WalkHandle),
}

pub type Result<T> = std::result::Result<T, DbError>;
