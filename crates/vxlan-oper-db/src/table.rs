//! Per-VRF route tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use vxlan_types::{IpAddress, IpPrefix};

use crate::listener::EventKind;
use crate::route::{AgentPath, Peer, RouteEntry, RouteKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Inet4,
    Inet6,
    Evpn,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [TableKind::Inet4, TableKind::Inet6, TableKind::Evpn];
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableKind::Inet4 => "inet.0",
            TableKind::Inet6 => "inet6.0",
            TableKind::Evpn => "evpn.0",
        };
        f.write_str(name)
    }
}

/// Identity of one route table: VRF name plus table kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    pub vrf: String,
    pub kind: TableKind,
}

impl TableId {
    pub fn new(vrf: impl Into<String>, kind: TableKind) -> Self {
        Self {
            vrf: vrf.into(),
            kind,
        }
    }

    pub fn inet4(vrf: impl Into<String>) -> Self {
        Self::new(vrf, TableKind::Inet4)
    }

    pub fn inet6(vrf: impl Into<String>) -> Self {
        Self::new(vrf, TableKind::Inet6)
    }

    pub fn evpn(vrf: impl Into<String>) -> Self {
        Self::new(vrf, TableKind::Evpn)
    }

    /// The Inet table of `vrf` holding prefixes of the family of `prefix`.
    pub fn inet_for(vrf: impl Into<String>, prefix: &IpPrefix) -> Self {
        if prefix.is_ipv4() {
            Self::inet4(vrf)
        } else {
            Self::inet6(vrf)
        }
    }

    pub fn is_inet(&self) -> bool {
        matches!(self.kind, TableKind::Inet4 | TableKind::Inet6)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.vrf, self.kind)
    }
}

/// Ordered route storage of a single table.
#[derive(Debug)]
pub(crate) struct RouteTable {
    id: TableId,
    entries: BTreeMap<RouteKey, RouteEntry>,
}

impl RouteTable {
    pub(crate) fn new(id: TableId) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn find_exact(&self, key: &RouteKey) -> Option<&RouteEntry> {
        self.entries.get(&key.normalized())
    }

    /// Longest-prefix match of `addr` over the Inet keys of this table.
    pub(crate) fn find_lpm(&self, addr: &IpAddress) -> Option<&RouteEntry> {
        (0..=addr.max_prefix_len()).rev().find_map(|len| {
            let prefix = IpPrefix::new(addr.masked(len), len).ok()?;
            self.entries.get(&RouteKey::Inet(prefix))
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.values().cloned().collect()
    }

    /// Adds or refreshes the path of `path.peer`. Returns the event to
    /// dispatch, or `None` if nothing changed.
    pub(crate) fn add_path(&mut self, key: &RouteKey, path: AgentPath) -> Option<(EventKind, RouteEntry)> {
        let key = key.normalized();
        match self.entries.get_mut(&key) {
            Some(entry) => entry
                .upsert_path(path)
                .then(|| (EventKind::Changed, entry.clone())),
            None => {
                let entry = RouteEntry::new(self.id.vrf.clone(), key.clone()).with_path(path);
                self.entries.insert(key, entry.clone());
                Some((EventKind::Added, entry))
            }
        }
    }

    /// Removes the path of `peer`. Removing the last path deletes the entry;
    /// the returned snapshot is then marked deleted.
    pub(crate) fn delete_path(&mut self, key: &RouteKey, peer: &Peer) -> Option<(EventKind, RouteEntry)> {
        let key = key.normalized();
        let entry = self.entries.get_mut(&key)?;
        if !entry.remove_path(peer) {
            return None;
        }
        if !entry.paths().is_empty() {
            return Some((EventKind::Changed, entry.clone()));
        }
        let mut removed = self.entries.remove(&key)?;
        removed.mark_deleted();
        Some((EventKind::Deleted, removed))
    }

    /// Removes every entry, returning them marked deleted.
    pub(crate) fn flush(&mut self) -> Vec<RouteEntry> {
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|mut entry| {
                entry.mark_deleted();
                entry
            })
            .collect()
    }
}
