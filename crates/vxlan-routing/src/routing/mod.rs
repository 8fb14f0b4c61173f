//! VXLAN inter-VRF routing - route leaking through logical routers.
//!
//! A logical router joins a set of bridge VRFs through one routing VRF.
//! Local host routes of the bridges are exported as EVPN Type-5 entries of
//! the routing VRF; routing Type-5 entries come back to the bridges as VRF
//! next hops, and the bridges exchange their IPAM subnets the same way.

mod classifier;
mod import;
mod leak;
mod manager;
mod subnet;
mod types;
mod vrf_mapper;
mod walker;

pub use classifier::{
    classify_nexthop, find_bgpaas_path, find_interface_path, find_local_vm_port_path, find_path_with_peer_type,
    init_nh_request, is_bgpaas_composite, is_bgpaas_interface, is_external_type5, is_host_route,
    is_interface_composite, local_vm_export_interface, nb_compute_mac, NextHopClass,
};
pub use manager::RoutingManager;
pub use types::{
    LogicalRouterId, Result, RouteParameters, RoutingError, RoutingStats, RoutingStatsSnapshot, SyntheticPeers,
};
pub use vrf_mapper::{BindOutcome, RoutedVrfInfo, VrfMapper};
pub use walker::{RouteWalker, WalkKey, WalkPurpose, WalkSink};
