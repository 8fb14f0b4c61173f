//! VXLAN inter-VRF routing daemon.
//!
//! Makes the bridge VRFs attached to a logical router reach each other
//! through the router's routing VRF. Local host routes of every bridge are
//! exported as EVPN Type-5 routes into the routing VRF, and the routing
//! VRF's Type-5 routes (local or learned from BGP) come back to every
//! sibling bridge as VRF next hops.
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────── RoutingManager ────────────┐
//! bridge Inet ──>│ inet_route_notify ──> routing EVPN     │──> XmppAdvertiser
//!                │ evpn_route_notify ──> routing Inet     │
//! routing EVPN ─>│                   └─> bridge Inet x N  │
//! VN/VRF/VMI ───>│ VrfMapper, RouteWalker                 │
//!                └────────────────────────────────────────┘
//!                                 │
//!                             [OperDb]
//! ```
//!
//! # Key Components
//!
//! - [`routing::RoutingManager`]: listeners and the route-leak pipeline
//! - [`routing::VrfMapper`]: logical router to routing VRF and bridge VNs
//! - [`routing::RouteWalker`]: coalesced table walks
//! - [`xmpp::XmppAdvertiser`]: outbound routes towards BGP/XMPP peers
//! - [`daemon::RoutingDaemon`]: tokio event loop of `vxlan-routingd`

pub mod audit;
pub mod config;
pub mod daemon;
pub mod introspect;
pub mod routing;
pub mod xmpp;

pub use config::RoutingConfig;
pub use daemon::{RoutingDaemon, RoutingDaemonConfig};
pub use routing::{RoutingError, RoutingManager};
pub use xmpp::{AdvertiseError, XmppAdvertiser};
