//! Boundary towards the BGP/XMPP peers.
//!
//! The engine pushes the routes it re-synthesizes in a routing VRF through
//! an [`XmppAdvertiser`]. Session handling and wire encoding live behind
//! the trait.

use log::info;
use vxlan_oper_db::{AgentPath, Peer};
use vxlan_types::IpPrefix;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvertiseError {
    #[error("peer {0} is not connected")]
    NotConnected(String),

    #[error("advertisement rejected: {0}")]
    Rejected(String),
}

/// Outbound route channel to remote BGP/XMPP speakers.
pub trait XmppAdvertiser: Send + Sync {
    fn advertise(&self, peer: &Peer, vrf: &str, prefix: &IpPrefix, path: &AgentPath) -> Result<(), AdvertiseError>;

    fn withdraw(&self, peer: &Peer, vrf: &str, prefix: &IpPrefix) -> Result<(), AdvertiseError>;
}

/// Drops every advertisement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAdvertiser;

impl XmppAdvertiser for NoOpAdvertiser {
    fn advertise(&self, _peer: &Peer, _vrf: &str, _prefix: &IpPrefix, _path: &AgentPath) -> Result<(), AdvertiseError> {
        Ok(())
    }

    fn withdraw(&self, _peer: &Peer, _vrf: &str, _prefix: &IpPrefix) -> Result<(), AdvertiseError> {
        Ok(())
    }
}

/// Logs every advertisement. Used by the standalone daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAdvertiser;

impl XmppAdvertiser for LoggingAdvertiser {
    fn advertise(&self, peer: &Peer, vrf: &str, prefix: &IpPrefix, path: &AgentPath) -> Result<(), AdvertiseError> {
        info!(
            "xmpp: advertise {} in {} via {} (nh {}, vxlan {})",
            prefix,
            vrf,
            peer.name(),
            path.nexthop,
            path.vxlan_id
        );
        Ok(())
    }

    fn withdraw(&self, peer: &Peer, vrf: &str, prefix: &IpPrefix) -> Result<(), AdvertiseError> {
        info!("xmpp: withdraw {} in {} via {}", prefix, vrf, peer.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vxlan_oper_db::{NextHop, PeerType};

    #[test]
    fn test_advertisers_accept_everything() {
        let peer = Peer::new("vxlan_bgp", PeerType::VxlanBgp);
        let prefix: IpPrefix = "8.8.8.0/24".parse().unwrap();
        let path = AgentPath::new(peer.clone(), NextHop::vrf("vrf-r"));

        for advertiser in [&NoOpAdvertiser as &dyn XmppAdvertiser, &LoggingAdvertiser] {
            assert!(advertiser.advertise(&peer, "vrf-r", &prefix, &path).is_ok());
            assert!(advertiser.withdraw(&peer, "vrf-r", &prefix).is_ok());
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AdvertiseError::NotConnected("bgp-1".to_string()).to_string(),
            "peer bgp-1 is not connected"
        );
    }
}
