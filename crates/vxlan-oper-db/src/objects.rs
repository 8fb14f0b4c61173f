//! Virtual network, VRF and VM interface objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use vxlan_types::{IpAddress, IpPrefix, Ipv4Address, Ipv6Address};

/// One IPAM subnet of a virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnIpam {
    pub subnet: IpPrefix,
    #[serde(default)]
    pub default_gateway: Option<IpAddress>,
}

impl VnIpam {
    pub fn new(subnet: IpPrefix) -> Self {
        Self {
            subnet,
            default_gateway: None,
        }
    }
}

/// A virtual network.
///
/// A VN flagged `vxlan_routing_vn` is the internal network of a logical
/// router and carries the router's id in `logical_router`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnEntry {
    pub name: String,
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    #[serde(default)]
    pub vrf: Option<String>,
    #[serde(default)]
    pub vxlan_routing_vn: bool,
    #[serde(default)]
    pub logical_router: Option<Uuid>,
    #[serde(default)]
    pub ipams: Vec<VnIpam>,
    #[serde(skip)]
    pub deleted: bool,
}

impl VnEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            vrf: None,
            vxlan_routing_vn: false,
            logical_router: None,
            ipams: Vec::new(),
            deleted: false,
        }
    }

    pub fn with_vrf(mut self, vrf: impl Into<String>) -> Self {
        self.vrf = Some(vrf.into());
        self
    }

    pub fn with_ipam(mut self, subnet: IpPrefix) -> Self {
        self.ipams.push(VnIpam::new(subnet));
        self
    }

    /// Marks this VN as the routing VN of `logical_router`.
    pub fn routing_for(mut self, logical_router: Uuid) -> Self {
        self.vxlan_routing_vn = true;
        self.logical_router = Some(logical_router);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A VRF instance. Each VRF owns an Inet-v4, an Inet-v6 and an EVPN table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfEntry {
    pub name: String,
    #[serde(default)]
    pub vn: Option<String>,
    #[serde(default)]
    pub vxlan_id: u32,
    #[serde(skip)]
    pub deleted: bool,
}

impl VrfEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vn: None,
            vxlan_id: 0,
            deleted: false,
        }
    }

    pub fn with_vn(mut self, vn: impl Into<String>) -> Self {
        self.vn = Some(vn.into());
        self
    }

    pub fn with_vxlan_id(mut self, vxlan_id: u32) -> Self {
        self.vxlan_id = vxlan_id;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Invalid,
    VmOnTap,
    /// Port attaching a bridge network to a logical router.
    VmiOnLr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmiType {
    #[default]
    Instance,
    Router,
    Gateway,
}

/// A VM interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterface {
    pub name: String,
    #[serde(default)]
    pub vn: Option<String>,
    #[serde(default)]
    pub vrf: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub vmi_type: VmiType,
    #[serde(default)]
    pub logical_router: Option<Uuid>,
    #[serde(default)]
    pub primary_ip4: Option<Ipv4Address>,
    #[serde(default)]
    pub primary_ip6: Option<Ipv6Address>,
    #[serde(skip)]
    pub deleted: bool,
}

impl VmInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vn: None,
            vrf: None,
            device_type: DeviceType::Invalid,
            vmi_type: VmiType::Instance,
            logical_router: None,
            primary_ip4: None,
            primary_ip6: None,
            deleted: false,
        }
    }

    /// A tenant VM port in `vn`/`vrf`.
    pub fn vm_port(name: impl Into<String>, vn: impl Into<String>, vrf: impl Into<String>) -> Self {
        Self {
            vn: Some(vn.into()),
            vrf: Some(vrf.into()),
            device_type: DeviceType::VmOnTap,
            ..Self::new(name)
        }
    }

    /// A logical router port connecting `vn` to `logical_router`.
    pub fn lr_port(name: impl Into<String>, vn: impl Into<String>, logical_router: Uuid) -> Self {
        Self {
            vn: Some(vn.into()),
            device_type: DeviceType::VmiOnLr,
            vmi_type: VmiType::Router,
            logical_router: Some(logical_router),
            ..Self::new(name)
        }
    }

    pub fn with_ip4(mut self, ip: Ipv4Address) -> Self {
        self.primary_ip4 = Some(ip);
        self
    }

    pub fn with_ip6(mut self, ip: Ipv6Address) -> Self {
        self.primary_ip6 = Some(ip);
        self
    }

    pub fn is_lr_port(&self) -> bool {
        self.device_type == DeviceType::VmiOnLr && self.vmi_type == VmiType::Router
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Object tables keyed by name.
#[derive(Debug, Default)]
pub(crate) struct ObjectStore {
    pub(crate) vns: BTreeMap<String, VnEntry>,
    pub(crate) vrfs: BTreeMap<String, VrfEntry>,
    pub(crate) interfaces: BTreeMap<String, VmInterface>,
}
