//! Wire models for the GCE compute v1 API
//!
//! Only the fields the connector reads or writes; everything else is
//! left to serde defaults so unknown response fields never break
//! decoding.

use serde::{Deserialize, Serialize};

/// Asynchronous compute operation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,

    /// "PENDING", "RUNNING" or "DONE"
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationError {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,

    #[serde(rename = "IPv4Range", default, skip_serializing_if = "Option::is_none")]
    pub ipv4_range: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_subnetworks: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default)]
    pub source_ranges: Vec<String>,

    #[serde(default)]
    pub allowed: Vec<FirewallAllowed>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FirewallAllowed {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Reserved (static) regional address.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub name: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,

    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disks: Option<Vec<AttachedDisk>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<std::collections::BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(rename = "networkIP", default, skip_serializing_if = "Option::is_none")]
    pub network_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(rename = "natIP", default, skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default)]
    pub boot: bool,

    #[serde(default)]
    pub auto_delete: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialize_params: Option<DiskInitializeParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiskInitializeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub items: Vec<MetadataItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tags {
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    pub name: String,

    pub properties: InstanceTemplateProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplateProperties {
    #[serde(default)]
    pub machine_type: String,

    #[serde(default)]
    pub disks: Vec<AttachedDisk>,

    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<std::collections::BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupManager {
    pub name: String,

    #[serde(default)]
    pub base_instance_name: String,

    #[serde(default)]
    pub instance_template: String,

    #[serde(default)]
    pub target_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaler {
    pub name: String,

    #[serde(default)]
    pub target: String,

    pub autoscaling_policy: AutoscalingPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicy {
    #[serde(default)]
    pub min_num_replicas: i64,

    #[serde(default)]
    pub max_num_replicas: i64,
}

/// Project resource; carries the common instance metadata SSH keys are
/// stored in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub common_instance_metadata: Metadata,
}

/// Generic list response envelope.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
