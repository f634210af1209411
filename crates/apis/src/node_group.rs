//! NodeGroup resource
//!
//! A named set of homogeneous instances with a desired count, owned by a
//! cluster. The reconciler converges the observed count toward the spec.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A group of homogeneous worker (or master) instances.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Group name, unique within the owning cluster
    pub name: String,

    /// Owning cluster
    pub cluster_name: String,

    /// Bumped by the owner on every spec change
    #[serde(default)]
    pub generation: i64,

    /// When set and the observed count reaches zero, the group record
    /// is removed from the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    pub spec: NodeGroupSpec,

    #[serde(default)]
    pub status: NodeGroupStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    /// Desired instance count
    pub nodes: i64,

    /// Role of every instance in the group. Exactly one group per
    /// cluster carries the Master role, and its count is always 1.
    #[serde(default)]
    pub role: NodeRole,

    /// Template describing the instances to create
    pub template: NodeTemplateSpec,
}

/// Role of the instances in a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum NodeRole {
    /// Control-plane instance
    Master,

    /// Worker instance
    #[default]
    Node,
}

/// Instance template: machine size, disk and image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplateSpec {
    /// Provider machine size/SKU, e.g. "n1-standard-2"
    pub sku: String,

    /// Provider disk type, e.g. "pd-standard"
    #[serde(default)]
    pub disk_type: String,

    /// Boot disk size in GB
    #[serde(default)]
    pub disk_size_gb: i64,

    /// Image override; falls back to the cluster's resolved image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Whether instances get a public address
    #[serde(default)]
    pub external_ip: bool,
}

/// Most recently observed state of a node group.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupStatus {
    /// Observed instance count
    #[serde(default)]
    pub nodes: i64,

    /// Generation most recently acted upon
    #[serde(default)]
    pub observed_generation: i64,
}

impl NodeGroup {
    /// Whether this is the cluster's master group.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.spec.role == NodeRole::Master
    }

    /// Whether a deletion has been requested for this group.
    #[must_use]
    pub fn deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_defaults_to_node() {
        let spec = NodeGroupSpec::default();
        assert_eq!(spec.role, NodeRole::Node);
    }

    #[test]
    fn master_flag() {
        let mut ng = NodeGroup::default();
        assert!(!ng.is_master());
        ng.spec.role = NodeRole::Master;
        assert!(ng.is_master());
    }
}
