//! Cluster resource
//!
//! The top-level managed resource: one Kubernetes installation on one
//! cloud account/region. The spec is owned by the user; the status is
//! written exclusively by the reconciler.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A managed Kubernetes cluster.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Unique cluster name (immutable)
    pub name: String,

    /// Bumped by the owner on every spec change
    #[serde(default)]
    pub generation: i64,

    /// Once set, the reconciler drives the cluster to Deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    pub spec: ClusterSpec,

    #[serde(default)]
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Registry key of the cloud provider ("gce", "scaleway", ...)
    pub cloud_provider: String,

    /// Provider zone the cluster lives in
    pub zone: String,

    /// Provider region (parent of the zone)
    #[serde(default)]
    pub region: String,

    /// Desired Kubernetes version, e.g. "1.30.2"
    pub kubernetes_version: String,

    /// Name of the stored credential used to talk to the provider
    pub credential_name: String,

    #[serde(default)]
    pub network: NetworkSpec,

    /// Provider image id, resolved and cached on first apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_image: Option<String>,

    /// kubeadm bootstrap token baked into startup scripts
    #[serde(default)]
    pub bootstrap_token: String,
}

/// Cluster networking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// CIDR allocated to pods
    pub pod_cidr: String,

    /// CIDR allocated to services
    pub service_cidr: String,

    /// Static IP to attach to the master, "auto" to reserve one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_reserved_ip: Option<String>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            pod_cidr: "10.244.0.0/16".to_string(),
            service_cidr: "10.96.0.0/12".to_string(),
            master_reserved_ip: None,
        }
    }
}

/// ClusterPhase is a label for the condition of a cluster at the current time.
///
/// Transitions are monotonic: Pending -> Ready -> (Upgrading -> Ready)* and
/// any non-Deleted phase -> Deleting -> Deleted once a deletion timestamp is
/// set. Failing is re-entrant; a successful apply leaves it again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterPhase {
    /// Never valid for apply; stores normalise this to Pending on create
    #[default]
    Unknown,

    /// Recorded but not yet provisioned
    Pending,

    /// Control plane is up and answering
    Ready,

    /// A version upgrade is in flight
    Upgrading,

    /// Deletion requested, teardown in progress
    Deleting,

    /// Terminal; all cloud resources released
    Deleted,

    /// Last apply failed; see status.reason
    Failing,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Human-readable cause of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Generation most recently acted upon
    #[serde(default)]
    pub observed_generation: i64,

    /// API server endpoint (master public address)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,

    /// Provider-side id of the imported SSH key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_id: Option<String>,

    /// Reserved IP held for the master, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_ip: Option<String>,
}

impl Cluster {
    /// Whether a deletion has been requested for this cluster.
    #[must_use]
    pub fn deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Conventional name of the master instance.
    #[must_use]
    pub fn master_name(&self) -> String {
        format!("{}-master", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_pascal_case() {
        let json = serde_json::to_string(&ClusterPhase::Upgrading).unwrap();
        assert_eq!(json, "\"Upgrading\"");
    }

    #[test]
    fn status_defaults_to_unknown_phase() {
        let status = ClusterStatus::default();
        assert_eq!(status.phase, ClusterPhase::Unknown);
    }

    #[test]
    fn master_name_follows_convention() {
        let cluster = Cluster {
            name: "prod-eu".to_string(),
            ..Cluster::default()
        };
        assert_eq!(cluster.master_name(), "prod-eu-master");
    }
}
