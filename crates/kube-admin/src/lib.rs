//! Kubernetes admin client
//!
//! The reconciliation engine consumes exactly two facts from a running
//! cluster: the control-plane version and the number of ready nodes
//! matching a label selector. Everything else about cluster internals is
//! out of scope, so the trait stays deliberately narrow.

pub mod client;
pub mod error;
pub mod mock;

pub use client::KubeAdminClient;
pub use error::AdminError;
pub use mock::MockAdminClient;

/// Read-only view of a running cluster's control plane.
#[async_trait::async_trait]
pub trait AdminClient: Send + Sync {
    /// Version the API server reports, normalised without a leading `v`
    /// (e.g. "1.30.2").
    async fn running_version(&self) -> Result<String, AdminError>;

    /// Number of nodes matching `label_selector` whose Ready condition
    /// is true. An empty selector counts every node.
    async fn count_ready_nodes(&self, label_selector: &str) -> Result<usize, AdminError>;
}
