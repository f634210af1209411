//! Admin client errors

use thiserror::Error;

/// Errors that can occur when querying a cluster's control plane.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The minted kubeconfig could not be assembled or parsed
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// The cluster has no recorded API endpoint yet
    #[error("cluster endpoint unknown: {0}")]
    NoEndpoint(String),
}
