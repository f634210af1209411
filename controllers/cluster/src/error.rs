//! Engine-specific error types.
//!
//! Maps the error taxonomy of the reconciliation engine onto the
//! collaborator errors it wraps.

use cloud::CloudError;
use cluster_store::StoreError;
use kube_admin::AdminError;
use thiserror::Error;

/// Errors that can occur while reconciling a cluster.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cluster phase is unrecognised or incompatible with the request
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation requested while another is in flight
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store collaborator failure, fatal to the current step
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Cloud provider failure; timeouts come from the operation waiter
    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Admin client failure while querying the control plane
    #[error("kubernetes error: {0}")]
    Admin(#[from] AdminError),

    /// No registered connector for the requested provider
    #[error("unknown cloud provider: {0}")]
    UnknownProvider(String),

    /// Startup-script rendering failed
    #[error("startup script: {0}")]
    Render(String),

    /// A convergence step did not reach the desired state in time
    #[error("convergence failed: {0}")]
    Convergence(String),
}
