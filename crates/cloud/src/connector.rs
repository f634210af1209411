//! Capability interface implemented once per provider
//!
//! The engine talks to every provider through [`CloudConnector`]. The
//! probe methods (`has_*`, `get_*`, `list_instances`) never mutate, so a
//! dry-run apply can walk the full reconciliation without side effects.
//! Ensure/create/delete methods are idempotent get-or-create operations.
//!
//! Managed-group providers also expose [`GroupScaler`]; the engine probes
//! for the capability instead of switching on the provider name, so new
//! providers slot in without touching the convergence code.

use crate::error::CloudError;
use crate::types::{
    AutoscalerBounds, CreateInstanceRequest, Ensure, Instance, OperationRef, OperationStatus,
};

/// Polls the status of one asynchronous provider operation.
///
/// Split out of [`CloudConnector`] so the waiter can be exercised against
/// minimal test pollers.
#[async_trait::async_trait]
pub trait OperationPoller: Send + Sync {
    /// One status query. Transient failures are tolerated by the waiter.
    async fn poll_operation(&self, op: &OperationRef) -> Result<OperationStatus, CloudError>;
}

/// Provider capability interface.
///
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime.
#[async_trait::async_trait]
pub trait CloudConnector: OperationPoller {
    /// Registry name of the provider ("gce", "scaleway", ...)
    fn provider(&self) -> &str;

    /// Resolve the image id instances should boot from.
    async fn detect_instance_image(&self) -> Result<String, CloudError>;

    // Probes (never mutate)

    async fn has_network(&self) -> Result<bool, CloudError>;
    async fn has_firewall(&self) -> Result<bool, CloudError>;

    /// Endpoint of the cluster load balancer, if one exists.
    async fn get_load_balancer(&self) -> Result<Option<String>, CloudError>;

    async fn has_ssh_key(&self, name: &str) -> Result<bool, CloudError>;

    /// Reserved address held for this cluster, if any.
    async fn get_reserved_ip(&self) -> Result<Option<String>, CloudError>;

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, CloudError>;

    /// Instances carrying the given group label. A failure here must be
    /// surfaced, never mapped to an empty listing: convergence fails
    /// closed on an unknown observed count.
    async fn list_instances(&self, group: &str) -> Result<Vec<Instance>, CloudError>;

    // Cluster-wide resources (idempotent get-or-create / teardown)

    async fn ensure_network(&self) -> Result<Ensure, CloudError>;
    async fn ensure_firewall(&self) -> Result<Ensure, CloudError>;

    /// Get-or-create the cluster load balancer; returns its endpoint.
    async fn ensure_load_balancer(&self) -> Result<(String, Ensure), CloudError>;

    /// Import the given public key under `name`; returns the provider id.
    async fn import_ssh_key(&self, name: &str, public_key: &str) -> Result<String, CloudError>;

    async fn delete_ssh_key(&self, name: &str) -> Result<(), CloudError>;

    /// Reserve a static address for the master. Providers without address
    /// reservation return `Ok(None)`.
    async fn reserve_ip(&self) -> Result<Option<String>, CloudError> {
        Ok(None)
    }

    /// Release the address reserved by [`Self::reserve_ip`].
    async fn release_reserved_ip(&self) -> Result<(), CloudError> {
        Ok(())
    }

    // Instance-level primitives

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError>;

    /// Delete one instance along with its dependent resources (network
    /// interface, public address) where the provider models them
    /// separately.
    async fn delete_instance(&self, name_or_id: &str) -> Result<(), CloudError>;

    /// Managed-group capability, when the provider has one.
    fn group_scaler(&self) -> Option<&dyn GroupScaler> {
        None
    }
}

/// Managed instance group capability.
///
/// Creation order is template -> group -> autoscaler; teardown is the
/// reverse. Each mutating call returns the provider operation to wait on
/// before the next dependent step.
#[async_trait::async_trait]
pub trait GroupScaler: Send + Sync {
    async fn instance_group_exists(&self, group: &str) -> Result<bool, CloudError>;

    async fn create_instance_template(
        &self,
        template: &str,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError>;

    async fn delete_instance_template(&self, template: &str) -> Result<OperationRef, CloudError>;

    async fn create_instance_group(
        &self,
        group: &str,
        template: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError>;

    async fn resize_instance_group(
        &self,
        group: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError>;

    async fn delete_instance_group(&self, group: &str) -> Result<OperationRef, CloudError>;

    async fn create_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError>;

    /// Current bounds, or `None` when the group has no autoscaler.
    async fn get_autoscaler(&self, group: &str) -> Result<Option<AutoscalerBounds>, CloudError>;

    async fn patch_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError>;

    async fn delete_autoscaler(&self, group: &str) -> Result<OperationRef, CloudError>;
}
