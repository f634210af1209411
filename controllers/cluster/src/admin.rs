//! Admin client construction
//!
//! The control-plane endpoint only becomes known part-way through a
//! create, so the reconciler asks a factory for an admin client at the
//! moment it needs one instead of holding a client built from stale
//! state.

use crate::error::EngineError;
use apis::Cluster;
use cluster_store::StoreProvider;
use kube_admin::{AdminClient, AdminError, KubeAdminClient};
use std::sync::Arc;

/// Yields an admin client for a cluster's current endpoint.
#[async_trait::async_trait]
pub trait AdminClientFactory: Send + Sync {
    async fn client_for(&self, cluster: &Cluster) -> Result<Arc<dyn AdminClient>, EngineError>;
}

/// Builds [`KubeAdminClient`]s from the stored CA and admin key pair.
pub struct StoreBackedAdminFactory {
    store: Arc<dyn StoreProvider>,
}

impl StoreBackedAdminFactory {
    #[must_use]
    pub fn new(store: Arc<dyn StoreProvider>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl AdminClientFactory for StoreBackedAdminFactory {
    async fn client_for(&self, cluster: &Cluster) -> Result<Arc<dyn AdminClient>, EngineError> {
        let endpoint = cluster.status.api_endpoint.as_deref().ok_or_else(|| {
            EngineError::Admin(AdminError::NoEndpoint(format!(
                "cluster `{}` has no recorded api endpoint",
                cluster.name
            )))
        })?;
        let ca = self.store.certificates().get_ca(&cluster.name).await?;
        let admin = self.store.certificates().get_admin(&cluster.name).await?;
        let client = KubeAdminClient::new(endpoint, &ca, &admin.cert_pem, &admin.key_pem)?;
        Ok(Arc::new(client))
    }
}

/// Hands out one fixed client regardless of cluster state; test seam.
#[cfg(test)]
pub struct FixedAdminFactory {
    client: Arc<dyn AdminClient>,
}

#[cfg(test)]
impl FixedAdminFactory {
    #[must_use]
    pub fn new(client: Arc<dyn AdminClient>) -> Self {
        Self { client }
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl AdminClientFactory for FixedAdminFactory {
    async fn client_for(&self, _cluster: &Cluster) -> Result<Arc<dyn AdminClient>, EngineError> {
        Ok(Arc::clone(&self.client))
    }
}
