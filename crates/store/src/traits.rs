//! Store interfaces
//!
//! Narrow per-resource traits plus the [`StoreProvider`] aggregate the
//! engine is handed. All calls are async and return an error on
//! not-found or conflict; the engine never distinguishes store backends.

use crate::error::StoreError;
use apis::{CaKeyPair, Cluster, Credential, NodeGroup, SshKeyPair};

/// Cluster records.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Cluster>, StoreError>;

    async fn get(&self, name: &str) -> Result<Cluster, StoreError>;

    /// Create a new record. A cluster arriving with an `Unknown` phase is
    /// normalised to `Pending` so the first apply finds a valid state.
    async fn create(&self, cluster: Cluster) -> Result<Cluster, StoreError>;

    /// Replace the record (spec and metadata).
    async fn update(&self, cluster: Cluster) -> Result<Cluster, StoreError>;

    /// Persist only the status of an existing record.
    async fn update_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Node-group records, keyed by owning cluster.
#[async_trait::async_trait]
pub trait NodeGroupStore: Send + Sync {
    async fn list(&self, cluster: &str) -> Result<Vec<NodeGroup>, StoreError>;

    async fn get(&self, cluster: &str, name: &str) -> Result<NodeGroup, StoreError>;

    async fn create(&self, group: NodeGroup) -> Result<NodeGroup, StoreError>;

    async fn update(&self, group: NodeGroup) -> Result<NodeGroup, StoreError>;

    /// Persist only the status of an existing record.
    async fn update_status(&self, group: &NodeGroup) -> Result<NodeGroup, StoreError>;

    async fn delete(&self, cluster: &str, name: &str) -> Result<(), StoreError>;
}

/// Named cloud credentials.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Credential, StoreError>;

    async fn put(&self, credential: Credential) -> Result<(), StoreError>;
}

/// Per-cluster SSH key pairs.
#[async_trait::async_trait]
pub trait SshKeyStore: Send + Sync {
    async fn get(&self, cluster: &str) -> Result<SshKeyPair, StoreError>;

    async fn put(&self, cluster: &str, key: SshKeyPair) -> Result<(), StoreError>;

    async fn delete(&self, cluster: &str) -> Result<(), StoreError>;
}

/// Per-cluster certificate material: the CA pair and the admin client
/// pair issued from it (issuance itself happens outside this core).
#[async_trait::async_trait]
pub trait CertificateStore: Send + Sync {
    async fn get_ca(&self, cluster: &str) -> Result<CaKeyPair, StoreError>;

    async fn put_ca(&self, cluster: &str, ca: CaKeyPair) -> Result<(), StoreError>;

    async fn get_admin(&self, cluster: &str) -> Result<CaKeyPair, StoreError>;

    async fn put_admin(&self, cluster: &str, pair: CaKeyPair) -> Result<(), StoreError>;
}

/// Aggregate handed to the engine.
pub trait StoreProvider: Send + Sync {
    fn clusters(&self) -> &dyn ClusterStore;

    fn node_groups(&self) -> &dyn NodeGroupStore;

    fn credentials(&self) -> &dyn CredentialStore;

    fn ssh_keys(&self) -> &dyn SshKeyStore;

    fn certificates(&self) -> &dyn CertificateStore;
}
