//! In-memory store provider
//!
//! Backs every store trait with mutex-guarded maps. Used by unit tests
//! and as the reference semantics for disk-backed providers.

use crate::error::StoreError;
use crate::traits::{
    CertificateStore, ClusterStore, CredentialStore, NodeGroupStore, SshKeyStore, StoreProvider,
};
use apis::{CaKeyPair, Cluster, ClusterPhase, Credential, NodeGroup, SshKeyPair};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    clusters: HashMap<String, Cluster>,
    // keyed (cluster, group)
    node_groups: HashMap<(String, String), NodeGroup>,
    credentials: HashMap<String, Credential>,
    ssh_keys: HashMap<String, SshKeyPair>,
    ca_pairs: HashMap<String, CaKeyPair>,
    admin_pairs: HashMap<String, CaKeyPair>,
}

/// Store provider holding everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }
}

impl StoreProvider for MemoryStore {
    fn clusters(&self) -> &dyn ClusterStore {
        self
    }

    fn node_groups(&self) -> &dyn NodeGroupStore {
        self
    }

    fn credentials(&self) -> &dyn CredentialStore {
        self
    }

    fn ssh_keys(&self) -> &dyn SshKeyStore {
        self
    }

    fn certificates(&self) -> &dyn CertificateStore {
        self
    }
}

#[async_trait::async_trait]
impl ClusterStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Cluster>, StoreError> {
        let mut clusters: Vec<_> = self.lock().clusters.values().cloned().collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    async fn get(&self, name: &str) -> Result<Cluster, StoreError> {
        if name.is_empty() {
            return Err(StoreError::Invalid("missing cluster name".to_string()));
        }
        self.lock()
            .clusters
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("cluster `{name}`")))
    }

    async fn create(&self, mut cluster: Cluster) -> Result<Cluster, StoreError> {
        if cluster.name.is_empty() {
            return Err(StoreError::Invalid("missing cluster name".to_string()));
        }
        let mut state = self.lock();
        if state.clusters.contains_key(&cluster.name) {
            return Err(StoreError::AlreadyExists(format!("cluster `{}`", cluster.name)));
        }
        if cluster.status.phase == ClusterPhase::Unknown {
            cluster.status.phase = ClusterPhase::Pending;
        }
        state.clusters.insert(cluster.name.clone(), cluster.clone());
        Ok(cluster)
    }

    async fn update(&self, cluster: Cluster) -> Result<Cluster, StoreError> {
        let mut state = self.lock();
        if !state.clusters.contains_key(&cluster.name) {
            return Err(StoreError::NotFound(format!("cluster `{}`", cluster.name)));
        }
        state.clusters.insert(cluster.name.clone(), cluster.clone());
        Ok(cluster)
    }

    async fn update_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        let mut state = self.lock();
        let existing = state
            .clusters
            .get_mut(&cluster.name)
            .ok_or_else(|| StoreError::NotFound(format!("cluster `{}`", cluster.name)))?;
        existing.status = cluster.status.clone();
        // image resolution is cached through the status write path
        existing.spec.instance_image = cluster.spec.instance_image.clone();
        Ok(existing.clone())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .clusters
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(format!("cluster `{name}`")))?;
        state.node_groups.retain(|(cluster, _), _| cluster != name);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeGroupStore for MemoryStore {
    async fn list(&self, cluster: &str) -> Result<Vec<NodeGroup>, StoreError> {
        let mut groups: Vec<_> = self
            .lock()
            .node_groups
            .iter()
            .filter(|((owner, _), _)| owner == cluster)
            .map(|(_, group)| group.clone())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<NodeGroup, StoreError> {
        self.lock()
            .node_groups
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("node group `{cluster}/{name}`")))
    }

    async fn create(&self, group: NodeGroup) -> Result<NodeGroup, StoreError> {
        if group.name.is_empty() || group.cluster_name.is_empty() {
            return Err(StoreError::Invalid("missing node group name or owner".to_string()));
        }
        let key = (group.cluster_name.clone(), group.name.clone());
        let mut state = self.lock();
        if state.node_groups.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "node group `{}/{}`",
                group.cluster_name, group.name
            )));
        }
        state.node_groups.insert(key, group.clone());
        Ok(group)
    }

    async fn update(&self, group: NodeGroup) -> Result<NodeGroup, StoreError> {
        let key = (group.cluster_name.clone(), group.name.clone());
        let mut state = self.lock();
        if !state.node_groups.contains_key(&key) {
            return Err(StoreError::NotFound(format!(
                "node group `{}/{}`",
                group.cluster_name, group.name
            )));
        }
        state.node_groups.insert(key, group.clone());
        Ok(group)
    }

    async fn update_status(&self, group: &NodeGroup) -> Result<NodeGroup, StoreError> {
        let key = (group.cluster_name.clone(), group.name.clone());
        let mut state = self.lock();
        let existing = state.node_groups.get_mut(&key).ok_or_else(|| {
            StoreError::NotFound(format!("node group `{}/{}`", group.cluster_name, group.name))
        })?;
        existing.status = group.status.clone();
        Ok(existing.clone())
    }

    async fn delete(&self, cluster: &str, name: &str) -> Result<(), StoreError> {
        self.lock()
            .node_groups
            .remove(&(cluster.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("node group `{cluster}/{name}`")))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Credential, StoreError> {
        self.lock()
            .credentials
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("credential `{name}`")))
    }

    async fn put(&self, credential: Credential) -> Result<(), StoreError> {
        self.lock()
            .credentials
            .insert(credential.name.clone(), credential);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SshKeyStore for MemoryStore {
    async fn get(&self, cluster: &str) -> Result<SshKeyPair, StoreError> {
        self.lock()
            .ssh_keys
            .get(cluster)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ssh key for `{cluster}`")))
    }

    async fn put(&self, cluster: &str, key: SshKeyPair) -> Result<(), StoreError> {
        self.lock().ssh_keys.insert(cluster.to_string(), key);
        Ok(())
    }

    async fn delete(&self, cluster: &str) -> Result<(), StoreError> {
        self.lock().ssh_keys.remove(cluster);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CertificateStore for MemoryStore {
    async fn get_ca(&self, cluster: &str) -> Result<CaKeyPair, StoreError> {
        self.lock()
            .ca_pairs
            .get(cluster)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ca for `{cluster}`")))
    }

    async fn put_ca(&self, cluster: &str, ca: CaKeyPair) -> Result<(), StoreError> {
        self.lock().ca_pairs.insert(cluster.to_string(), ca);
        Ok(())
    }

    async fn get_admin(&self, cluster: &str) -> Result<CaKeyPair, StoreError> {
        self.lock()
            .admin_pairs
            .get(cluster)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("admin pair for `{cluster}`")))
    }

    async fn put_admin(&self, cluster: &str, pair: CaKeyPair) -> Result<(), StoreError> {
        self.lock().admin_pairs.insert(cluster.to_string(), pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apis::{ClusterSpec, NodeGroupSpec, NodeTemplateSpec};

    fn cluster(name: &str) -> Cluster {
        Cluster {
            name: name.to_string(),
            spec: ClusterSpec {
                cloud_provider: "mock".to_string(),
                zone: "zone-a".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                credential_name: "cred".to_string(),
                ..ClusterSpec::default()
            },
            ..Cluster::default()
        }
    }

    fn group(cluster: &str, name: &str, nodes: i64) -> NodeGroup {
        NodeGroup {
            name: name.to_string(),
            cluster_name: cluster.to_string(),
            spec: NodeGroupSpec {
                nodes,
                template: NodeTemplateSpec {
                    sku: "small-2".to_string(),
                    ..NodeTemplateSpec::default()
                },
                ..NodeGroupSpec::default()
            },
            ..NodeGroup::default()
        }
    }

    #[tokio::test]
    async fn create_normalises_unknown_phase_to_pending() {
        let store = MemoryStore::new();
        let created = store.clusters().create(cluster("a")).await.unwrap();
        assert_eq!(created.status.phase, ClusterPhase::Pending);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = MemoryStore::new();
        store.clusters().create(cluster("a")).await.unwrap();
        assert!(store.clusters().create(cluster("a")).await.is_err());
    }

    #[tokio::test]
    async fn update_status_leaves_spec_untouched() {
        let store = MemoryStore::new();
        store.clusters().create(cluster("a")).await.unwrap();

        let mut patched = store.clusters().get("a").await.unwrap();
        patched.spec.kubernetes_version = "9.9.9".to_string();
        patched.status.phase = ClusterPhase::Ready;
        store.clusters().update_status(&patched).await.unwrap();

        let stored = store.clusters().get("a").await.unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Ready);
        assert_eq!(stored.spec.kubernetes_version, "1.30.2");
    }

    #[tokio::test]
    async fn node_groups_are_scoped_to_their_cluster() {
        let store = MemoryStore::new();
        store.node_groups().create(group("a", "workers", 3)).await.unwrap();
        store.node_groups().create(group("b", "workers", 5)).await.unwrap();

        let groups = store.node_groups().list("a").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].spec.nodes, 3);
    }

    #[tokio::test]
    async fn deleting_a_cluster_drops_its_groups() {
        let store = MemoryStore::new();
        store.clusters().create(cluster("a")).await.unwrap();
        store.node_groups().create(group("a", "workers", 3)).await.unwrap();
        store.clusters().delete("a").await.unwrap();
        assert!(store.node_groups().list("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_lookups_error() {
        let store = MemoryStore::new();
        assert!(store.clusters().get("nope").await.is_err());
        assert!(store.credentials().get("nope").await.is_err());
        assert!(store.ssh_keys().get("nope").await.is_err());
    }
}
