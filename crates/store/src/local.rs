//! Local disk store provider
//!
//! One YAML document per resource beneath a root directory:
//!
//! ```text
//! <root>/clusters/<name>.yaml
//! <root>/nodegroups/<cluster>/<group>.yaml
//! <root>/credentials/<name>.yaml
//! <root>/ssh/<cluster>.yaml
//! <root>/pki/<cluster>.yaml
//! ```
//!
//! Writes are whole-file replacements; last write wins. Suitable for a
//! single operator workstation, not for concurrent writers.

use crate::error::StoreError;
use crate::traits::{
    CertificateStore, ClusterStore, CredentialStore, NodeGroupStore, SshKeyStore, StoreProvider,
};
use apis::{CaKeyPair, Cluster, ClusterPhase, Credential, NodeGroup, SshKeyPair};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Store provider writing YAML files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cluster_path(&self, name: &str) -> PathBuf {
        self.root.join("clusters").join(format!("{name}.yaml"))
    }

    fn group_dir(&self, cluster: &str) -> PathBuf {
        self.root.join("nodegroups").join(cluster)
    }

    fn group_path(&self, cluster: &str, name: &str) -> PathBuf {
        self.group_dir(cluster).join(format!("{name}.yaml"))
    }

    fn credential_path(&self, name: &str) -> PathBuf {
        self.root.join("credentials").join(format!("{name}.yaml"))
    }

    fn ssh_path(&self, cluster: &str) -> PathBuf {
        self.root.join("ssh").join(format!("{cluster}.yaml"))
    }

    fn ca_path(&self, cluster: &str) -> PathBuf {
        self.root.join("pki").join(format!("{cluster}.yaml"))
    }

    fn admin_path(&self, cluster: &str) -> PathBuf {
        self.root.join("pki").join(format!("{cluster}-admin.yaml"))
    }

    async fn read<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, StoreError> {
        match fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_yaml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(what.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_yaml::to_string(value)?;
        fs::write(path, raw).await?;
        debug!(path = %path.display(), "wrote resource");
        Ok(())
    }

    async fn exists(path: &Path) -> Result<bool, StoreError> {
        Ok(fs::try_exists(path).await?)
    }

    async fn remove(path: &Path, what: &str) -> Result<(), StoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(what.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                let raw = fs::read_to_string(&path).await?;
                out.push(serde_yaml::from_str(&raw)?);
            }
        }
        Ok(out)
    }
}

impl StoreProvider for LocalStore {
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
impl ClusterStore for LocalStore {
    async fn list(&self) -> Result<Vec<Cluster>, StoreError> {
        let mut clusters: Vec<Cluster> = Self::list_dir(&self.root.join("clusters")).await?;
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    async fn get(&self, name: &str) -> Result<Cluster, StoreError> {
        if name.is_empty() {
            return Err(StoreError::Invalid("missing cluster name".to_string()));
        }
        Self::read(&self.cluster_path(name), &format!("cluster `{name}`")).await
    }

    async fn create(&self, mut cluster: Cluster) -> Result<Cluster, StoreError> {
        if cluster.name.is_empty() {
            return Err(StoreError::Invalid("missing cluster name".to_string()));
        }
        let path = self.cluster_path(&cluster.name);
        if Self::exists(&path).await? {
            return Err(StoreError::AlreadyExists(format!("cluster `{}`", cluster.name)));
        }
        if cluster.status.phase == ClusterPhase::Unknown {
            cluster.status.phase = ClusterPhase::Pending;
        }
        Self::write(&path, &cluster).await?;
        Ok(cluster)
    }

    async fn update(&self, cluster: Cluster) -> Result<Cluster, StoreError> {
        let path = self.cluster_path(&cluster.name);
        if !Self::exists(&path).await? {
            return Err(StoreError::NotFound(format!("cluster `{}`", cluster.name)));
        }
        Self::write(&path, &cluster).await?;
        Ok(cluster)
    }

    async fn update_status(&self, cluster: &Cluster) -> Result<Cluster, StoreError> {
        let mut existing = ClusterStore::get(self, &cluster.name).await?;
        existing.status = cluster.status.clone();
        existing.spec.instance_image = cluster.spec.instance_image.clone();
        Self::write(&self.cluster_path(&cluster.name), &existing).await?;
        Ok(existing)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        Self::remove(&self.cluster_path(name), &format!("cluster `{name}`")).await?;
        // drop the group directory with the owner
        let groups = self.group_dir(name);
        if Self::exists(&groups).await? {
            fs::remove_dir_all(&groups).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeGroupStore for LocalStore {
    async fn list(&self, cluster: &str) -> Result<Vec<NodeGroup>, StoreError> {
        let mut groups: Vec<NodeGroup> = Self::list_dir(&self.group_dir(cluster)).await?;
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<NodeGroup, StoreError> {
        Self::read(
            &self.group_path(cluster, name),
            &format!("node group `{cluster}/{name}`"),
        )
        .await
    }

    async fn create(&self, group: NodeGroup) -> Result<NodeGroup, StoreError> {
        if group.name.is_empty() || group.cluster_name.is_empty() {
            return Err(StoreError::Invalid("missing node group name or owner".to_string()));
        }
        let path = self.group_path(&group.cluster_name, &group.name);
        if Self::exists(&path).await? {
            return Err(StoreError::AlreadyExists(format!(
                "node group `{}/{}`",
                group.cluster_name, group.name
            )));
        }
        Self::write(&path, &group).await?;
        Ok(group)
    }

    async fn update(&self, group: NodeGroup) -> Result<NodeGroup, StoreError> {
        let path = self.group_path(&group.cluster_name, &group.name);
        if !Self::exists(&path).await? {
            return Err(StoreError::NotFound(format!(
                "node group `{}/{}`",
                group.cluster_name, group.name
            )));
        }
        Self::write(&path, &group).await?;
        Ok(group)
    }

    async fn update_status(&self, group: &NodeGroup) -> Result<NodeGroup, StoreError> {
        let mut existing = NodeGroupStore::get(self, &group.cluster_name, &group.name).await?;
        existing.status = group.status.clone();
        Self::write(&self.group_path(&group.cluster_name, &group.name), &existing).await?;
        Ok(existing)
    }

    async fn delete(&self, cluster: &str, name: &str) -> Result<(), StoreError> {
        Self::remove(
            &self.group_path(cluster, name),
            &format!("node group `{cluster}/{name}`"),
        )
        .await
    }
}

#[async_trait::async_trait]
impl CredentialStore for LocalStore {
    async fn get(&self, name: &str) -> Result<Credential, StoreError> {
        Self::read(&self.credential_path(name), &format!("credential `{name}`")).await
    }

    async fn put(&self, credential: Credential) -> Result<(), StoreError> {
        Self::write(&self.credential_path(&credential.name), &credential).await
    }
}

#[async_trait::async_trait]
impl SshKeyStore for LocalStore {
    async fn get(&self, cluster: &str) -> Result<SshKeyPair, StoreError> {
        Self::read(&self.ssh_path(cluster), &format!("ssh key for `{cluster}`")).await
    }

    async fn put(&self, cluster: &str, key: SshKeyPair) -> Result<(), StoreError> {
        Self::write(&self.ssh_path(cluster), &key).await
    }

    async fn delete(&self, cluster: &str) -> Result<(), StoreError> {
        Self::remove(&self.ssh_path(cluster), &format!("ssh key for `{cluster}`")).await
    }
}

#[async_trait::async_trait]
impl CertificateStore for LocalStore {
    async fn get_ca(&self, cluster: &str) -> Result<CaKeyPair, StoreError> {
        Self::read(&self.ca_path(cluster), &format!("ca for `{cluster}`")).await
    }

    async fn put_ca(&self, cluster: &str, ca: CaKeyPair) -> Result<(), StoreError> {
        Self::write(&self.ca_path(cluster), &ca).await
    }

    async fn get_admin(&self, cluster: &str) -> Result<CaKeyPair, StoreError> {
        Self::read(&self.admin_path(cluster), &format!("admin pair for `{cluster}`")).await
    }

    async fn put_admin(&self, cluster: &str, pair: CaKeyPair) -> Result<(), StoreError> {
        Self::write(&self.admin_path(cluster), &pair).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apis::ClusterSpec;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("harrow-store-{}", uuid::Uuid::new_v4()))
    }

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

    #[tokio::test]
    async fn round_trips_a_cluster() {
        let root = scratch_root();
        let store = LocalStore::new(&root);

        let created = store.clusters().create(cluster("round")).await.unwrap();
        assert_eq!(created.status.phase, ClusterPhase::Pending);

        let loaded = store.clusters().get("round").await.unwrap();
        assert_eq!(loaded.spec.zone, "zone-a");

        store.clusters().delete("round").await.unwrap();
        assert!(store.clusters().get("round").await.is_err());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn list_skips_missing_directory() {
        let store = LocalStore::new(scratch_root());
        assert!(store.clusters().list().await.unwrap().is_empty());
        assert!(store.node_groups().list("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let root = scratch_root();
        let store = LocalStore::new(&root);
        assert!(store.clusters().update(cluster("ghost")).await.is_err());
        let _ = fs::remove_dir_all(&root).await;
    }
}
