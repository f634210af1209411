//! Controller loop
//!
//! Wires the store, provider registry and reconciler together: one-shot
//! applies for the CLI, and a resync loop that reconciles every stored
//! cluster, backing off failing ones on a Fibonacci schedule.

use crate::admin::{AdminClientFactory, StoreBackedAdminFactory};
use crate::backoff::FibonacciBackoff;
use crate::error::EngineError;
use crate::reconciler::ClusterReconciler;
use crate::registry;
use crate::startup::{KubeadmRenderer, ScriptRenderer};
use apis::{Action, Cluster, ClusterPhase};
use cluster_store::StoreProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

/// Reconciles the clusters held in one store.
pub struct Controller {
    store: Arc<dyn StoreProvider>,
    admin_factory: Arc<dyn AdminClientFactory>,
    renderer: Arc<dyn ScriptRenderer>,
}

impl Controller {
    #[must_use]
    pub fn new(store: Arc<dyn StoreProvider>) -> Self {
        let admin_factory = Arc::new(StoreBackedAdminFactory::new(store.clone()));
        Self {
            store,
            admin_factory,
            renderer: Arc::new(KubeadmRenderer),
        }
    }

    /// Reconcile one cluster once. On failure the cluster's status
    /// carries the reason and, unless a deletion is in flight, the
    /// Failing phase; repeated applies are the supported recovery path.
    pub async fn apply_cluster(
        &self,
        name: &str,
        dry_run: bool,
    ) -> Result<Vec<Action>, EngineError> {
        let cluster = self.store.clusters().get(name).await?;
        if cluster.status.phase == ClusterPhase::Deleted {
            return Ok(Vec::new());
        }

        // collaborator resolution failures abort before any mutation
        let credential = self
            .store
            .credentials()
            .get(&cluster.spec.credential_name)
            .await?;
        let conn = registry::connector_for(&cluster, &credential)?;

        let mut reconciler = ClusterReconciler::new(
            self.store.clone(),
            conn,
            self.admin_factory.clone(),
            self.renderer.clone(),
            cluster,
        );
        match reconciler.apply(dry_run).await {
            Ok(actions) => Ok(actions),
            Err(e) => {
                warn!(cluster = name, error = %e, "reconciliation failed");
                if !dry_run {
                    self.record_failure(reconciler.cluster(), &e).await;
                }
                Err(e)
            }
        }
    }

    /// Persist the failure reason; a cluster not being deleted moves to
    /// Failing, one being deleted stays in Deleting so the deletion
    /// request remains observable.
    pub(crate) async fn record_failure(&self, cluster: &Cluster, error: &EngineError) {
        let mut cluster = cluster.clone();
        cluster.status.reason = Some(error.to_string());
        if !cluster.deletion_requested() && cluster.status.phase != ClusterPhase::Deleted {
            cluster.status.phase = ClusterPhase::Failing;
        }
        if let Err(e) = self.store.clusters().update_status(&cluster).await {
            error!(cluster = %cluster.name, error = %e, "failed to record failure status");
        }
    }

    /// Reconcile every stored cluster on a fixed resync interval,
    /// skipping failing clusters until their backoff expires.
    pub async fn run(&self, resync: Duration) -> Result<(), EngineError> {
        info!(providers = ?registry::providers(), "cluster controller started");
        let mut backoffs: HashMap<String, (FibonacciBackoff, Instant)> = HashMap::new();

        loop {
            let clusters = self.store.clusters().list().await?;
            for cluster in clusters {
                if cluster.status.phase == ClusterPhase::Deleted {
                    continue;
                }
                let name = cluster.name.clone();
                if let Some((_, not_before)) = backoffs.get(&name) {
                    if Instant::now() < *not_before {
                        continue;
                    }
                }
                match self.apply_cluster(&name, false).await {
                    Ok(_) => {
                        backoffs.remove(&name);
                    }
                    Err(e) => {
                        let entry = backoffs
                            .entry(name.clone())
                            .or_insert_with(|| (FibonacciBackoff::new(1, 600), Instant::now()));
                        let delay = entry.0.next_backoff();
                        entry.1 = Instant::now() + delay;
                        warn!(cluster = %name, error = %e, ?delay, "apply failed, backing off");
                    }
                }
            }
            sleep(resync).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apis::ClusterSpec;
    use chrono::Utc;
    use cluster_store::MemoryStore;

    async fn store_with_cluster(phase: ClusterPhase) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut cluster = Cluster {
            name: "prod".to_string(),
            spec: ClusterSpec {
                cloud_provider: "gce".to_string(),
                zone: "us-central1-a".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                credential_name: "cred".to_string(),
                ..ClusterSpec::default()
            },
            ..Cluster::default()
        };
        cluster.status.phase = phase;
        store.clusters().create(cluster).await.unwrap();
        store
    }

    #[tokio::test]
    async fn deleted_clusters_short_circuit() {
        let store = store_with_cluster(ClusterPhase::Deleted).await;
        let controller = Controller::new(store);
        let actions = controller.apply_cluster("prod", false).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_aborts_without_status_write() {
        let store = store_with_cluster(ClusterPhase::Pending).await;
        let controller = Controller::new(store.clone());
        assert!(controller.apply_cluster("prod", false).await.is_err());
        let cluster = store.clusters().get("prod").await.unwrap();
        // resolution failures leave the cluster untouched
        assert_eq!(cluster.status.phase, ClusterPhase::Pending);
        assert!(cluster.status.reason.is_none());
    }

    #[tokio::test]
    async fn failures_move_the_cluster_to_failing_with_a_reason() {
        let store = store_with_cluster(ClusterPhase::Ready).await;
        let controller = Controller::new(store.clone());
        let cluster = store.clusters().get("prod").await.unwrap();

        let err = EngineError::Convergence("resize stuck".to_string());
        controller.record_failure(&cluster, &err).await;

        let stored = store.clusters().get("prod").await.unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Failing);
        assert!(stored.status.reason.as_deref().unwrap().contains("resize stuck"));
    }

    #[tokio::test]
    async fn failures_during_deletion_keep_the_deleting_phase() {
        let store = store_with_cluster(ClusterPhase::Deleting).await;
        let controller = Controller::new(store.clone());
        let mut cluster = store.clusters().get("prod").await.unwrap();
        cluster.deletion_timestamp = Some(Utc::now());

        let err = EngineError::Convergence("teardown stuck".to_string());
        controller.record_failure(&cluster, &err).await;

        let stored = store.clusters().get("prod").await.unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Deleting);
        assert!(stored.status.reason.is_some());
    }
}
