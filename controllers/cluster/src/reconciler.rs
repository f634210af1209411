//! Cluster reconciliation state machine
//!
//! One apply call drives a declared cluster toward its desired cloud
//! state: create (network, firewall, load balancer, master) for Pending
//! clusters, upgrade detection for Ready ones, node-group convergence
//! on every pass, and teardown once a deletion timestamp is set.
//!
//! Status is persisted after every phase transition, not only at the
//! end, so a crash mid-reconciliation leaves an observable, resumable
//! phase. Partial cloud effects are never rolled back; re-running apply
//! is the recovery path, and every ensure step is get-or-create.

use crate::actions::ActionLog;
use crate::admin::AdminClientFactory;
use crate::error::EngineError;
use crate::namer;
use crate::node_groups::{NodeGroupManager, build_instance_request};
use crate::startup::ScriptRenderer;
use apis::{Action, Cluster, ClusterPhase, NodeGroup};
use chrono::Utc;
use cloud::{CloudConnector, InstanceRole, OperationWaiter};
use cluster_store::{StoreError, StoreProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

const DEFAULT_CONTROL_PLANE_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_CONTROL_PLANE_TIMEOUT: Duration = Duration::from_secs(600);

/// Label carried by control-plane nodes.
const CONTROL_PLANE_SELECTOR: &str = "node-role.kubernetes.io/control-plane";

/// Reconciles one cluster; at most one apply may be in flight per
/// cluster, which is the caller's responsibility to uphold.
pub struct ClusterReconciler {
    store: Arc<dyn StoreProvider>,
    conn: Arc<dyn CloudConnector>,
    admin: Arc<dyn AdminClientFactory>,
    renderer: Arc<dyn ScriptRenderer>,
    waiter: OperationWaiter,
    control_plane_interval: Duration,
    control_plane_timeout: Duration,
    cluster: Cluster,
    log: ActionLog,
}

impl ClusterReconciler {
    pub fn new(
        store: Arc<dyn StoreProvider>,
        conn: Arc<dyn CloudConnector>,
        admin: Arc<dyn AdminClientFactory>,
        renderer: Arc<dyn ScriptRenderer>,
        cluster: Cluster,
    ) -> Self {
        Self {
            store,
            conn,
            admin,
            renderer,
            waiter: OperationWaiter::default(),
            control_plane_interval: DEFAULT_CONTROL_PLANE_INTERVAL,
            control_plane_timeout: DEFAULT_CONTROL_PLANE_TIMEOUT,
            cluster,
            log: ActionLog::new(),
        }
    }

    /// Replace the operation waiter (tests shrink the intervals).
    #[must_use]
    #[allow(dead_code)]
    pub fn with_waiter(mut self, waiter: OperationWaiter) -> Self {
        self.waiter = waiter;
        self
    }

    /// Shrink the control-plane readiness poll (tests).
    #[must_use]
    #[allow(dead_code)]
    pub fn with_control_plane_wait(mut self, interval: Duration, timeout: Duration) -> Self {
        self.control_plane_interval = interval;
        self.control_plane_timeout = timeout;
        self
    }

    /// The cluster as this reconciler last saw it.
    #[must_use]
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Actions recorded by the current/last apply, available after a
    /// failure for auditing the partial run.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        self.log.actions()
    }

    /// Drive the cluster one step toward its declared state.
    ///
    /// Returns the ordered action list. With `dry_run` no mutating
    /// connector call and no store write is issued; the actions describe
    /// what a real run would attempt.
    pub async fn apply(&mut self, dry_run: bool) -> Result<Vec<Action>, EngineError> {
        self.log = ActionLog::new();

        match self.cluster.status.phase {
            ClusterPhase::Unknown => {
                return Err(EngineError::InvalidState(format!(
                    "cluster `{}` is in unknown phase",
                    self.cluster.name
                )));
            }
            ClusterPhase::Deleted => {
                info!(cluster = %self.cluster.name, "cluster is already deleted, ignoring");
                return Ok(Vec::new());
            }
            ClusterPhase::Upgrading => {
                return Err(EngineError::Conflict(format!(
                    "cluster `{}` is upgrading; retry after it returns to Ready",
                    self.cluster.name
                )));
            }
            _ => {}
        }

        // resolve and cache the provider image; persisted with the next
        // status write
        if self.cluster.spec.instance_image.is_none() {
            let image = self.conn.detect_instance_image().await?;
            info!(%image, "resolved instance image");
            self.cluster.spec.instance_image = Some(image);
        }

        let deleting = self.cluster.deletion_requested();

        if self.cluster.status.phase == ClusterPhase::Ready && !deleting {
            let admin = self.admin.client_for(&self.cluster).await?;
            let running = admin.running_version().await?;
            if running != self.cluster.spec.kubernetes_version {
                info!(
                    %running,
                    desired = %self.cluster.spec.kubernetes_version,
                    "version drift detected, upgrading"
                );
                if !dry_run {
                    self.cluster.status.phase = ClusterPhase::Upgrading;
                    self.persist_status().await?;
                }
                self.apply_upgrade(dry_run).await?;
                return Ok(self.log.actions().to_vec());
            }
        }

        if self.cluster.status.phase == ClusterPhase::Pending && !deleting {
            self.apply_create(dry_run).await?;
        }

        if deleting && self.cluster.status.phase != ClusterPhase::Deleted {
            // observers must never see Ready on a cluster marked for
            // deletion
            if !dry_run && self.cluster.status.phase != ClusterPhase::Deleting {
                self.cluster.status.phase = ClusterPhase::Deleting;
                self.persist_status().await?;
            }
            self.drain_node_groups(dry_run).await?;
        }

        self.apply_scale(dry_run).await?;

        if deleting && self.cluster.status.phase != ClusterPhase::Deleted {
            self.apply_delete(dry_run).await?;
        }

        if !dry_run {
            self.cluster.status.observed_generation = self.cluster.generation;
            self.cluster.status.reason = None;
            self.persist_status().await?;
        }
        Ok(self.log.actions().to_vec())
    }

    /// Ensure cluster-wide resources and exactly one master instance,
    /// then declare the cluster Ready.
    async fn apply_create(&mut self, dry_run: bool) -> Result<(), EngineError> {
        info!(cluster = %self.cluster.name, "creating cluster resources");

        // the key import is bookkeeping, not an externally interesting
        // change; it leaves no action
        let key_name = namer::ssh_key(&self.cluster.name);
        if !dry_run && !self.conn.has_ssh_key(&key_name).await? {
            let key = self.store.ssh_keys().get(&self.cluster.name).await?;
            let id = self.conn.import_ssh_key(&key_name, &key.public_key).await?;
            self.cluster.status.ssh_key_id = Some(id);
        }

        if self.conn.has_network().await? {
            self.log
                .record(Action::nop("Default Network", "found existing cluster network"));
        } else {
            self.log
                .record(Action::add("Default Network", "cluster network will be created"));
            if !dry_run {
                self.conn.ensure_network().await?;
            }
        }

        if self.conn.has_firewall().await? {
            self.log
                .record(Action::nop("Firewall Rule", "found existing firewall rules"));
        } else {
            self.log.record(Action::add(
                "Firewall Rule",
                "internal traffic and ssh firewall rules will be created",
            ));
            if !dry_run {
                self.conn.ensure_firewall().await?;
            }
        }

        match self.conn.get_load_balancer().await? {
            Some(endpoint) => {
                self.log.record(Action::nop(
                    "Load Balancer",
                    format!("found api endpoint {endpoint}"),
                ));
                self.cluster.status.api_endpoint = Some(endpoint);
            }
            None => {
                self.log.record(Action::add(
                    "Load Balancer",
                    "api endpoint will be provisioned",
                ));
                if !dry_run {
                    let (endpoint, _) = self.conn.ensure_load_balancer().await?;
                    self.cluster.status.api_endpoint = Some(endpoint);
                }
            }
        }

        if !dry_run && self.cluster.status.reserved_ip.is_none() {
            match self.conn.get_reserved_ip().await? {
                Some(ip) => self.cluster.status.reserved_ip = Some(ip),
                None => {
                    if let Some(ip) = self.conn.reserve_ip().await? {
                        self.cluster.status.reserved_ip = Some(ip);
                    }
                }
            }
        }

        let master_group = self.master_group().await?;
        let master_name = namer::master_instance(&self.cluster);
        match self.conn.get_instance(&master_name).await? {
            Some(instance) => {
                self.log.record(Action::nop(
                    "Master Instance",
                    format!("master instance `{master_name}` already exists"),
                ));
                if self.cluster.status.api_endpoint.is_none() {
                    if let Some(ip) = instance.public_ip {
                        self.cluster.status.api_endpoint = Some(format!("{ip}:6443"));
                    }
                }
            }
            None => {
                self.log.record(Action::add(
                    "Master Instance",
                    format!("master instance `{master_name}` will be created"),
                ));
                if !dry_run {
                    let script =
                        self.renderer
                            .render(InstanceRole::Master, &self.cluster, &master_group)?;
                    let request = build_instance_request(
                        &self.cluster,
                        &master_group,
                        master_name.clone(),
                        InstanceRole::Master,
                        script,
                    )?;
                    let op = self.conn.create_instance(&request).await?;
                    self.waiter.wait(self.conn.as_ref(), &op).await?;

                    if self.cluster.status.api_endpoint.is_none() {
                        if let Some(instance) = self.conn.get_instance(&master_name).await? {
                            if let Some(ip) = instance.public_ip {
                                self.cluster.status.api_endpoint = Some(format!("{ip}:6443"));
                            }
                        }
                    }

                    let mut master_group = master_group;
                    master_group.status.nodes = 1;
                    master_group.status.observed_generation = master_group.generation;
                    self.store.node_groups().update_status(&master_group).await?;
                }
            }
        }

        if !dry_run {
            self.wait_for_control_plane().await?;
            self.cluster.status.phase = ClusterPhase::Ready;
            self.persist_status().await?;
            info!(cluster = %self.cluster.name, "cluster is ready");
        }
        Ok(())
    }

    /// Record the upgrade intent and wait for the control plane to
    /// report the desired version. The node-side package replacement is
    /// carried out by the update machinery each instance's startup
    /// script installed; this engine observes it rather than driving it.
    async fn apply_upgrade(&mut self, dry_run: bool) -> Result<(), EngineError> {
        let desired = self.cluster.spec.kubernetes_version.clone();
        self.log.record(Action::add(
            "Master Instance",
            format!("control plane will be upgraded to {desired}"),
        ));
        let groups = self.store.node_groups().list(&self.cluster.name).await?;
        for group in &groups {
            if group.is_master() {
                continue;
            }
            self.log.record(Action::add(
                "Node Group",
                format!("kubelets in group `{}` will be upgraded to {desired}", group.name),
            ));
        }
        if !dry_run {
            self.wait_for_version(&desired).await?;
            self.cluster.status.phase = ClusterPhase::Ready;
            self.persist_status().await?;
            info!(cluster = %self.cluster.name, version = %desired, "upgrade complete");
        }
        Ok(())
    }

    /// Force every worker group's desired count to zero so the scale
    /// pass drains nodes before teardown.
    async fn drain_node_groups(&mut self, dry_run: bool) -> Result<(), EngineError> {
        let groups = self.store.node_groups().list(&self.cluster.name).await?;
        for mut group in groups {
            if group.is_master() {
                continue;
            }
            if group.spec.nodes != 0 || !group.deletion_requested() {
                group.spec.nodes = 0;
                group.deletion_timestamp.get_or_insert_with(Utc::now);
                if !dry_run {
                    self.store.node_groups().update(group).await?;
                }
            }
        }
        Ok(())
    }

    /// Converge every worker group; the master is managed by the
    /// create/delete paths, never scaled here.
    async fn apply_scale(&mut self, dry_run: bool) -> Result<(), EngineError> {
        let deleting = self.cluster.deletion_requested();
        let manager = NodeGroupManager::new(
            self.store.clone(),
            self.conn.clone(),
            self.renderer.clone(),
            self.waiter.clone(),
        );
        let groups = self.store.node_groups().list(&self.cluster.name).await?;
        for mut group in groups {
            if group.is_master() {
                continue;
            }
            if deleting {
                // also covers the dry-run case, where the drain above
                // did not persist anything
                group.spec.nodes = 0;
                group.deletion_timestamp.get_or_insert_with(Utc::now);
            }
            manager
                .apply(&self.cluster, &mut group, dry_run, &mut self.log)
                .await?;
        }
        Ok(())
    }

    /// Tear down cluster-wide resources and mark the cluster Deleted.
    async fn apply_delete(&mut self, dry_run: bool) -> Result<(), EngineError> {
        info!(cluster = %self.cluster.name, "tearing down cluster resources");

        let master_name = namer::master_instance(&self.cluster);
        match self.conn.get_instance(&master_name).await? {
            Some(_) => {
                self.log.record(Action::delete(
                    "Master Instance",
                    format!("master instance `{master_name}` will be deleted"),
                ));
                if !dry_run {
                    self.conn.delete_instance(&master_name).await?;
                }
            }
            None => {
                self.log
                    .record(Action::nop("Master Instance", "master instance already absent"));
            }
        }

        let has_address = self.cluster.status.reserved_ip.is_some()
            || self.conn.get_load_balancer().await?.is_some();
        if has_address {
            self.log
                .record(Action::delete("Reserved IP", "api address will be released"));
            if !dry_run {
                self.conn.release_reserved_ip().await?;
                self.cluster.status.reserved_ip = None;
                self.cluster.status.api_endpoint = None;
            }
        }

        let key_name = namer::ssh_key(&self.cluster.name);
        if self.conn.has_ssh_key(&key_name).await? {
            self.log.record(Action::delete(
                "SSH Key",
                format!("imported key `{key_name}` will be removed"),
            ));
            if !dry_run {
                self.conn.delete_ssh_key(&key_name).await?;
                match self.store.ssh_keys().delete(&self.cluster.name).await {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                self.cluster.status.ssh_key_id = None;
            }
        }

        if !dry_run {
            self.cluster.status.phase = ClusterPhase::Deleted;
            self.persist_status().await?;
            info!(cluster = %self.cluster.name, "cluster deleted");
        }
        Ok(())
    }

    /// The cluster's single master group; exactly one must exist.
    async fn master_group(&self) -> Result<NodeGroup, EngineError> {
        let groups = self.store.node_groups().list(&self.cluster.name).await?;
        let mut masters = groups.into_iter().filter(NodeGroup::is_master);
        let master = masters.next().ok_or_else(|| {
            EngineError::InvalidState(format!(
                "cluster `{}` has no master node group",
                self.cluster.name
            ))
        })?;
        if masters.next().is_some() {
            return Err(EngineError::InvalidState(format!(
                "cluster `{}` has more than one master node group",
                self.cluster.name
            )));
        }
        Ok(master)
    }

    /// Poll the admin client until the master node reports Ready.
    async fn wait_for_control_plane(&self) -> Result<(), EngineError> {
        let admin = self.admin.client_for(&self.cluster).await?;
        let mut waited = Duration::ZERO;
        loop {
            match admin.count_ready_nodes(CONTROL_PLANE_SELECTOR).await {
                Ok(ready) if ready >= 1 => {
                    info!(ready, "control plane is up");
                    return Ok(());
                }
                Ok(_) => debug!("master node not ready yet"),
                Err(e) => debug!(error = %e, "control plane not answering yet"),
            }
            if waited >= self.control_plane_timeout {
                return Err(EngineError::Convergence(format!(
                    "control plane of `{}` did not come up within {waited:?}",
                    self.cluster.name
                )));
            }
            sleep(self.control_plane_interval).await;
            waited += self.control_plane_interval;
        }
    }

    /// Poll the admin client until it reports `desired`.
    async fn wait_for_version(&self, desired: &str) -> Result<(), EngineError> {
        let admin = self.admin.client_for(&self.cluster).await?;
        let mut waited = Duration::ZERO;
        loop {
            match admin.running_version().await {
                Ok(version) if version == desired => return Ok(()),
                Ok(version) => {
                    debug!(running = %version, desired, "waiting for control plane upgrade");
                }
                Err(e) => debug!(error = %e, "control plane unavailable during upgrade"),
            }
            if waited >= self.control_plane_timeout {
                return Err(EngineError::Convergence(format!(
                    "control plane of `{}` did not reach version {desired} within {waited:?}",
                    self.cluster.name
                )));
            }
            sleep(self.control_plane_interval).await;
            waited += self.control_plane_interval;
        }
    }

    async fn persist_status(&mut self) -> Result<(), EngineError> {
        let updated = self.store.clusters().update_status(&self.cluster).await?;
        self.cluster.status = updated.status;
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
