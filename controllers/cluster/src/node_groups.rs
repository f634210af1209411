//! Node-group convergence
//!
//! Computes the delta between a group's desired and observed instance
//! counts and drives the provider toward it. Strategy is picked by
//! capability probing: providers with managed groups go through
//! template/group/autoscaler operations, VM-per-instance providers are
//! converged one create or delete at a time.

use crate::actions::ActionLog;
use crate::error::EngineError;
use crate::namer;
use crate::startup::ScriptRenderer;
use apis::{Action, Cluster, NodeGroup};
use cloud::{
    AutoscalerBounds, CloudConnector, CreateInstanceRequest, GroupScaler, Instance, InstanceRole,
    OperationWaiter,
};
use cluster_store::{StoreError, StoreProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Converges one node group against one cloud connector.
pub struct NodeGroupManager {
    store: Arc<dyn StoreProvider>,
    conn: Arc<dyn CloudConnector>,
    renderer: Arc<dyn ScriptRenderer>,
    waiter: OperationWaiter,
}

impl NodeGroupManager {
    pub fn new(
        store: Arc<dyn StoreProvider>,
        conn: Arc<dyn CloudConnector>,
        renderer: Arc<dyn ScriptRenderer>,
        waiter: OperationWaiter,
    ) -> Self {
        Self { store, conn, renderer, waiter }
    }

    /// Converge `group` toward its desired count. Actions for every
    /// sub-step land in `log`; a failure aborts the remaining sub-steps
    /// and leaves the actions already recorded in place.
    pub async fn apply(
        &self,
        cluster: &Cluster,
        group: &mut NodeGroup,
        dry_run: bool,
        log: &mut ActionLog,
    ) -> Result<(), EngineError> {
        let desired = if group.deletion_requested() { 0 } else { group.spec.nodes };

        // A listing failure fails closed: assuming zero observed
        // instances here would double-provision on the next step.
        let instances = self.conn.list_instances(&group.name).await?;
        let observed = instances.len() as i64;
        let delta = desired - observed;

        info!(
            group = %group.name, desired, observed, delta,
            "converging node group"
        );

        if delta == 0 {
            log.record(Action::nop(
                "Node Group",
                format!("no change required for node group `{}`", group.name),
            ));
        } else if let Some(scaler) = self.conn.group_scaler() {
            self.apply_managed(scaler, cluster, group, desired, observed, dry_run, log)
                .await?;
        } else {
            self.apply_instances(cluster, group, delta, &instances, dry_run, log)
                .await?;
        }

        if !dry_run {
            group.status.nodes = desired;
            group.status.observed_generation = group.generation;
            if group.deletion_requested() && desired == 0 {
                match self
                    .store
                    .node_groups()
                    .delete(&group.cluster_name, &group.name)
                    .await
                {
                    Ok(()) => {
                        info!(group = %group.name, "node group record removed");
                    }
                    Err(StoreError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            } else {
                self.store.node_groups().update_status(group).await?;
            }
        }
        Ok(())
    }

    /// Managed-group strategy: template -> group -> autoscaler on the
    /// way up, the reverse on the way down, a bounded resize in between.
    #[allow(clippy::too_many_arguments)]
    async fn apply_managed(
        &self,
        scaler: &dyn GroupScaler,
        cluster: &Cluster,
        group: &NodeGroup,
        desired: i64,
        observed: i64,
        dry_run: bool,
        log: &mut ActionLog,
    ) -> Result<(), EngineError> {
        let template = namer::instance_template(group);
        let exists = scaler.instance_group_exists(&group.name).await?;

        if !exists && observed == 0 && desired > 0 {
            log.record(Action::add(
                "Instance Template",
                format!("instance template `{template}` will be created"),
            ));
            log.record(Action::add(
                "Node Group",
                format!("instance group `{}` with {desired} nodes will be created", group.name),
            ));
            log.record(Action::add(
                "Autoscaler",
                format!("autoscaler for `{}` bounded to [{desired}, {desired}]", group.name),
            ));
            if !dry_run {
                let script = self.renderer.render(InstanceRole::Node, cluster, group)?;
                let request = build_instance_request(
                    cluster,
                    group,
                    group.name.clone(),
                    InstanceRole::Node,
                    script,
                )?;
                let op = scaler.create_instance_template(&template, &request).await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;

                let op = scaler.create_instance_group(&group.name, &template, desired).await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;

                let op = scaler
                    .create_autoscaler(&group.name, AutoscalerBounds::fixed(desired))
                    .await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;
            }
        } else if desired == 0 && observed > 0 {
            // teardown is reverse of creation order
            log.record(Action::delete(
                "Autoscaler",
                format!("autoscaler for `{}` will be deleted", group.name),
            ));
            log.record(Action::delete(
                "Node Group",
                format!("instance group `{}` will be deleted", group.name),
            ));
            log.record(Action::delete(
                "Instance Template",
                format!("instance template `{template}` will be deleted"),
            ));
            if !dry_run {
                if scaler.get_autoscaler(&group.name).await?.is_some() {
                    let op = scaler.delete_autoscaler(&group.name).await?;
                    self.waiter.wait(self.conn.as_ref(), &op).await?;
                }
                let op = scaler.delete_instance_group(&group.name).await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;

                let op = scaler.delete_instance_template(&template).await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;
            }
        } else {
            let action = if desired > observed {
                Action::add(
                    "Node Group",
                    format!(
                        "instance group `{}` will be resized from {observed} to {desired}",
                        group.name
                    ),
                )
            } else {
                Action::delete(
                    "Node Group",
                    format!(
                        "instance group `{}` will be resized from {observed} to {desired}",
                        group.name
                    ),
                )
            };
            log.record(action);
            if !dry_run {
                // bounds are only widened when the target falls outside
                // them; a target inside the current range leaves the
                // autoscaler untouched
                if let Some(bounds) = scaler.get_autoscaler(&group.name).await? {
                    if bounds.excludes(desired) {
                        let op = scaler
                            .patch_autoscaler(&group.name, AutoscalerBounds::fixed(desired))
                            .await?;
                        self.waiter.wait(self.conn.as_ref(), &op).await?;
                    }
                }
                let op = scaler.resize_instance_group(&group.name, desired).await?;
                self.waiter.wait(self.conn.as_ref(), &op).await?;
            }
        }
        Ok(())
    }

    /// VM-per-instance strategy: strictly sequential creates or deletes,
    /// one per unit of delta.
    async fn apply_instances(
        &self,
        cluster: &Cluster,
        group: &NodeGroup,
        delta: i64,
        instances: &[Instance],
        dry_run: bool,
        log: &mut ActionLog,
    ) -> Result<(), EngineError> {
        if delta > 0 {
            log.record(Action::add(
                "Node",
                format!("{delta} node(s) will be added to group `{}`", group.name),
            ));
            if !dry_run {
                let script = self.renderer.render(InstanceRole::Node, cluster, group)?;
                for _ in 0..delta {
                    let name = namer::node_instance(group);
                    let request = build_instance_request(
                        cluster,
                        group,
                        name,
                        InstanceRole::Node,
                        script.clone(),
                    )?;
                    let op = self.conn.create_instance(&request).await?;
                    self.waiter.wait(self.conn.as_ref(), &op).await?;
                }
            }
        } else {
            log.record(Action::delete(
                "Node",
                format!("{} node(s) will be deleted from group `{}`", -delta, group.name),
            ));
            if !dry_run {
                // no ordering guarantee; newest-listed first
                for instance in instances.iter().rev().take((-delta) as usize) {
                    if let Err(e) = self.conn.delete_instance(&instance.name).await {
                        warn!(instance = %instance.name, error = %e, "instance deletion failed");
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Assemble the connector request for one instance of a group.
pub(crate) fn build_instance_request(
    cluster: &Cluster,
    group: &NodeGroup,
    name: String,
    role: InstanceRole,
    startup_script: String,
) -> Result<CreateInstanceRequest, EngineError> {
    let image = group
        .spec
        .template
        .image
        .clone()
        .or_else(|| cluster.spec.instance_image.clone())
        .ok_or_else(|| {
            EngineError::InvalidState(format!(
                "cluster `{}` has no resolved instance image",
                cluster.name
            ))
        })?;
    let external_ip = matches!(role, InstanceRole::Master) || group.spec.template.external_ip;
    Ok(CreateInstanceRequest {
        name,
        role,
        sku: group.spec.template.sku.clone(),
        disk_type: group.spec.template.disk_type.clone(),
        disk_size_gb: group.spec.template.disk_size_gb,
        image,
        startup_script,
        group: group.name.clone(),
        external_ip,
        reserved_ip: match role {
            InstanceRole::Master => cluster.status.reserved_ip.clone(),
            InstanceRole::Node => None,
        },
    })
}

#[cfg(test)]
#[path = "node_groups_test.rs"]
mod node_groups_test;
