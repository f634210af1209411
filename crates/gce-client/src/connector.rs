//! GCE implementation of the cloud capability interface
//!
//! Cluster-wide resources map onto one auto-mode network, one internal
//! firewall rule and one reserved regional address that fronts the API
//! server. Node groups use the managed-group capability: instance
//! template -> instance group manager -> autoscaler.

use crate::client::ComputeClient;
use crate::models::{
    AccessConfig, Address, AttachedDisk, Autoscaler, AutoscalingPolicy, DiskInitializeParams,
    Firewall, FirewallAllowed, Instance, InstanceGroupManager, InstanceTemplate,
    InstanceTemplateProperties, Metadata, MetadataItem, Network, NetworkInterface, Operation, Tags,
};
use apis::{Cluster, Credential};
use cloud::{
    AutoscalerBounds, CloudConnector, CloudError, CreateInstanceRequest, Ensure, GroupScaler,
    OperationPoller, OperationRef, OperationScope, OperationStatus, OperationWaiter,
};
use std::collections::BTreeMap;
use tracing::info;

const GROUP_LABEL: &str = "harrow-group";
const CLUSTER_LABEL: &str = "harrow-cluster";
const DEFAULT_IMAGE_PROJECT: &str = "debian-cloud";
const DEFAULT_IMAGE_FAMILY: &str = "debian-12";

/// Connector for one cluster on one GCE project.
#[derive(Debug)]
pub struct GceConnector {
    client: ComputeClient,
    cluster_name: String,
    image_project: String,
    image_family: String,
    waiter: OperationWaiter,
}

impl GceConnector {
    /// Build a connector from the cluster record and its stored
    /// credential. The credential must carry `project` and a pre-issued
    /// `access_token`; `image_project`/`image_family` override the boot
    /// image lookup.
    pub fn new(cluster: &Cluster, credential: &Credential) -> Result<Self, CloudError> {
        let project = credential
            .get("project")
            .ok_or_else(|| CloudError::Auth("credential missing `project`".to_string()))?;
        let token = credential
            .get("access_token")
            .ok_or_else(|| CloudError::Auth("credential missing `access_token`".to_string()))?;
        let region = if cluster.spec.region.is_empty() {
            zone_to_region(&cluster.spec.zone)
        } else {
            cluster.spec.region.clone()
        };
        let client = ComputeClient::new(
            project.to_string(),
            cluster.spec.zone.clone(),
            region,
            token.to_string(),
        )?;
        Ok(Self {
            client,
            cluster_name: cluster.name.clone(),
            image_project: credential
                .get("image_project")
                .unwrap_or(DEFAULT_IMAGE_PROJECT)
                .to_string(),
            image_family: credential
                .get("image_family")
                .unwrap_or(DEFAULT_IMAGE_FAMILY)
                .to_string(),
            waiter: OperationWaiter::default(),
        })
    }

    fn network_name(&self) -> String {
        format!("{}-network", self.cluster_name)
    }

    fn firewall_name(&self) -> String {
        format!("{}-allow-internal", self.cluster_name)
    }

    fn api_address_name(&self) -> String {
        format!("{}-api", self.cluster_name)
    }

    fn network_link(&self) -> String {
        format!(
            "projects/{}/global/networks/{}",
            self.client.project(),
            self.network_name()
        )
    }

    fn template_link(&self, template: &str) -> String {
        format!(
            "projects/{}/global/instanceTemplates/{template}",
            self.client.project()
        )
    }

    fn machine_type_link(&self, sku: &str) -> String {
        format!("zones/{}/machineTypes/{sku}", self.client.zone())
    }

    fn disk_type_link(&self, disk_type: &str) -> String {
        format!("zones/{}/diskTypes/{disk_type}", self.client.zone())
    }

    fn labels(&self, group: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (GROUP_LABEL.to_string(), group.to_string()),
            (CLUSTER_LABEL.to_string(), self.cluster_name.clone()),
        ])
    }

    fn boot_disk(&self, req: &CreateInstanceRequest) -> AttachedDisk {
        AttachedDisk {
            boot: true,
            auto_delete: true,
            initialize_params: Some(DiskInitializeParams {
                disk_type: Some(self.disk_type_link(&req.disk_type)),
                disk_size_gb: Some(req.disk_size_gb),
                source_image: Some(req.image.clone()),
            }),
        }
    }

    fn network_interface(&self, req: &CreateInstanceRequest) -> NetworkInterface {
        let access_configs = if req.external_ip {
            vec![AccessConfig {
                name: Some("External NAT".to_string()),
                kind: Some("ONE_TO_ONE_NAT".to_string()),
                nat_ip: req.reserved_ip.clone(),
            }]
        } else {
            Vec::new()
        };
        NetworkInterface {
            network: Some(self.network_link()),
            network_ip: None,
            access_configs,
        }
    }

    fn startup_metadata(script: &str) -> Metadata {
        Metadata {
            items: vec![MetadataItem {
                key: "startup-script".to_string(),
                value: script.to_string(),
            }],
            fingerprint: None,
        }
    }

    /// Wait on an operation with this connector's own waiter; used for
    /// the cluster-wide ensure steps whose sequencing is internal.
    async fn wait_local(&self, op: Operation, scope: OperationScope) -> Result<(), CloudError> {
        let op_ref = OperationRef { name: op.name, scope };
        self.waiter.wait(self, &op_ref).await
    }

    fn to_instance(gce: Instance) -> cloud::Instance {
        let nic = gce.network_interfaces.first();
        cloud::Instance {
            name: gce.name,
            external_id: gce.id,
            public_ip: nic.and_then(|n| n.access_configs.first()).and_then(|a| a.nat_ip.clone()),
            private_ip: nic.and_then(|n| n.network_ip.clone()),
        }
    }
}

#[async_trait::async_trait]
impl OperationPoller for GceConnector {
    async fn poll_operation(&self, op: &OperationRef) -> Result<OperationStatus, CloudError> {
        let operation = match op.scope {
            OperationScope::Zone => self.client.get_zone_operation(&op.name).await?,
            OperationScope::Region => self.client.get_region_operation(&op.name).await?,
            OperationScope::Global => self.client.get_global_operation(&op.name).await?,
        };
        if let Some(error) = &operation.error {
            let detail = error
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(CloudError::Api(format!(
                "operation `{}` failed: {detail}",
                op.name
            )));
        }
        Ok(match operation.status.as_str() {
            "DONE" => OperationStatus::Done,
            "RUNNING" => OperationStatus::Running,
            _ => OperationStatus::Pending,
        })
    }
}

#[async_trait::async_trait]
impl CloudConnector for GceConnector {
    fn provider(&self) -> &str {
        "gce"
    }

    async fn detect_instance_image(&self) -> Result<String, CloudError> {
        let image = self
            .client
            .get_image_from_family(&self.image_project, &self.image_family)
            .await?
            .ok_or_else(|| {
                CloudError::NotFound(format!(
                    "no image in family `{}/{}`",
                    self.image_project, self.image_family
                ))
            })?;
        Ok(image.self_link.unwrap_or_else(|| {
            format!(
                "projects/{}/global/images/{}",
                self.image_project, image.name
            )
        }))
    }

    async fn has_network(&self) -> Result<bool, CloudError> {
        Ok(self.client.get_network(&self.network_name()).await?.is_some())
    }

    async fn has_firewall(&self) -> Result<bool, CloudError> {
        Ok(self.client.get_firewall(&self.firewall_name()).await?.is_some())
    }

    async fn get_load_balancer(&self) -> Result<Option<String>, CloudError> {
        let address = self.client.get_address(&self.api_address_name()).await?;
        Ok(address
            .filter(|a| !a.address.is_empty())
            .map(|a| format!("{}:6443", a.address)))
    }

    async fn has_ssh_key(&self, name: &str) -> Result<bool, CloudError> {
        let project = self.client.get_project().await?;
        Ok(project
            .common_instance_metadata
            .items
            .iter()
            .any(|item| item.key == "ssh-keys" && item.value.contains(name)))
    }

    async fn get_reserved_ip(&self) -> Result<Option<String>, CloudError> {
        // the api address doubles as the master's static IP
        Ok(None)
    }

    async fn get_instance(&self, name: &str) -> Result<Option<cloud::Instance>, CloudError> {
        Ok(self.client.get_instance(name).await?.map(Self::to_instance))
    }

    async fn list_instances(&self, group: &str) -> Result<Vec<cloud::Instance>, CloudError> {
        let filter = format!("labels.{GROUP_LABEL}=\"{group}\"");
        let instances = self.client.list_instances(&filter).await?;
        Ok(instances
            .into_iter()
            .filter(|i| i.status != "TERMINATED")
            .map(Self::to_instance)
            .collect())
    }

    async fn ensure_network(&self) -> Result<Ensure, CloudError> {
        if self.has_network().await? {
            return Ok(Ensure::Found);
        }
        info!(network = %self.network_name(), "creating network");
        let op = self
            .client
            .insert_network(&Network {
                name: self.network_name(),
                ipv4_range: None,
                auto_create_subnetworks: Some(true),
            })
            .await?;
        self.wait_local(op, OperationScope::Global).await?;
        Ok(Ensure::Created)
    }

    async fn ensure_firewall(&self) -> Result<Ensure, CloudError> {
        if self.has_firewall().await? {
            return Ok(Ensure::Found);
        }
        info!(firewall = %self.firewall_name(), "creating firewall rule");
        let op = self
            .client
            .insert_firewall(&Firewall {
                name: self.firewall_name(),
                network: Some(self.network_link()),
                source_ranges: vec!["10.128.0.0/9".to_string()],
                allowed: vec![
                    FirewallAllowed { ip_protocol: "tcp".to_string(), ports: Vec::new() },
                    FirewallAllowed { ip_protocol: "udp".to_string(), ports: Vec::new() },
                    FirewallAllowed { ip_protocol: "icmp".to_string(), ports: Vec::new() },
                ],
                target_tags: Vec::new(),
            })
            .await?;
        self.wait_local(op, OperationScope::Global).await?;
        Ok(Ensure::Created)
    }

    async fn ensure_load_balancer(&self) -> Result<(String, Ensure), CloudError> {
        if let Some(endpoint) = self.get_load_balancer().await? {
            return Ok((endpoint, Ensure::Found));
        }
        info!(address = %self.api_address_name(), "reserving api address");
        let op = self
            .client
            .insert_address(&Address {
                name: self.api_address_name(),
                ..Address::default()
            })
            .await?;
        self.wait_local(op, OperationScope::Region).await?;
        let endpoint = self.get_load_balancer().await?.ok_or_else(|| {
            CloudError::Api("api address reserved but not resolvable".to_string())
        })?;
        Ok((endpoint, Ensure::Created))
    }

    async fn import_ssh_key(&self, name: &str, public_key: &str) -> Result<String, CloudError> {
        let project = self.client.get_project().await?;
        let mut metadata = project.common_instance_metadata;
        let entry = format!("harrow:{public_key} {name}");
        match metadata.items.iter_mut().find(|item| item.key == "ssh-keys") {
            Some(item) if item.value.contains(name) => return Ok(name.to_string()),
            Some(item) => item.value = format!("{}\n{entry}", item.value),
            None => metadata.items.push(MetadataItem {
                key: "ssh-keys".to_string(),
                value: entry,
            }),
        }
        let op = self.client.set_common_instance_metadata(&metadata).await?;
        self.wait_local(op, OperationScope::Global).await?;
        Ok(name.to_string())
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<(), CloudError> {
        let project = self.client.get_project().await?;
        let mut metadata = project.common_instance_metadata;
        let Some(item) = metadata.items.iter_mut().find(|item| item.key == "ssh-keys") else {
            return Ok(());
        };
        if !item.value.contains(name) {
            return Ok(());
        }
        item.value = item
            .value
            .lines()
            .filter(|line| !line.contains(name))
            .collect::<Vec<_>>()
            .join("\n");
        let op = self.client.set_common_instance_metadata(&metadata).await?;
        self.wait_local(op, OperationScope::Global).await
    }

    async fn release_reserved_ip(&self) -> Result<(), CloudError> {
        // the api address is the only address this connector holds
        match self.client.delete_address(&self.api_address_name()).await {
            Ok(op) => self.wait_local(op, OperationScope::Region).await,
            Err(CloudError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError> {
        info!(instance = %req.name, sku = %req.sku, "creating instance");
        let instance = Instance {
            name: req.name.clone(),
            machine_type: Some(self.machine_type_link(&req.sku)),
            disks: Some(vec![self.boot_disk(req)]),
            network_interfaces: vec![self.network_interface(req)],
            metadata: Some(Self::startup_metadata(&req.startup_script)),
            labels: Some(self.labels(&req.group)),
            tags: Some(Tags { items: vec![format!("{}-node", self.cluster_name)] }),
            ..Instance::default()
        };
        let op = self.client.insert_instance(&instance).await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn delete_instance(&self, name_or_id: &str) -> Result<(), CloudError> {
        info!(instance = %name_or_id, "deleting instance");
        let op = self.client.delete_instance(name_or_id).await?;
        self.wait_local(op, OperationScope::Zone).await
    }

    fn group_scaler(&self) -> Option<&dyn GroupScaler> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl GroupScaler for GceConnector {
    async fn instance_group_exists(&self, group: &str) -> Result<bool, CloudError> {
        Ok(self.client.get_instance_group_manager(group).await?.is_some())
    }

    async fn create_instance_template(
        &self,
        template: &str,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError> {
        info!(%template, sku = %req.sku, "creating instance template");
        let body = InstanceTemplate {
            name: template.to_string(),
            properties: InstanceTemplateProperties {
                machine_type: req.sku.clone(),
                disks: vec![AttachedDisk {
                    boot: true,
                    auto_delete: true,
                    initialize_params: Some(DiskInitializeParams {
                        disk_type: Some(req.disk_type.clone()),
                        disk_size_gb: Some(req.disk_size_gb),
                        source_image: Some(req.image.clone()),
                    }),
                }],
                network_interfaces: vec![self.network_interface(req)],
                metadata: Some(Self::startup_metadata(&req.startup_script)),
                labels: Some(self.labels(&req.group)),
                tags: Some(Tags { items: vec![format!("{}-node", self.cluster_name)] }),
            },
        };
        let op = self.client.insert_instance_template(&body).await?;
        Ok(OperationRef::global(op.name))
    }

    async fn delete_instance_template(&self, template: &str) -> Result<OperationRef, CloudError> {
        let op = self.client.delete_instance_template(template).await?;
        Ok(OperationRef::global(op.name))
    }

    async fn create_instance_group(
        &self,
        group: &str,
        template: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError> {
        info!(%group, %template, size, "creating instance group");
        let op = self
            .client
            .insert_instance_group_manager(&InstanceGroupManager {
                name: group.to_string(),
                base_instance_name: group.to_string(),
                instance_template: self.template_link(template),
                target_size: size,
            })
            .await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn resize_instance_group(
        &self,
        group: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError> {
        info!(%group, size, "resizing instance group");
        let op = self.client.resize_instance_group_manager(group, size).await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn delete_instance_group(&self, group: &str) -> Result<OperationRef, CloudError> {
        let op = self.client.delete_instance_group_manager(group).await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn create_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError> {
        info!(%group, min = bounds.min, max = bounds.max, "creating autoscaler");
        let target = format!(
            "projects/{}/zones/{}/instanceGroupManagers/{group}",
            self.client.project(),
            self.client.zone()
        );
        let op = self
            .client
            .insert_autoscaler(&Autoscaler {
                name: group.to_string(),
                target,
                autoscaling_policy: AutoscalingPolicy {
                    min_num_replicas: bounds.min,
                    max_num_replicas: bounds.max,
                },
            })
            .await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn get_autoscaler(&self, group: &str) -> Result<Option<AutoscalerBounds>, CloudError> {
        Ok(self.client.get_autoscaler(group).await?.map(|a| AutoscalerBounds {
            min: a.autoscaling_policy.min_num_replicas,
            max: a.autoscaling_policy.max_num_replicas,
        }))
    }

    async fn patch_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError> {
        info!(%group, min = bounds.min, max = bounds.max, "patching autoscaler bounds");
        let op = self
            .client
            .patch_autoscaler(
                group,
                &Autoscaler {
                    name: group.to_string(),
                    autoscaling_policy: AutoscalingPolicy {
                        min_num_replicas: bounds.min,
                        max_num_replicas: bounds.max,
                    },
                    ..Autoscaler::default()
                },
            )
            .await?;
        Ok(OperationRef::zonal(op.name))
    }

    async fn delete_autoscaler(&self, group: &str) -> Result<OperationRef, CloudError> {
        let op = self.client.delete_autoscaler(group).await?;
        Ok(OperationRef::zonal(op.name))
    }
}

fn zone_to_region(zone: &str) -> String {
    match zone.rsplit_once('-') {
        Some((region, _)) => region.to_string(),
        None => zone.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_derived_from_zone() {
        assert_eq!(zone_to_region("us-central1-a"), "us-central1");
        assert_eq!(zone_to_region("europe-west4-b"), "europe-west4");
        assert_eq!(zone_to_region("nozone"), "nozone");
    }

    #[test]
    fn connector_requires_project_and_token() {
        let cluster = Cluster {
            name: "c1".to_string(),
            spec: apis::ClusterSpec {
                cloud_provider: "gce".to_string(),
                zone: "us-central1-a".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                credential_name: "cred".to_string(),
                ..apis::ClusterSpec::default()
            },
            ..Cluster::default()
        };
        let empty = Credential {
            name: "cred".to_string(),
            provider: "gce".to_string(),
            ..Credential::default()
        };
        assert!(GceConnector::new(&cluster, &empty).is_err());

        let mut cred = empty;
        cred.data.insert("project".to_string(), "proj".to_string());
        cred.data.insert("access_token".to_string(), "tok".to_string());
        let connector = GceConnector::new(&cluster, &cred).unwrap();
        assert_eq!(connector.provider(), "gce");
        assert_eq!(connector.network_name(), "c1-network");
        assert!(connector.group_scaler().is_some());
    }
}
