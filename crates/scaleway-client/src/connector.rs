//! Scaleway implementation of the cloud capability interface
//!
//! Scaleway provisions platform networking implicitly, so the network
//! probe always reports present. The cluster firewall maps to a
//! security group, the "load balancer" to a flexible IP tagged for the
//! cluster, and node groups are raw VMs carrying the group name as a
//! tag. No group-scaler capability: the engine scales this provider one
//! instance at a time.
//!
//! Deleting an instance terminates the server and then releases its
//! flexible IP, so no dependent resources leak.

use crate::client::ScalewayClient;
use crate::models::{CreateServerRequest, SecurityGroup, Server};
use apis::{Cluster, Credential};
use cloud::{
    CloudConnector, CloudError, CreateInstanceRequest, Ensure, Instance, OperationPoller,
    OperationRef, OperationStatus, OperationWaiter,
};
use tracing::info;

/// Connector for one cluster on one Scaleway project.
#[derive(Debug)]
pub struct ScalewayConnector {
    client: ScalewayClient,
    cluster_name: String,
    image_name: String,
    waiter: OperationWaiter,
}

impl ScalewayConnector {
    /// Build a connector from the cluster record and its stored
    /// credential. The credential must carry `project_id` and
    /// `secret_key`; `image` overrides the boot image lookup.
    pub fn new(cluster: &Cluster, credential: &Credential) -> Result<Self, CloudError> {
        let project = credential
            .get("project_id")
            .ok_or_else(|| CloudError::Auth("credential missing `project_id`".to_string()))?;
        let token = credential
            .get("secret_key")
            .ok_or_else(|| CloudError::Auth("credential missing `secret_key`".to_string()))?;
        let client = ScalewayClient::new(
            project.to_string(),
            cluster.spec.zone.clone(),
            token.to_string(),
        )?;
        Ok(Self {
            client,
            cluster_name: cluster.name.clone(),
            image_name: credential.get("image").unwrap_or("Ubuntu 22.04").to_string(),
            waiter: OperationWaiter::default(),
        })
    }

    fn security_group_name(&self) -> String {
        format!("{}-sg", self.cluster_name)
    }

    fn api_ip_tag(&self) -> String {
        format!("{}-api", self.cluster_name)
    }

    async fn find_server(&self, name_or_id: &str) -> Result<Option<Server>, CloudError> {
        if let Some(server) = self.client.get_server(name_or_id).await? {
            return Ok(Some(server));
        }
        let servers = self.client.list_servers(None).await?;
        Ok(servers.into_iter().find(|s| s.name == name_or_id))
    }

    async fn find_api_ip(&self) -> Result<Option<crate::models::Ip>, CloudError> {
        let tag = self.api_ip_tag();
        let ips = self.client.list_ips().await?;
        Ok(ips.into_iter().find(|ip| ip.tags.contains(&tag)))
    }

    fn to_instance(server: Server) -> Instance {
        Instance {
            name: server.name,
            external_id: server.id,
            public_ip: server.public_ip.map(|ip| ip.address),
            private_ip: server.private_ip,
        }
    }
}

#[async_trait::async_trait]
impl OperationPoller for ScalewayConnector {
    async fn poll_operation(&self, op: &OperationRef) -> Result<OperationStatus, CloudError> {
        let task = self.client.get_task(&op.name).await?;
        match task.status.as_str() {
            "success" => Ok(OperationStatus::Done),
            "failure" => Err(CloudError::Api(format!("task `{}` failed", op.name))),
            "started" => Ok(OperationStatus::Running),
            _ => Ok(OperationStatus::Pending),
        }
    }
}

#[async_trait::async_trait]
impl CloudConnector for ScalewayConnector {
    fn provider(&self) -> &str {
        "scaleway"
    }

    async fn detect_instance_image(&self) -> Result<String, CloudError> {
        let images = self.client.list_images(Some(&self.image_name)).await?;
        images
            .first()
            .map(|image| image.id.clone())
            .ok_or_else(|| CloudError::NotFound(format!("image `{}`", self.image_name)))
    }

    async fn has_network(&self) -> Result<bool, CloudError> {
        // platform networking is implicit; nothing to provision
        Ok(true)
    }

    async fn has_firewall(&self) -> Result<bool, CloudError> {
        let groups = self
            .client
            .list_security_groups(Some(&self.security_group_name()))
            .await?;
        Ok(!groups.is_empty())
    }

    async fn get_load_balancer(&self) -> Result<Option<String>, CloudError> {
        Ok(self
            .find_api_ip()
            .await?
            .map(|ip| format!("{}:6443", ip.address)))
    }

    async fn has_ssh_key(&self, name: &str) -> Result<bool, CloudError> {
        let keys = self.client.list_ssh_keys().await?;
        Ok(keys.iter().any(|key| key.name == name))
    }

    async fn get_reserved_ip(&self) -> Result<Option<String>, CloudError> {
        Ok(self.find_api_ip().await?.map(|ip| ip.address))
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, CloudError> {
        Ok(self.find_server(name).await?.map(Self::to_instance))
    }

    async fn list_instances(&self, group: &str) -> Result<Vec<Instance>, CloudError> {
        let servers = self.client.list_servers(Some(group)).await?;
        Ok(servers
            .into_iter()
            .filter(|s| s.state != "stopped")
            .map(Self::to_instance)
            .collect())
    }

    async fn ensure_network(&self) -> Result<Ensure, CloudError> {
        Ok(Ensure::Found)
    }

    async fn ensure_firewall(&self) -> Result<Ensure, CloudError> {
        if self.has_firewall().await? {
            return Ok(Ensure::Found);
        }
        info!(group = %self.security_group_name(), "creating security group");
        self.client
            .create_security_group(&SecurityGroup {
                name: self.security_group_name(),
                description: format!("managed by harrow for cluster {}", self.cluster_name),
                ..SecurityGroup::default()
            })
            .await?;
        Ok(Ensure::Created)
    }

    async fn ensure_load_balancer(&self) -> Result<(String, Ensure), CloudError> {
        if let Some(endpoint) = self.get_load_balancer().await? {
            return Ok((endpoint, Ensure::Found));
        }
        info!(tag = %self.api_ip_tag(), "reserving api address");
        let ip = self.client.create_ip(vec![self.api_ip_tag()]).await?;
        Ok((format!("{}:6443", ip.address), Ensure::Created))
    }

    async fn import_ssh_key(&self, name: &str, public_key: &str) -> Result<String, CloudError> {
        if self.has_ssh_key(name).await? {
            return Ok(name.to_string());
        }
        let key = self.client.create_ssh_key(name, public_key).await?;
        Ok(key.id)
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<(), CloudError> {
        let keys = self.client.list_ssh_keys().await?;
        if let Some(key) = keys.iter().find(|key| key.name == name) {
            self.client.delete_ssh_key(&key.id).await?;
        }
        Ok(())
    }

    async fn release_reserved_ip(&self) -> Result<(), CloudError> {
        if let Some(ip) = self.find_api_ip().await? {
            info!(address = %ip.address, "releasing api address");
            self.client.delete_ip(&ip.id).await?;
        }
        Ok(())
    }

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError> {
        info!(instance = %req.name, sku = %req.sku, "creating server");
        let server = self
            .client
            .create_server(&CreateServerRequest {
                name: req.name.clone(),
                commercial_type: req.sku.clone(),
                image: req.image.clone(),
                project: self.client.project().to_string(),
                tags: vec![req.group.clone(), self.cluster_name.clone()],
                public_ip: req.reserved_ip.clone(),
                dynamic_ip_required: req.external_ip && req.reserved_ip.is_none(),
            })
            .await?;
        self.client.set_cloud_init(&server.id, &req.startup_script).await?;
        let task = self.client.server_action(&server.id, "poweron").await?;
        Ok(OperationRef::zonal(task.id))
    }

    async fn delete_instance(&self, name_or_id: &str) -> Result<(), CloudError> {
        let Some(server) = self.find_server(name_or_id).await? else {
            return Ok(());
        };
        info!(instance = %server.name, "terminating server");
        let flexible_ip = server.public_ip.as_ref().filter(|ip| !ip.dynamic).cloned();
        let task = self.client.server_action(&server.id, "terminate").await?;
        self.waiter.wait(self, &OperationRef::zonal(task.id)).await?;
        // terminate frees the server and volumes; the flexible IP is a
        // separate resource and must be released explicitly
        if let Some(ip) = flexible_ip {
            self.client.delete_ip(&ip.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster {
            name: "c1".to_string(),
            spec: apis::ClusterSpec {
                cloud_provider: "scaleway".to_string(),
                zone: "fr-par-1".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                credential_name: "cred".to_string(),
                ..apis::ClusterSpec::default()
            },
            ..Cluster::default()
        }
    }

    #[test]
    fn connector_requires_project_and_secret() {
        let empty = Credential {
            name: "cred".to_string(),
            provider: "scaleway".to_string(),
            ..Credential::default()
        };
        assert!(ScalewayConnector::new(&cluster(), &empty).is_err());

        let mut cred = empty;
        cred.data.insert("project_id".to_string(), "p-1".to_string());
        cred.data.insert("secret_key".to_string(), "sk".to_string());
        let connector = ScalewayConnector::new(&cluster(), &cred).unwrap();
        assert_eq!(connector.provider(), "scaleway");
        assert_eq!(connector.security_group_name(), "c1-sg");
    }

    #[test]
    fn no_group_scaler_capability() {
        let mut cred = Credential {
            name: "cred".to_string(),
            provider: "scaleway".to_string(),
            ..Credential::default()
        };
        cred.data.insert("project_id".to_string(), "p-1".to_string());
        cred.data.insert("secret_key".to_string(), "sk".to_string());
        let connector = ScalewayConnector::new(&cluster(), &cred).unwrap();
        assert!(connector.group_scaler().is_none());
    }
}
