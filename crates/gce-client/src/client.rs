//! GCE compute REST client
//!
//! Thin typed wrapper over the compute v1 endpoints the connector needs.
//! Authentication uses a pre-issued OAuth bearer token from the stored
//! credential; minting tokens from service-account keys is the
//! credential tooling's job, not this client's.

use crate::models::*;
use cloud::CloudError;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Typed client for one project/zone/region.
#[derive(Debug, Clone)]
pub struct ComputeClient {
    client: Client,
    base_url: String,
    token: String,
    project: String,
    zone: String,
    region: String,
}

impl ComputeClient {
    pub fn new(
        project: String,
        zone: String,
        region: String,
        token: String,
    ) -> Result<Self, CloudError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), project, zone, region, token)
    }

    /// Point the client at a non-default API endpoint (emulators, tests).
    pub fn with_base_url(
        base_url: String,
        project: String,
        zone: String,
        region: String,
        token: String,
    ) -> Result<Self, CloudError> {
        if token.is_empty() {
            return Err(CloudError::Auth("missing access token".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CloudError::Http)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            project,
            zone,
            region,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.project, suffix)
    }

    fn zonal_url(&self, suffix: &str) -> String {
        self.project_url(&format!("zones/{}/{}", self.zone, suffix))
    }

    fn regional_url(&self, suffix: &str) -> String {
        self.project_url(&format!("regions/{}/{}", self.region, suffix))
    }

    fn global_url(&self, suffix: &str) -> String {
        self.project_url(&format!("global/{suffix}"))
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, CloudError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CloudError::NotFound(what.to_string()));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!("{what}: {status} - {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Api(format!("{what}: {status} - {body}")));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, CloudError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

    /// GET mapping 404 to `None`.
    async fn get_opt<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<Option<T>, CloudError> {
        match self.get_json(url, what).await {
            Ok(value) => Ok(Some(value)),
            Err(CloudError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        what: &str,
    ) -> Result<T, CloudError> {
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

    async fn patch_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        what: &str,
    ) -> Result<T, CloudError> {
        debug!(%url, "PATCH");
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

    async fn delete_json<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, CloudError> {
        debug!(%url, "DELETE");
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

    // Operations -----------------------------------------------------------

    pub async fn get_zone_operation(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("operations/{name}"));
        self.get_json(&url, &format!("zone operation `{name}`")).await
    }

    pub async fn get_region_operation(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.regional_url(&format!("operations/{name}"));
        self.get_json(&url, &format!("region operation `{name}`")).await
    }

    pub async fn get_global_operation(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.global_url(&format!("operations/{name}"));
        self.get_json(&url, &format!("global operation `{name}`")).await
    }

    // Networks / firewalls / addresses --------------------------------------

    pub async fn get_network(&self, name: &str) -> Result<Option<Network>, CloudError> {
        let url = self.global_url(&format!("networks/{name}"));
        self.get_opt(&url, &format!("network `{name}`")).await
    }

    pub async fn insert_network(&self, network: &Network) -> Result<Operation, CloudError> {
        let url = self.global_url("networks");
        self.post_json(&url, network, "insert network").await
    }

    pub async fn get_firewall(&self, name: &str) -> Result<Option<Firewall>, CloudError> {
        let url = self.global_url(&format!("firewalls/{name}"));
        self.get_opt(&url, &format!("firewall `{name}`")).await
    }

    pub async fn insert_firewall(&self, firewall: &Firewall) -> Result<Operation, CloudError> {
        let url = self.global_url("firewalls");
        self.post_json(&url, firewall, "insert firewall").await
    }

    pub async fn get_address(&self, name: &str) -> Result<Option<Address>, CloudError> {
        let url = self.regional_url(&format!("addresses/{name}"));
        self.get_opt(&url, &format!("address `{name}`")).await
    }

    pub async fn insert_address(&self, address: &Address) -> Result<Operation, CloudError> {
        let url = self.regional_url("addresses");
        self.post_json(&url, address, "insert address").await
    }

    pub async fn delete_address(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.regional_url(&format!("addresses/{name}"));
        self.delete_json(&url, &format!("delete address `{name}`")).await
    }

    // Project metadata ------------------------------------------------------

    pub async fn get_project(&self) -> Result<Project, CloudError> {
        let url = format!("{}/projects/{}", self.base_url, self.project);
        self.get_json(&url, "project").await
    }

    pub async fn set_common_instance_metadata(
        &self,
        metadata: &Metadata,
    ) -> Result<Operation, CloudError> {
        let url = format!(
            "{}/projects/{}/setCommonInstanceMetadata",
            self.base_url, self.project
        );
        self.post_json(&url, metadata, "set common instance metadata").await
    }

    // Images ----------------------------------------------------------------

    pub async fn get_image_from_family(
        &self,
        image_project: &str,
        family: &str,
    ) -> Result<Option<Image>, CloudError> {
        let url = format!(
            "{}/projects/{image_project}/global/images/family/{family}",
            self.base_url
        );
        self.get_opt(&url, &format!("image family `{family}`")).await
    }

    // Instances -------------------------------------------------------------

    pub async fn get_instance(&self, name: &str) -> Result<Option<Instance>, CloudError> {
        let url = self.zonal_url(&format!("instances/{name}"));
        self.get_opt(&url, &format!("instance `{name}`")).await
    }

    pub async fn insert_instance(&self, instance: &Instance) -> Result<Operation, CloudError> {
        let url = self.zonal_url("instances");
        self.post_json(&url, instance, "insert instance").await
    }

    pub async fn delete_instance(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("instances/{name}"));
        self.delete_json(&url, &format!("delete instance `{name}`")).await
    }

    pub async fn list_instances(&self, filter: &str) -> Result<Vec<Instance>, CloudError> {
        let mut url = self.zonal_url("instances");
        if !filter.is_empty() {
            url = format!("{url}?filter={}", urlencoding::encode(filter));
        }
        let list: ListResponse<Instance> = self.get_json(&url, "list instances").await?;
        Ok(list.items)
    }

    // Instance templates ----------------------------------------------------

    pub async fn get_instance_template(
        &self,
        name: &str,
    ) -> Result<Option<InstanceTemplate>, CloudError> {
        let url = self.global_url(&format!("instanceTemplates/{name}"));
        self.get_opt(&url, &format!("instance template `{name}`")).await
    }

    pub async fn insert_instance_template(
        &self,
        template: &InstanceTemplate,
    ) -> Result<Operation, CloudError> {
        let url = self.global_url("instanceTemplates");
        self.post_json(&url, template, "insert instance template").await
    }

    pub async fn delete_instance_template(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.global_url(&format!("instanceTemplates/{name}"));
        self.delete_json(&url, &format!("delete instance template `{name}`")).await
    }

    // Instance group managers -----------------------------------------------

    pub async fn get_instance_group_manager(
        &self,
        name: &str,
    ) -> Result<Option<InstanceGroupManager>, CloudError> {
        let url = self.zonal_url(&format!("instanceGroupManagers/{name}"));
        self.get_opt(&url, &format!("instance group `{name}`")).await
    }

    pub async fn insert_instance_group_manager(
        &self,
        manager: &InstanceGroupManager,
    ) -> Result<Operation, CloudError> {
        let url = self.zonal_url("instanceGroupManagers");
        self.post_json(&url, manager, "insert instance group").await
    }

    pub async fn resize_instance_group_manager(
        &self,
        name: &str,
        size: i64,
    ) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("instanceGroupManagers/{name}/resize?size={size}"));
        self.post_json(&url, &serde_json::json!({}), &format!("resize instance group `{name}`"))
            .await
    }

    pub async fn delete_instance_group_manager(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("instanceGroupManagers/{name}"));
        self.delete_json(&url, &format!("delete instance group `{name}`")).await
    }

    // Autoscalers -----------------------------------------------------------

    pub async fn get_autoscaler(&self, name: &str) -> Result<Option<Autoscaler>, CloudError> {
        let url = self.zonal_url(&format!("autoscalers/{name}"));
        self.get_opt(&url, &format!("autoscaler `{name}`")).await
    }

    pub async fn insert_autoscaler(&self, autoscaler: &Autoscaler) -> Result<Operation, CloudError> {
        let url = self.zonal_url("autoscalers");
        self.post_json(&url, autoscaler, "insert autoscaler").await
    }

    pub async fn patch_autoscaler(
        &self,
        name: &str,
        autoscaler: &Autoscaler,
    ) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("autoscalers/{name}"));
        self.patch_json(&url, autoscaler, &format!("patch autoscaler `{name}`")).await
    }

    pub async fn delete_autoscaler(&self, name: &str) -> Result<Operation, CloudError> {
        let url = self.zonal_url(&format!("autoscalers/{name}"));
        self.delete_json(&url, &format!("delete autoscaler `{name}`")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        let result = ComputeClient::new(
            "proj".to_string(),
            "us-central1-a".to_string(),
            "us-central1".to_string(),
            String::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn urls_are_scoped_to_project_zone_region() {
        let client = ComputeClient::new(
            "proj".to_string(),
            "us-central1-a".to_string(),
            "us-central1".to_string(),
            "token".to_string(),
        )
        .unwrap();
        assert_eq!(
            client.zonal_url("instances/a"),
            "https://compute.googleapis.com/compute/v1/projects/proj/zones/us-central1-a/instances/a"
        );
        assert_eq!(
            client.regional_url("addresses/b"),
            "https://compute.googleapis.com/compute/v1/projects/proj/regions/us-central1/addresses/b"
        );
        assert_eq!(
            client.global_url("networks/c"),
            "https://compute.googleapis.com/compute/v1/projects/proj/global/networks/c"
        );
    }
}
