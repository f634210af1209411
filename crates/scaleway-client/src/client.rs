//! Scaleway REST client
//!
//! Typed wrapper over the instance API (zone-scoped) and the account
//! API (SSH keys). Authenticates with the secret key via the
//! `X-Auth-Token` header.

use crate::models::*;
use cloud::CloudError;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const DEFAULT_INSTANCE_URL: &str = "https://api.scaleway.com/instance/v1";
const DEFAULT_ACCOUNT_URL: &str = "https://api.scaleway.com/account/v1";

/// Typed client for one project/zone.
#[derive(Debug, Clone)]
pub struct ScalewayClient {
    client: Client,
    instance_url: String,
    account_url: String,
    token: String,
    project: String,
    zone: String,
}

impl ScalewayClient {
    pub fn new(project: String, zone: String, token: String) -> Result<Self, CloudError> {
        Self::with_base_urls(
            DEFAULT_INSTANCE_URL.to_string(),
            DEFAULT_ACCOUNT_URL.to_string(),
            project,
            zone,
            token,
        )
    }

    /// Point the client at non-default API endpoints (tests).
    pub fn with_base_urls(
        instance_url: String,
        account_url: String,
        project: String,
        zone: String,
        token: String,
    ) -> Result<Self, CloudError> {
        if token.is_empty() {
            return Err(CloudError::Auth("missing secret key".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CloudError::Http)?;
        Ok(Self {
            client,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            account_url: account_url.trim_end_matches('/').to_string(),
            token,
            project,
            zone,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn zonal_url(&self, suffix: &str) -> String {
        format!("{}/zones/{}/{}", self.instance_url, self.zone, suffix)
    }

    fn account_endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.account_url, suffix)
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
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

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
            .header("X-Auth-Token", &self.token)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response, what).await?.json().await?)
    }

    async fn delete(&self, url: &str, what: &str) -> Result<(), CloudError> {
        debug!(%url, "DELETE");
        let response = self
            .client
            .delete(url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await?;
        Self::check(response, what).await?;
        Ok(())
    }

    // Tasks -----------------------------------------------------------------

    pub async fn get_task(&self, id: &str) -> Result<Task, CloudError> {
        let url = self.zonal_url(&format!("tasks/{id}"));
        let envelope: TaskEnvelope = self.get_json(&url, &format!("task `{id}`")).await?;
        Ok(envelope.task)
    }

    // Servers ---------------------------------------------------------------

    pub async fn get_server(&self, id: &str) -> Result<Option<Server>, CloudError> {
        let url = self.zonal_url(&format!("servers/{id}"));
        let envelope: Option<ServerEnvelope> =
            self.get_opt(&url, &format!("server `{id}`")).await?;
        Ok(envelope.map(|e| e.server))
    }

    pub async fn list_servers(&self, tag: Option<&str>) -> Result<Vec<Server>, CloudError> {
        let mut url = self.zonal_url("servers");
        if let Some(tag) = tag {
            url = format!("{url}?tags={}", urlencoding::encode(tag));
        }
        let envelope: ServerListEnvelope = self.get_json(&url, "list servers").await?;
        Ok(envelope.servers)
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<Server, CloudError> {
        let url = self.zonal_url("servers");
        let envelope: ServerEnvelope = self.post_json(&url, req, "create server").await?;
        Ok(envelope.server)
    }

    /// Set cloud-init user data on a server (plain text body).
    pub async fn set_cloud_init(&self, server_id: &str, script: &str) -> Result<(), CloudError> {
        let url = self.zonal_url(&format!("servers/{server_id}/user_data/cloud-init"));
        debug!(%url, "PATCH");
        let response = self
            .client
            .patch(&url)
            .header("X-Auth-Token", &self.token)
            .header("Content-Type", "text/plain")
            .body(script.to_string())
            .send()
            .await?;
        Self::check(response, "set cloud-init").await?;
        Ok(())
    }

    /// Fire a server action ("poweron", "terminate", ...); returns the
    /// asynchronous task to poll.
    pub async fn server_action(&self, server_id: &str, action: &str) -> Result<Task, CloudError> {
        let url = self.zonal_url(&format!("servers/{server_id}/action"));
        let body = serde_json::json!({ "action": action });
        let envelope: TaskEnvelope = self
            .post_json(&url, &body, &format!("server action `{action}`"))
            .await?;
        Ok(envelope.task)
    }

    // Flexible IPs ----------------------------------------------------------

    pub async fn list_ips(&self) -> Result<Vec<Ip>, CloudError> {
        let url = self.zonal_url("ips");
        let envelope: IpListEnvelope = self.get_json(&url, "list ips").await?;
        Ok(envelope.ips)
    }

    pub async fn create_ip(&self, tags: Vec<String>) -> Result<Ip, CloudError> {
        let url = self.zonal_url("ips");
        let body = serde_json::json!({ "project": self.project, "tags": tags });
        let envelope: IpEnvelope = self.post_json(&url, &body, "create ip").await?;
        Ok(envelope.ip)
    }

    pub async fn delete_ip(&self, id: &str) -> Result<(), CloudError> {
        let url = self.zonal_url(&format!("ips/{id}"));
        self.delete(&url, &format!("delete ip `{id}`")).await
    }

    // Security groups -------------------------------------------------------

    pub async fn list_security_groups(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<SecurityGroup>, CloudError> {
        let mut url = self.zonal_url("security_groups");
        if let Some(name) = name {
            url = format!("{url}?name={}", urlencoding::encode(name));
        }
        let envelope: SecurityGroupListEnvelope =
            self.get_json(&url, "list security groups").await?;
        Ok(envelope.security_groups)
    }

    pub async fn create_security_group(
        &self,
        group: &SecurityGroup,
    ) -> Result<SecurityGroup, CloudError> {
        let url = self.zonal_url("security_groups");
        let body = serde_json::json!({
            "name": group.name,
            "description": group.description,
            "project": self.project,
        });
        #[derive(serde::Deserialize)]
        struct Envelope {
            security_group: SecurityGroup,
        }
        let envelope: Envelope = self.post_json(&url, &body, "create security group").await?;
        Ok(envelope.security_group)
    }

    // SSH keys --------------------------------------------------------------

    pub async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, CloudError> {
        let url = self.account_endpoint("ssh_keys");
        let envelope: SshKeyListEnvelope = self.get_json(&url, "list ssh keys").await?;
        Ok(envelope.ssh_keys)
    }

    pub async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey, CloudError> {
        let url = self.account_endpoint("ssh_keys");
        let body = serde_json::json!({ "name": name, "public_key": public_key });
        let envelope: SshKeyEnvelope = self.post_json(&url, &body, "create ssh key").await?;
        Ok(envelope.ssh_key)
    }

    pub async fn delete_ssh_key(&self, id: &str) -> Result<(), CloudError> {
        let url = self.account_endpoint(&format!("ssh_keys/{id}"));
        self.delete(&url, &format!("delete ssh key `{id}`")).await
    }

    // Images ----------------------------------------------------------------

    pub async fn list_images(&self, name: Option<&str>) -> Result<Vec<Image>, CloudError> {
        let mut url = self.zonal_url("images");
        if let Some(name) = name {
            url = format!("{url}?name={}", urlencoding::encode(name));
        }
        let envelope: ImageListEnvelope = self.get_json(&url, "list images").await?;
        Ok(envelope.images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(
            ScalewayClient::new("proj".to_string(), "fr-par-1".to_string(), String::new())
                .is_err()
        );
    }

    #[test]
    fn urls_are_zone_scoped() {
        let client =
            ScalewayClient::new("proj".to_string(), "fr-par-1".to_string(), "tok".to_string())
                .unwrap();
        assert_eq!(
            client.zonal_url("servers"),
            "https://api.scaleway.com/instance/v1/zones/fr-par-1/servers"
        );
        assert_eq!(
            client.account_endpoint("ssh_keys"),
            "https://api.scaleway.com/account/v1/ssh_keys"
        );
    }
}
