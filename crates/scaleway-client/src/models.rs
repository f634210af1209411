//! Wire models for the Scaleway instance/account APIs
//!
//! Responses arrive wrapped in a singular or plural envelope
//! (`{"server": {...}}`, `{"servers": [...]}`); only the fields the
//! connector touches are modelled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Server {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// "running", "stopped", "starting", ...
    #[serde(default)]
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<ServerIp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub commercial_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerIp {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub address: String,

    /// Whether the address survives server termination
    #[serde(default)]
    pub dynamic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImageRef {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,
}

/// Body for `POST /servers`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CreateServerRequest {
    pub name: String,
    pub commercial_type: String,
    pub image: String,
    pub project: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    pub dynamic_ip_required: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerEnvelope {
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerListEnvelope {
    #[serde(default)]
    pub servers: Vec<Server>,
}

/// Flexible (reserved) IP.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Ip {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IpEnvelope {
    pub ip: Ip,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IpListEnvelope {
    #[serde(default)]
    pub ips: Vec<Ip>,
}

/// Asynchronous task spawned by a server action.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Task {
    #[serde(default)]
    pub id: String,

    /// "pending", "started", "success", "failure"
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskEnvelope {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityGroup {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityGroupListEnvelope {
    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SshKey {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SshKeyEnvelope {
    pub ssh_key: SshKey,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SshKeyListEnvelope {
    #[serde(default)]
    pub ssh_keys: Vec<SshKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Image {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub arch: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImageListEnvelope {
    #[serde(default)]
    pub images: Vec<Image>,
}
