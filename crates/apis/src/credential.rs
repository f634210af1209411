//! Stored credential material
//!
//! Opaque key/value credential records plus SSH and CA key pairs. The
//! engine threads these through to connectors and the admin client
//! without interpreting them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named cloud credential.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub name: String,

    /// Provider this credential authenticates against
    pub provider: String,

    /// Provider-specific fields ("project", "token", ...)
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Credential {
    /// Look up one credential field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// SSH key pair imported into the provider for node access.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyPair {
    pub name: String,

    /// OpenSSH-format public key
    pub public_key: String,

    /// PEM-encoded private key
    pub private_key: String,
}

/// Cluster CA material used to mint the admin kubeconfig.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaKeyPair {
    /// PEM-encoded CA certificate
    pub cert_pem: String,

    /// PEM-encoded CA private key
    pub key_pem: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_lookup() {
        let mut cred = Credential {
            name: "gce-prod".to_string(),
            provider: "gce".to_string(),
            data: BTreeMap::new(),
        };
        cred.data.insert("project".to_string(), "my-project".to_string());
        assert_eq!(cred.get("project"), Some("my-project"));
        assert_eq!(cred.get("token"), None);
    }
}
