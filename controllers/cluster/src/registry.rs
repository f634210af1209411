//! Provider registry
//!
//! Compile-time table mapping provider names to connector constructors.
//! Adding a provider means adding one row; the engine never switches on
//! provider names anywhere else.

use crate::error::EngineError;
use apis::{Cluster, Credential};
use cloud::{CloudConnector, CloudError};
use gce_client::GceConnector;
use scaleway_client::ScalewayConnector;
use std::sync::Arc;

type ConnectorCtor = fn(&Cluster, &Credential) -> Result<Arc<dyn CloudConnector>, CloudError>;

const PROVIDERS: &[(&str, ConnectorCtor)] = &[
    ("gce", new_gce),
    ("scaleway", new_scaleway),
];

fn new_gce(cluster: &Cluster, credential: &Credential) -> Result<Arc<dyn CloudConnector>, CloudError> {
    Ok(Arc::new(GceConnector::new(cluster, credential)?))
}

fn new_scaleway(
    cluster: &Cluster,
    credential: &Credential,
) -> Result<Arc<dyn CloudConnector>, CloudError> {
    Ok(Arc::new(ScalewayConnector::new(cluster, credential)?))
}

/// Construct the connector for a cluster's declared provider.
pub fn connector_for(
    cluster: &Cluster,
    credential: &Credential,
) -> Result<Arc<dyn CloudConnector>, EngineError> {
    let name = cluster.spec.cloud_provider.as_str();
    let ctor = PROVIDERS
        .iter()
        .find(|(provider, _)| *provider == name)
        .map(|(_, ctor)| ctor)
        .ok_or_else(|| EngineError::UnknownProvider(name.to_string()))?;
    Ok(ctor(cluster, credential)?)
}

/// Names of every registered provider.
#[must_use]
pub fn providers() -> Vec<&'static str> {
    PROVIDERS.iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let cluster = Cluster {
            name: "c1".to_string(),
            spec: apis::ClusterSpec {
                cloud_provider: "lunar".to_string(),
                ..apis::ClusterSpec::default()
            },
            ..Cluster::default()
        };
        let credential = Credential::default();
        let err = connector_for(&cluster, &credential).err().unwrap();
        match err {
            EngineError::UnknownProvider(name) => assert_eq!(name, "lunar"),
            other => panic!("expected UnknownProvider, got {other}"),
        }
    }

    #[test]
    fn registry_lists_both_providers() {
        let names = providers();
        assert!(names.contains(&"gce"));
        assert!(names.contains(&"scaleway"));
    }
}
