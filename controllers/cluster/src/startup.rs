//! Startup-script rendering
//!
//! Renders the cloud-init/startup payload baked into every instance:
//! a kubeadm init script for masters, a kubeadm join script for
//! workers. The engine treats the output as opaque and hands it to the
//! connector inside the create-instance request.

use crate::error::EngineError;
use apis::{Cluster, NodeGroup};
use cloud::InstanceRole;

/// Renders the startup payload for one instance.
pub trait ScriptRenderer: Send + Sync {
    fn render(
        &self,
        role: InstanceRole,
        cluster: &Cluster,
        group: &NodeGroup,
    ) -> Result<String, EngineError>;
}

/// kubeadm-based renderer used by every provider.
#[derive(Debug, Clone, Default)]
pub struct KubeadmRenderer;

impl KubeadmRenderer {
    fn preamble(version: &str) -> String {
        format!(
            r#"#!/bin/bash
set -euo pipefail

export DEBIAN_FRONTEND=noninteractive
apt-get update
apt-get install -y apt-transport-https ca-certificates curl containerd
curl -fsSL https://pkgs.k8s.io/core:/stable:/v{minor}/deb/Release.key \
    | gpg --dearmor -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg
echo "deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v{minor}/deb/ /" \
    > /etc/apt/sources.list.d/kubernetes.list
apt-get update
apt-get install -y kubelet={version}-* kubeadm={version}-* kubectl={version}-*
apt-mark hold kubelet kubeadm kubectl
"#,
            minor = minor_of(version),
            version = version,
        )
    }
}

impl ScriptRenderer for KubeadmRenderer {
    fn render(
        &self,
        role: InstanceRole,
        cluster: &Cluster,
        group: &NodeGroup,
    ) -> Result<String, EngineError> {
        let version = &cluster.spec.kubernetes_version;
        if version.is_empty() {
            return Err(EngineError::Render(format!(
                "cluster `{}` has no kubernetes version",
                cluster.name
            )));
        }
        let token = &cluster.spec.bootstrap_token;
        if token.is_empty() {
            return Err(EngineError::Render(format!(
                "cluster `{}` has no bootstrap token",
                cluster.name
            )));
        }

        let mut script = Self::preamble(version);
        match role {
            InstanceRole::Master => {
                script.push_str(&format!(
                    "\nkubeadm init \\\n    --token {token} \\\n    --kubernetes-version v{version} \\\n    --pod-network-cidr {pod} \\\n    --service-cidr {svc}",
                    pod = cluster.spec.network.pod_cidr,
                    svc = cluster.spec.network.service_cidr,
                ));
                if let Some(endpoint) = &cluster.status.api_endpoint {
                    script.push_str(&format!(" \\\n    --control-plane-endpoint {endpoint}"));
                }
                script.push('\n');
            }
            InstanceRole::Node => {
                let endpoint = cluster.status.api_endpoint.as_deref().ok_or_else(|| {
                    EngineError::Render(format!(
                        "cluster `{}` has no api endpoint for group `{}` to join",
                        cluster.name, group.name
                    ))
                })?;
                script.push_str(&format!(
                    "\nkubeadm join {endpoint} \\\n    --token {token} \\\n    --discovery-token-unsafe-skip-ca-verification\n",
                ));
            }
        }
        Ok(script)
    }
}

fn minor_of(version: &str) -> String {
    let mut parts = version.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{major}.{minor}"),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apis::{ClusterSpec, NodeGroupSpec, NodeTemplateSpec};

    fn cluster() -> Cluster {
        Cluster {
            name: "prod".to_string(),
            spec: ClusterSpec {
                cloud_provider: "gce".to_string(),
                zone: "us-central1-a".to_string(),
                kubernetes_version: "1.30.2".to_string(),
                credential_name: "cred".to_string(),
                bootstrap_token: "abcdef.0123456789abcdef".to_string(),
                ..ClusterSpec::default()
            },
            ..Cluster::default()
        }
    }

    fn group() -> NodeGroup {
        NodeGroup {
            name: "workers".to_string(),
            cluster_name: "prod".to_string(),
            spec: NodeGroupSpec {
                nodes: 2,
                template: NodeTemplateSpec {
                    sku: "n1-standard-2".to_string(),
                    ..NodeTemplateSpec::default()
                },
                ..NodeGroupSpec::default()
            },
            ..NodeGroup::default()
        }
    }

    #[test]
    fn master_script_runs_kubeadm_init() {
        let script = KubeadmRenderer
            .render(InstanceRole::Master, &cluster(), &group())
            .unwrap();
        assert!(script.contains("kubeadm init"));
        assert!(script.contains("--kubernetes-version v1.30.2"));
        assert!(script.contains("--pod-network-cidr 10.244.0.0/16"));
    }

    #[test]
    fn node_script_joins_the_endpoint() {
        let mut cluster = cluster();
        cluster.status.api_endpoint = Some("203.0.113.10:6443".to_string());
        let script = KubeadmRenderer
            .render(InstanceRole::Node, &cluster, &group())
            .unwrap();
        assert!(script.contains("kubeadm join 203.0.113.10:6443"));
    }

    #[test]
    fn node_script_requires_an_endpoint() {
        let err = KubeadmRenderer.render(InstanceRole::Node, &cluster(), &group());
        assert!(err.is_err());
    }

    #[test]
    fn version_pins_use_the_minor_repo() {
        let script = KubeadmRenderer
            .render(InstanceRole::Master, &cluster(), &group())
            .unwrap();
        assert!(script.contains("stable:/v1.30/deb"));
        assert!(script.contains("kubeadm=1.30.2-*"));
    }
}
