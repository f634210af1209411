//! Resource naming conventions
//!
//! One place for every cloud-resource name the engine derives, so
//! creation and teardown always agree on what to look for.

use apis::{Cluster, NodeGroup};
use uuid::Uuid;

/// Name of the cluster's master instance.
#[must_use]
pub fn master_instance(cluster: &Cluster) -> String {
    cluster.master_name()
}

/// Name of the SSH key imported into the provider.
#[must_use]
pub fn ssh_key(cluster_name: &str) -> String {
    format!("{cluster_name}-harrow")
}

/// Instance template backing a managed node group.
#[must_use]
pub fn instance_template(group: &NodeGroup) -> String {
    format!("{}-{}-tpl", group.cluster_name, group.spec.template.sku.replace('_', "-"))
}

/// Unique name for one VM in a VM-per-instance group.
#[must_use]
pub fn node_instance(group: &NodeGroup) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", group.name, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use apis::{NodeGroupSpec, NodeTemplateSpec};

    fn group() -> NodeGroup {
        NodeGroup {
            name: "workers".to_string(),
            cluster_name: "prod".to_string(),
            spec: NodeGroupSpec {
                nodes: 3,
                template: NodeTemplateSpec {
                    sku: "n1_standard_2".to_string(),
                    ..NodeTemplateSpec::default()
                },
                ..NodeGroupSpec::default()
            },
            ..NodeGroup::default()
        }
    }

    #[test]
    fn template_name_is_sku_scoped_and_sanitised() {
        assert_eq!(instance_template(&group()), "prod-n1-standard-2-tpl");
    }

    #[test]
    fn node_names_are_unique() {
        let g = group();
        let a = node_instance(&g);
        let b = node_instance(&g);
        assert_ne!(a, b);
        assert!(a.starts_with("workers-"));
    }
}
