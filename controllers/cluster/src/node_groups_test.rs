//! Unit tests for node-group convergence

use super::*;
use crate::startup::KubeadmRenderer;
use apis::{ActionKind, ClusterSpec, NodeGroupSpec, NodeTemplateSpec};
use chrono::Utc;
use cloud::MockCloud;
use cluster_store::MemoryStore;
use std::time::Duration;

fn test_cluster() -> Cluster {
    Cluster {
        name: "prod".to_string(),
        spec: ClusterSpec {
            cloud_provider: "mock".to_string(),
            zone: "zone-a".to_string(),
            kubernetes_version: "1.30.2".to_string(),
            credential_name: "cred".to_string(),
            instance_image: Some("mock-os-2024".to_string()),
            bootstrap_token: "abcdef.0123456789abcdef".to_string(),
            ..ClusterSpec::default()
        },
        status: apis::ClusterStatus {
            api_endpoint: Some("203.0.113.10:6443".to_string()),
            ..apis::ClusterStatus::default()
        },
        ..Cluster::default()
    }
}

fn test_group(nodes: i64) -> NodeGroup {
    NodeGroup {
        name: "workers".to_string(),
        cluster_name: "prod".to_string(),
        generation: 1,
        spec: NodeGroupSpec {
            nodes,
            template: NodeTemplateSpec {
                sku: "small-2".to_string(),
                disk_type: "ssd".to_string(),
                disk_size_gb: 50,
                ..NodeTemplateSpec::default()
            },
            ..NodeGroupSpec::default()
        },
        ..NodeGroup::default()
    }
}

async fn manager_with(mock: &MockCloud, group: &NodeGroup) -> (NodeGroupManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.node_groups().create(group.clone()).await.unwrap();
    let manager = NodeGroupManager::new(
        store.clone(),
        Arc::new(mock.clone()),
        Arc::new(KubeadmRenderer),
        OperationWaiter::new(Duration::from_millis(1), Duration::from_millis(100)),
    );
    (manager, store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn converged_group_is_a_nop() {
        let mock = MockCloud::with_managed_groups();
        mock.seed_group("workers", "prod-small-2-tpl", 2);
        mock.seed_instances("workers", 2);

        let mut group = test_group(2);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();

        assert_eq!(log.actions().len(), 1);
        assert_eq!(log.actions()[0].kind, ActionKind::Nop);
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn fresh_managed_group_creates_template_group_autoscaler() {
        let mock = MockCloud::with_managed_groups();
        let mut group = test_group(3);
        let (manager, store) = manager_with(&mock, &group).await;

        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();

        let kinds: Vec<_> = log.actions().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Add, ActionKind::Add, ActionKind::Add]);
        assert!(mock.template_exists("prod-small-2-tpl"));
        assert!(mock.group_exists("workers"));
        assert!(mock.autoscaler_exists("workers"));
        assert_eq!(mock.instance_count("workers"), 3);

        let stored = store.node_groups().get("prod", "workers").await.unwrap();
        assert_eq!(stored.status.nodes, 3);
        assert_eq!(stored.status.observed_generation, 1);
    }

    #[tokio::test]
    async fn partial_delta_resizes_with_one_action() {
        let mock = MockCloud::with_managed_groups();
        mock.seed_group("workers", "prod-small-2-tpl", 2);
        mock.seed_instances("workers", 2);
        mock.seed_autoscaler("workers", AutoscalerBounds::fixed(2));

        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();

        assert_eq!(log.actions().len(), 1);
        assert_eq!(log.actions()[0].kind, ActionKind::Add);
        assert_eq!(mock.resize_calls(), vec![("workers".to_string(), 5)]);
        // 5 is outside [2,2], so the bounds were widened first
        assert_eq!(mock.patch_calls().len(), 1);
        assert_eq!(mock.instance_count("workers"), 5);

        // re-applying with identical state converges to a NOP
        let mut group = test_group(5);
        group.status.nodes = 5;
        let mut log = ActionLog::new();
        let (manager, _) = manager_with(&mock, &group).await;
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();
        assert_eq!(log.actions().len(), 1);
        assert_eq!(log.actions()[0].kind, ActionKind::Nop);
    }

    #[tokio::test]
    async fn bounds_inside_range_are_not_patched() {
        let mock = MockCloud::with_managed_groups();
        mock.seed_group("workers", "prod-small-2-tpl", 2);
        mock.seed_instances("workers", 2);
        mock.seed_autoscaler("workers", AutoscalerBounds { min: 1, max: 10 });

        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();

        assert!(mock.patch_calls().is_empty());
        assert_eq!(mock.resize_calls(), vec![("workers".to_string(), 5)]);
    }

    #[tokio::test]
    async fn deletion_tears_down_in_reverse_order() {
        let mock = MockCloud::with_managed_groups();
        mock.seed_group("workers", "prod-small-2-tpl", 3);
        mock.seed_instances("workers", 3);
        mock.seed_autoscaler("workers", AutoscalerBounds::fixed(3));

        let mut group = test_group(0);
        group.deletion_timestamp = Some(Utc::now());
        let (manager, store) = manager_with(&mock, &group).await;

        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();

        let kinds: Vec<_> = log.actions().iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::Delete, ActionKind::Delete, ActionKind::Delete]
        );
        assert!(!mock.autoscaler_exists("workers"));
        assert!(!mock.group_exists("workers"));
        assert!(!mock.template_exists("prod-small-2-tpl"));
        assert_eq!(mock.instance_count("workers"), 0);
        assert_eq!(group.status.nodes, 0);
        // record is gone once the count reached zero
        assert!(store.node_groups().get("prod", "workers").await.is_err());
    }

    #[tokio::test]
    async fn vm_path_issues_exactly_delta_creates_and_deletes() {
        let mock = MockCloud::new();
        mock.seed_instances("workers", 2);

        // scale up 2 -> 5
        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();
        assert_eq!(mock.instances_created(), 3);
        assert_eq!(mock.instances_deleted(), 0);
        assert_eq!(mock.instance_count("workers"), 5);

        // scale down 5 -> 1
        let mut group = test_group(1);
        group.status.nodes = 5;
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();
        assert_eq!(mock.instances_created(), 3);
        assert_eq!(mock.instances_deleted(), 4);
        assert_eq!(mock.instance_count("workers"), 1);
    }

    #[tokio::test]
    async fn convergence_is_monotonic_across_desired_changes() {
        let mock = MockCloud::new();
        for desired in [3_i64, 6, 2] {
            let mut group = test_group(desired);
            let (manager, _) = manager_with(&mock, &group).await;
            let mut log = ActionLog::new();
            manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();
            assert_eq!(mock.instance_count("workers"), desired as usize);
        }
        let net = mock.instances_created() as i64 - mock.instances_deleted() as i64;
        assert_eq!(net, 2);
    }

    #[tokio::test]
    async fn dry_run_issues_no_mutations_but_same_actions() {
        let mock = MockCloud::new();
        mock.seed_instances("workers", 2);

        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, true, &mut log).await.unwrap();
        let dry_actions: Vec<_> = log.actions().iter().map(|a| a.kind).collect();
        assert_eq!(mock.mutation_count(), 0);
        assert_eq!(mock.instance_count("workers"), 2);

        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        manager.apply(&test_cluster(), &mut group, false, &mut log).await.unwrap();
        let real_actions: Vec<_> = log.actions().iter().map(|a| a.kind).collect();
        assert_eq!(dry_actions, real_actions);
    }

    #[tokio::test]
    async fn listing_failure_fails_closed() {
        let mock = MockCloud::new();
        mock.seed_instances("workers", 3);
        mock.fail_listing();

        let mut group = test_group(5);
        let (manager, _) = manager_with(&mock, &group).await;
        let mut log = ActionLog::new();
        let result = manager.apply(&test_cluster(), &mut group, false, &mut log).await;

        assert!(result.is_err());
        assert_eq!(mock.mutation_count(), 0);
        assert!(log.actions().is_empty());
    }
}
