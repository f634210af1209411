//! Mock cloud provider for unit testing
//!
//! Implements [`CloudConnector`] (and optionally [`GroupScaler`]) against
//! in-memory state, so engine tests run without a cloud account. Every
//! mutating call is counted, which lets tests assert dry-run issues none.
//!
//! Operations complete on the first poll unless marked stuck via
//! [`MockCloud::mark_operation_stuck`].

use crate::connector::{CloudConnector, GroupScaler, OperationPoller};
use crate::error::CloudError;
use crate::types::{
    AutoscalerBounds, CreateInstanceRequest, Ensure, Instance, OperationRef, OperationStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    network: bool,
    firewall: bool,
    load_balancer: Option<String>,
    ssh_keys: HashMap<String, String>,
    reserved_ip: Option<String>,
    instances: HashMap<String, Vec<Instance>>,
    templates: HashSet<String>,
    groups: HashMap<String, GroupRecord>,
    autoscalers: HashMap<String, AutoscalerBounds>,
    stuck_operations: HashSet<String>,
    fail_listing: bool,
    mutations: u64,
    instances_created: u64,
    instances_deleted: u64,
    resize_calls: Vec<(String, i64)>,
    patch_calls: Vec<(String, AutoscalerBounds)>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct GroupRecord {
    template: String,
    size: i64,
}

/// In-memory cloud provider for tests.
#[derive(Debug, Clone)]
pub struct MockCloud {
    state: Arc<Mutex<MockState>>,
    managed: bool,
    supports_reserved_ip: bool,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    /// A VM-per-instance provider (no managed-group capability).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            managed: false,
            supports_reserved_ip: false,
        }
    }

    /// A provider exposing the managed-group capability.
    #[must_use]
    pub fn with_managed_groups() -> Self {
        Self { managed: true, ..Self::new() }
    }

    /// Enable address reservation on this mock.
    #[must_use]
    pub fn with_reserved_ips(mut self) -> Self {
        self.supports_reserved_ip = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn synth_instance(state: &mut MockState, name: &str) -> Instance {
        state.next_id += 1;
        Instance {
            name: name.to_string(),
            external_id: format!("mock-{}", state.next_id),
            public_ip: Some(format!("198.51.100.{}", state.next_id % 250 + 1)),
            private_ip: Some(format!("10.240.0.{}", state.next_id % 250 + 1)),
        }
    }

    // Test setup -----------------------------------------------------------

    /// Seed `count` instances under a group label.
    pub fn seed_instances(&self, group: &str, count: usize) {
        let mut state = self.lock();
        for i in 0..count {
            let name = format!("{group}-{i}");
            let instance = Self::synth_instance(&mut state, &name);
            state.instances.entry(group.to_string()).or_default().push(instance);
        }
    }

    /// Seed a managed group with its template (no instances).
    pub fn seed_group(&self, group: &str, template: &str, size: i64) {
        let mut state = self.lock();
        state.templates.insert(template.to_string());
        state.groups.insert(
            group.to_string(),
            GroupRecord { template: template.to_string(), size },
        );
    }

    /// Seed an autoscaler bound to a group.
    pub fn seed_autoscaler(&self, group: &str, bounds: AutoscalerBounds) {
        self.lock().autoscalers.insert(group.to_string(), bounds);
    }

    /// Make every subsequent `list_instances` call fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }

    /// Operations with this name never report done.
    pub fn mark_operation_stuck(&self, name: &str) {
        self.lock().stuck_operations.insert(name.to_string());
    }

    // Test assertions ------------------------------------------------------

    /// Total mutating calls issued so far.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }

    /// Individual instances created via `create_instance`.
    #[must_use]
    pub fn instances_created(&self) -> u64 {
        self.lock().instances_created
    }

    /// Individual instances deleted via `delete_instance`.
    #[must_use]
    pub fn instances_deleted(&self) -> u64 {
        self.lock().instances_deleted
    }

    /// Resize calls recorded as (group, target size).
    #[must_use]
    pub fn resize_calls(&self) -> Vec<(String, i64)> {
        self.lock().resize_calls.clone()
    }

    /// Autoscaler patch calls recorded as (group, bounds).
    #[must_use]
    pub fn patch_calls(&self) -> Vec<(String, AutoscalerBounds)> {
        self.lock().patch_calls.clone()
    }

    /// Whether a managed group currently exists.
    #[must_use]
    pub fn group_exists(&self, group: &str) -> bool {
        self.lock().groups.contains_key(group)
    }

    /// Whether an instance template currently exists.
    #[must_use]
    pub fn template_exists(&self, template: &str) -> bool {
        self.lock().templates.contains(template)
    }

    /// Whether an autoscaler currently exists for the group.
    #[must_use]
    pub fn autoscaler_exists(&self, group: &str) -> bool {
        self.lock().autoscalers.contains_key(group)
    }

    /// Count of live instances under a group label.
    #[must_use]
    pub fn instance_count(&self, group: &str) -> usize {
        self.lock().instances.get(group).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl OperationPoller for MockCloud {
    async fn poll_operation(&self, op: &OperationRef) -> Result<OperationStatus, CloudError> {
        let state = self.lock();
        if state.stuck_operations.contains(&op.name) {
            Ok(OperationStatus::Pending)
        } else {
            Ok(OperationStatus::Done)
        }
    }
}

#[async_trait::async_trait]
impl CloudConnector for MockCloud {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn detect_instance_image(&self) -> Result<String, CloudError> {
        Ok("mock-os-2024".to_string())
    }

    async fn has_network(&self) -> Result<bool, CloudError> {
        Ok(self.lock().network)
    }

    async fn has_firewall(&self) -> Result<bool, CloudError> {
        Ok(self.lock().firewall)
    }

    async fn get_load_balancer(&self) -> Result<Option<String>, CloudError> {
        Ok(self.lock().load_balancer.clone())
    }

    async fn has_ssh_key(&self, name: &str) -> Result<bool, CloudError> {
        Ok(self.lock().ssh_keys.contains_key(name))
    }

    async fn get_reserved_ip(&self) -> Result<Option<String>, CloudError> {
        Ok(self.lock().reserved_ip.clone())
    }

    async fn get_instance(&self, name: &str) -> Result<Option<Instance>, CloudError> {
        let state = self.lock();
        Ok(state
            .instances
            .values()
            .flatten()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn list_instances(&self, group: &str) -> Result<Vec<Instance>, CloudError> {
        let state = self.lock();
        if state.fail_listing {
            return Err(CloudError::Api("instance listing unavailable".to_string()));
        }
        Ok(state.instances.get(group).cloned().unwrap_or_default())
    }

    async fn ensure_network(&self) -> Result<Ensure, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        if state.network {
            Ok(Ensure::Found)
        } else {
            state.network = true;
            Ok(Ensure::Created)
        }
    }

    async fn ensure_firewall(&self) -> Result<Ensure, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        if state.firewall {
            Ok(Ensure::Found)
        } else {
            state.firewall = true;
            Ok(Ensure::Created)
        }
    }

    async fn ensure_load_balancer(&self) -> Result<(String, Ensure), CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        if let Some(endpoint) = &state.load_balancer {
            Ok((endpoint.clone(), Ensure::Found))
        } else {
            let endpoint = "203.0.113.10:6443".to_string();
            state.load_balancer = Some(endpoint.clone());
            Ok((endpoint, Ensure::Created))
        }
    }

    async fn import_ssh_key(&self, name: &str, _public_key: &str) -> Result<String, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        let id = format!("key-{}", state.ssh_keys.len() + 1);
        state.ssh_keys.insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn delete_ssh_key(&self, name: &str) -> Result<(), CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.ssh_keys.remove(name);
        Ok(())
    }

    async fn reserve_ip(&self) -> Result<Option<String>, CloudError> {
        if !self.supports_reserved_ip {
            return Ok(None);
        }
        let mut state = self.lock();
        state.mutations += 1;
        let ip = "192.0.2.10".to_string();
        state.reserved_ip = Some(ip.clone());
        Ok(Some(ip))
    }

    async fn release_reserved_ip(&self) -> Result<(), CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.reserved_ip = None;
        // the api address doubles as the load balancer endpoint
        state.load_balancer = None;
        Ok(())
    }

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.instances_created += 1;
        let instance = Self::synth_instance(&mut state, &req.name);
        state
            .instances
            .entry(req.group.clone())
            .or_default()
            .push(instance);
        Ok(OperationRef::zonal(format!("op-create-{}", req.name)))
    }

    async fn delete_instance(&self, name_or_id: &str) -> Result<(), CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.instances_deleted += 1;
        for group in state.instances.values_mut() {
            group.retain(|i| i.name != name_or_id && i.external_id != name_or_id);
        }
        Ok(())
    }

    fn group_scaler(&self) -> Option<&dyn GroupScaler> {
        self.managed.then_some(self as &dyn GroupScaler)
    }
}

#[async_trait::async_trait]
impl GroupScaler for MockCloud {
    async fn instance_group_exists(&self, group: &str) -> Result<bool, CloudError> {
        Ok(self.lock().groups.contains_key(group))
    }

    async fn create_instance_template(
        &self,
        template: &str,
        _req: &CreateInstanceRequest,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.templates.insert(template.to_string());
        Ok(OperationRef::global(format!("op-template-{template}")))
    }

    async fn delete_instance_template(&self, template: &str) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.templates.remove(template);
        Ok(OperationRef::global(format!("op-rm-template-{template}")))
    }

    async fn create_instance_group(
        &self,
        group: &str,
        template: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        if !state.templates.contains(template) {
            return Err(CloudError::InvalidRequest(format!(
                "instance template `{template}` does not exist"
            )));
        }
        state.groups.insert(
            group.to_string(),
            GroupRecord { template: template.to_string(), size },
        );
        for i in 0..size {
            let name = format!("{group}-{i}");
            let instance = Self::synth_instance(&mut state, &name);
            state.instances.entry(group.to_string()).or_default().push(instance);
        }
        Ok(OperationRef::zonal(format!("op-group-{group}")))
    }

    async fn resize_instance_group(
        &self,
        group: &str,
        size: i64,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.resize_calls.push((group.to_string(), size));
        let current = state.instances.get(group).map_or(0, Vec::len) as i64;
        if size > current {
            for i in current..size {
                let name = format!("{group}-{i}");
                let instance = Self::synth_instance(&mut state, &name);
                state.instances.entry(group.to_string()).or_default().push(instance);
            }
        } else if let Some(list) = state.instances.get_mut(group) {
            list.truncate(size as usize);
        }
        if let Some(record) = state.groups.get_mut(group) {
            record.size = size;
        }
        Ok(OperationRef::zonal(format!("op-resize-{group}")))
    }

    async fn delete_instance_group(&self, group: &str) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.groups.remove(group);
        state.instances.remove(group);
        Ok(OperationRef::zonal(format!("op-rm-group-{group}")))
    }

    async fn create_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.autoscalers.insert(group.to_string(), bounds);
        Ok(OperationRef::zonal(format!("op-autoscaler-{group}")))
    }

    async fn get_autoscaler(&self, group: &str) -> Result<Option<AutoscalerBounds>, CloudError> {
        Ok(self.lock().autoscalers.get(group).copied())
    }

    async fn patch_autoscaler(
        &self,
        group: &str,
        bounds: AutoscalerBounds,
    ) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.patch_calls.push((group.to_string(), bounds));
        state.autoscalers.insert(group.to_string(), bounds);
        Ok(OperationRef::zonal(format!("op-patch-autoscaler-{group}")))
    }

    async fn delete_autoscaler(&self, group: &str) -> Result<OperationRef, CloudError> {
        let mut state = self.lock();
        state.mutations += 1;
        state.autoscalers.remove(group);
        Ok(OperationRef::zonal(format!("op-rm-autoscaler-{group}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probes_do_not_mutate() {
        let mock = MockCloud::with_managed_groups();
        mock.seed_instances("workers", 2);
        let _ = mock.has_network().await.unwrap();
        let _ = mock.list_instances("workers").await.unwrap();
        let _ = mock.get_instance("workers-0").await.unwrap();
        let scaler = mock.group_scaler().unwrap();
        let _ = scaler.instance_group_exists("workers").await.unwrap();
        let _ = scaler.get_autoscaler("workers").await.unwrap();
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn ensure_is_get_or_create() {
        let mock = MockCloud::new();
        assert_eq!(mock.ensure_network().await.unwrap(), Ensure::Created);
        assert_eq!(mock.ensure_network().await.unwrap(), Ensure::Found);
    }

    #[tokio::test]
    async fn group_scaler_gated_by_capability() {
        assert!(MockCloud::new().group_scaler().is_none());
        assert!(MockCloud::with_managed_groups().group_scaler().is_some());
    }

    #[tokio::test]
    async fn group_creation_requires_template() {
        let mock = MockCloud::with_managed_groups();
        let scaler = mock.group_scaler().unwrap();
        let err = scaler.create_instance_group("workers", "missing", 3).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn failed_listing_is_an_error_not_empty() {
        let mock = MockCloud::new();
        mock.seed_instances("workers", 3);
        mock.fail_listing();
        assert!(mock.list_instances("workers").await.is_err());
    }
}
