//! Mock admin client for unit testing

use crate::AdminClient;
use crate::error::AdminError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scriptable [`AdminClient`] backed by in-memory state.
#[derive(Debug, Clone)]
pub struct MockAdminClient {
    version: Arc<Mutex<String>>,
    ready_by_selector: Arc<Mutex<HashMap<String, usize>>>,
    unreachable: Arc<Mutex<bool>>,
}

impl MockAdminClient {
    /// A control plane reporting the given version.
    #[must_use]
    pub fn with_version(version: &str) -> Self {
        Self {
            version: Arc::new(Mutex::new(version.to_string())),
            ready_by_selector: Arc::new(Mutex::new(HashMap::new())),
            unreachable: Arc::new(Mutex::new(false)),
        }
    }

    /// Change the reported version (e.g. mid-upgrade).
    pub fn set_version(&self, version: &str) {
        *self.version.lock().unwrap() = version.to_string();
    }

    /// Script the ready-node count for a selector.
    pub fn set_ready_nodes(&self, selector: &str, count: usize) {
        self.ready_by_selector
            .lock()
            .unwrap()
            .insert(selector.to_string(), count);
    }

    /// Make every call fail, as if the endpoint were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    fn check_reachable(&self) -> Result<(), AdminError> {
        if *self.unreachable.lock().unwrap() {
            Err(AdminError::NoEndpoint("control plane unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl AdminClient for MockAdminClient {
    async fn running_version(&self) -> Result<String, AdminError> {
        self.check_reachable()?;
        Ok(self.version.lock().unwrap().clone())
    }

    async fn count_ready_nodes(&self, label_selector: &str) -> Result<usize, AdminError> {
        self.check_reachable()?;
        Ok(self
            .ready_by_selector
            .lock()
            .unwrap()
            .get(label_selector)
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_scripted_state() {
        let mock = MockAdminClient::with_version("1.30.2");
        mock.set_ready_nodes("role=node", 4);
        assert_eq!(mock.running_version().await.unwrap(), "1.30.2");
        assert_eq!(mock.count_ready_nodes("role=node").await.unwrap(), 4);
        assert_eq!(mock.count_ready_nodes("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_fails_every_call() {
        let mock = MockAdminClient::with_version("1.30.2");
        mock.set_unreachable(true);
        assert!(mock.running_version().await.is_err());
    }
}
