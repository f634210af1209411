//! Action log
//!
//! Accumulates the ordered list of intended/performed changes for one
//! apply call. Every record is also traced, so a real run leaves an
//! audit trail in the logs and a dry run previews the same sequence.

use apis::{Action, ActionKind};
use tracing::info;

/// Ordered, append-only record of one reconciliation's changes.
#[derive(Debug, Default)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one action and trace it.
    pub fn record(&mut self, action: Action) {
        info!(kind = ?action.kind, resource = %action.resource, "{}", action.message);
        self.actions.push(action);
    }

    /// Actions recorded so far, in order.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of non-NOP actions recorded.
    #[must_use]
    #[allow(dead_code)] // Utility method, may be useful in the future
    pub fn changes(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.kind != ActionKind::Nop)
            .count()
    }

    /// Consume the log, yielding the recorded actions.
    #[must_use]
    #[allow(dead_code)] // Utility method, may be useful in the future
    pub fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_preserve_order() {
        let mut log = ActionLog::new();
        log.record(Action::add("Network", "a"));
        log.record(Action::nop("Firewall", "b"));
        log.record(Action::delete("Node", "c"));

        let kinds: Vec<_> = log.actions().iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Add, ActionKind::Nop, ActionKind::Delete]);
        assert_eq!(log.changes(), 2);
    }
}
