//! Reconciliation actions
//!
//! An `Action` is one audit record of an intended or performed change.
//! The ordered list of actions is what every apply returns, both for
//! dry-run preview and for audit of a real run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a reconciliation step did (or would do).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ActionKind {
    /// A resource will be / was created
    Add,

    /// A resource will be / was deleted
    Delete,

    /// The resource already matches the desired state
    Nop,
}

/// One intended or completed change, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub kind: ActionKind,

    /// Short label of the resource acted on, e.g. "Default Network"
    pub resource: String,

    /// Human-readable description of the change
    pub message: String,
}

impl Action {
    pub fn add(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Add,
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn delete(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn nop(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Nop,
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ActionKind::Add => "add",
            ActionKind::Delete => "delete",
            ActionKind::Nop => "nop",
        };
        write!(f, "{} {}: {}", kind, self.resource, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        assert_eq!(Action::add("Network", "x").kind, ActionKind::Add);
        assert_eq!(Action::delete("Network", "x").kind, ActionKind::Delete);
        assert_eq!(Action::nop("Network", "x").kind, ActionKind::Nop);
    }

    #[test]
    fn display_is_compact() {
        let act = Action::add("Master Instance", "will be created");
        assert_eq!(act.to_string(), "add Master Instance: will be created");
    }
}
