//! Plan and import result types exchanged with the host engine.

use serde::{Deserialize, Serialize};

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed, e.g. `display[0].message`.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (None if deleting).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// What applying a plan will do to the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// Nothing to do.
    NoOp,
    /// The object does not exist yet.
    Create,
    /// In-place update.
    Update,
    /// Delete, then create.
    Replace,
    /// The object is no longer configured.
    Delete,
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// The action the plan resolves to.
    pub action: PlanAction,
    /// Paths whose change forces replacement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace_paths: Vec<String>,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            action: PlanAction::NoOp,
            replace_paths: Vec::new(),
        }
    }

    /// Create a plan for an object that does not exist yet.
    pub fn create(planned_state: serde_json::Value, changes: Vec<AttributeChange>) -> Self {
        Self {
            planned_state,
            changes,
            action: PlanAction::Create,
            replace_paths: Vec::new(),
        }
    }

    /// Create a plan with changes. Any replace path turns the plan into a
    /// replacement; otherwise the change is applied in place.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        replace_paths: Vec<String>,
    ) -> Self {
        let action = match (changes.is_empty(), replace_paths.is_empty()) {
            (true, true) => PlanAction::NoOp,
            (_, false) => PlanAction::Replace,
            (false, true) => PlanAction::Update,
        };
        Self {
            planned_state,
            changes,
            action,
            replace_paths,
        }
    }

    /// Create a plan that removes the object.
    pub fn delete(changes: Vec<AttributeChange>) -> Self {
        Self {
            planned_state: serde_json::Value::Null,
            changes,
            action: PlanAction::Delete,
            replace_paths: Vec::new(),
        }
    }

    /// Whether applying this plan destroys and recreates the object.
    pub fn requires_replace(&self) -> bool {
        self.action == PlanAction::Replace
    }

    /// Whether the plan has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.action == PlanAction::NoOp
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata: the resource and data source types it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("cpu"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("cpu")));

        let removed = AttributeChange::removed("tags", json!(["env:prod"]));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("priority", json!(1), json!(2));
        assert_eq!(modified.before, Some(json!(1)));
        assert_eq!(modified.after, Some(json!(2)));
    }

    #[test]
    fn test_plan_actions() {
        let no_change = PlanResult::no_change(json!({"id": "123"}));
        assert!(no_change.is_empty());
        assert!(!no_change.requires_replace());

        let update = PlanResult::with_changes(
            json!({"id": "123", "name": "new"}),
            vec![AttributeChange::modified("name", json!("old"), json!("new"))],
            vec![],
        );
        assert_eq!(update.action, PlanAction::Update);

        let replace = PlanResult::with_changes(
            json!({"type": "log alert"}),
            vec![AttributeChange::modified("type", json!("metric alert"), json!("log alert"))],
            vec!["type".to_string()],
        );
        assert!(replace.requires_replace());

        let empty = PlanResult::with_changes(json!({}), vec![], vec![]);
        assert!(empty.is_empty());

        assert_eq!(PlanResult::delete(vec![]).action, PlanAction::Delete);
    }

    #[test]
    fn test_plan_action_serializes_snake_case() {
        assert_eq!(serde_json::to_value(PlanAction::NoOp).unwrap(), json!("no_op"));
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("datadog_monitor", json!({"id": "12345"}));
        assert_eq!(imported.resource_type, "datadog_monitor");
        assert_eq!(imported.state["id"], "12345");
    }
}
