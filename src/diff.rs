//! Schema-driven diff engine.
//!
//! Planning compares the prior state of an instance against its desired
//! configuration, attribute by attribute:
//!
//! 1. Both sides are normalized with each attribute's [`StateNormalizer`],
//!    sets are sorted, and configuration defaults are filled in.
//! 2. Sets compare as sets, lists compare in order, numbers compare as
//!    numbers, and unset means the same as empty.
//! 3. Remaining differences are offered to the attribute's
//!    [`DiffSuppressor`]. Attributes that force replacement never consult one.
//!
//! [`StateNormalizer`]: crate::schema::StateNormalizer
//! [`DiffSuppressor`]: crate::schema::DiffSuppressor

use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, Schema};
use crate::state::{is_unset, InstanceState};
use crate::types::{AttributeChange, PlanAction, PlanResult};

/// Attribute-level differences between two states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Every attribute that differs.
    pub changes: Vec<AttributeChange>,
    /// The subset of changed paths that force replacement.
    pub replace_paths: Vec<String>,
}

impl Diff {
    /// Whether nothing differs.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether any change forces replacement.
    pub fn requires_replace(&self) -> bool {
        !self.replace_paths.is_empty()
    }
}

/// Fill in defaults and normalize a configuration object.
pub fn normalize_config(schema: &Schema, config: &Value) -> Result<Map<String, Value>, ProviderError> {
    let mut attributes = match config {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(ProviderError::Validation(format!(
                "expected resource configuration to be an object, got {other}"
            )))
        },
    };
    // Hosts may echo the ID back inside the configuration.
    attributes.remove("id");
    normalize_block(&schema.block, &mut attributes, true);
    Ok(attributes)
}

/// Normalize stored attributes in place. Defaults are not applied.
pub fn normalize_state(schema: &Schema, attributes: &mut Map<String, Value>) {
    normalize_block(&schema.block, attributes, false);
}

/// Fill in configuration defaults only.
pub fn apply_defaults(schema: &Schema, attributes: &mut Map<String, Value>) {
    apply_block_defaults(&schema.block, attributes);
}

fn apply_block_defaults(block: &Block, object: &mut Map<String, Value>) {
    for (name, attr) in &block.attributes {
        if let Some(default) = &attr.default {
            if object.get(name).map_or(true, Value::is_null) {
                object.insert(name.clone(), default.clone());
            }
        }
    }
    for (name, nested) in &block.blocks {
        if let Some(Value::Array(items)) = object.get_mut(name) {
            for item in items.iter_mut() {
                if let Value::Object(inner) = item {
                    apply_block_defaults(&nested.block, inner);
                }
            }
        }
    }
}

fn normalize_block(block: &Block, object: &mut Map<String, Value>, with_defaults: bool) {
    if with_defaults {
        apply_block_defaults(block, object);
    }

    for (name, attr) in &block.attributes {
        if let Some(value) = object.get_mut(name) {
            if !value.is_null() {
                *value = normalize_value(attr, value);
            }
        }
    }

    for (name, nested) in &block.blocks {
        if let Some(Value::Array(items)) = object.get_mut(name) {
            for item in items.iter_mut() {
                if let Value::Object(inner) = item {
                    normalize_block(&nested.block, inner, with_defaults);
                }
            }
            if nested.nesting_mode == BlockNestingMode::Set {
                sort_canonical(items);
            }
        }
    }
}

/// Normalize one attribute value: the attribute's own normalizer first, then
/// set ordering.
pub fn normalize_value(attr: &Attribute, value: &Value) -> Value {
    let mut normalized = attr.normalize(value);
    if let (AttributeType::Set(_), Value::Array(items)) = (&attr.attr_type, &mut normalized) {
        sort_canonical(items);
    }
    normalized
}

fn sort_canonical(items: &mut Vec<Value>) {
    items.sort_by_cached_key(|v| v.to_string());
    items.dedup();
}

/// Compare normalized prior attributes with normalized configuration.
pub fn diff(schema: &Schema, prior: &Map<String, Value>, config: &Map<String, Value>) -> Diff {
    let mut out = Diff::default();
    diff_block(&schema.block, prior, config, "", &mut out);
    out
}

fn diff_block(
    block: &Block,
    prior: &Map<String, Value>,
    config: &Map<String, Value>,
    path: &str,
    out: &mut Diff,
) {
    for (name, attr) in &block.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let old = prior.get(name);
        let new = config.get(name);
        // Optional+computed attributes left out of configuration keep the remote value.
        if attr.flags.computed && is_unset(new) {
            continue;
        }
        if values_equal(&attr.attr_type, old, new) {
            continue;
        }
        if !attr.force_new && !is_unset(old) && !is_unset(new) {
            if let (Some(suppressor), Some(o), Some(n)) = (&attr.diff_suppress, old, new) {
                if suppressor.suppresses(o, n, config) {
                    continue;
                }
            }
        }

        let attr_path = join_path(path, name);
        out.changes.push(change(&attr_path, old, new));
        if attr.force_new {
            out.replace_paths.push(attr_path);
        }
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        let old = prior.get(name);
        let new = config.get(name);
        if is_unset(old) && is_unset(new) {
            continue;
        }

        let old_items = old.and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        let new_items = new.and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

        if nested.nesting_mode == BlockNestingMode::Set || old_items.len() != new_items.len() {
            if old_items != new_items {
                out.changes.push(change(&block_path, old, new));
            }
            continue;
        }

        let empty = Map::new();
        for (i, (o, n)) in old_items.iter().zip(new_items).enumerate() {
            let item_path = format!("{}[{}]", block_path, i);
            diff_block(
                &nested.block,
                o.as_object().unwrap_or(&empty),
                n.as_object().unwrap_or(&empty),
                &item_path,
                out,
            );
        }
    }
}

fn values_equal(attr_type: &AttributeType, old: Option<&Value>, new: Option<&Value>) -> bool {
    match (is_unset(old), is_unset(new)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {},
    }
    let (Some(old), Some(new)) = (old, new) else {
        return false;
    };

    match attr_type {
        AttributeType::Int64 | AttributeType::Float64 => match (old.as_f64(), new.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => old == new,
        },
        AttributeType::Set(_) => match (old.as_array(), new.as_array()) {
            (Some(a), Some(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                sort_canonical(&mut a);
                sort_canonical(&mut b);
                a == b
            },
            _ => old == new,
        },
        _ => old == new,
    }
}

fn change(path: &str, old: Option<&Value>, new: Option<&Value>) -> AttributeChange {
    let present = |v: Option<&Value>| v.filter(|v| !is_unset(Some(v))).cloned();
    AttributeChange::new(path, present(old), present(new))
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

/// Plan one instance.
///
/// `custom_replace` sees the prior state and the normalized configuration
/// and may name extra paths that force replacement, e.g. a changed identity
/// field inside an opaque document.
pub fn plan(
    schema: &Schema,
    prior: Option<&InstanceState>,
    config: &Value,
    custom_replace: &dyn Fn(&InstanceState, &Map<String, Value>) -> Vec<String>,
) -> Result<PlanResult, ProviderError> {
    let prior = prior.filter(|p| p.is_present());

    if config.is_null() {
        return Ok(match prior {
            Some(p) => PlanResult::delete(
                p.attributes
                    .iter()
                    .map(|(k, v)| AttributeChange::removed(k.clone(), v.clone()))
                    .collect(),
            ),
            None => PlanResult::no_change(Value::Null),
        });
    }

    let desired = normalize_config(schema, config)?;

    let Some(prior) = prior else {
        let changes = desired
            .iter()
            .filter(|(_, v)| !is_unset(Some(v)))
            .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
            .collect();
        return Ok(PlanResult::create(Value::Object(desired), changes));
    };

    let mut prior_attributes = prior.attributes.clone();
    normalize_state(schema, &mut prior_attributes);

    let mut result = diff(schema, &prior_attributes, &desired);
    for path in custom_replace(prior, &desired) {
        if !result.changes.iter().any(|c| c.path == path) {
            result
                .changes
                .push(change(&path, prior_attributes.get(&path), desired.get(&path)));
        }
        if !result.replace_paths.contains(&path) {
            result.replace_paths.push(path);
        }
    }

    if prior.tainted {
        return Ok(PlanResult {
            planned_state: InstanceState {
                attributes: desired,
                ..InstanceState::default()
            }
            .to_value(),
            changes: result.changes,
            action: PlanAction::Replace,
            replace_paths: result.replace_paths,
        });
    }

    if result.is_empty() {
        let mut unchanged = prior.clone();
        unchanged.attributes = prior_attributes;
        return Ok(PlanResult::no_change(unchanged.to_value()));
    }

    let planned = if result.requires_replace() {
        InstanceState {
            attributes: desired,
            ..InstanceState::default()
        }
    } else {
        merge_for_update(schema, prior, prior_attributes, desired)
    };

    Ok(PlanResult::with_changes(
        planned.to_value(),
        result.changes,
        result.replace_paths,
    ))
}

/// Overlay configured values on the prior state, keeping computed values
/// the configuration does not manage.
fn merge_for_update(
    schema: &Schema,
    prior: &InstanceState,
    mut attributes: Map<String, Value>,
    desired: Map<String, Value>,
) -> InstanceState {
    for (name, attr) in &schema.block.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        match desired.get(name) {
            Some(v) if !is_unset(Some(v)) => {
                attributes.insert(name.clone(), v.clone());
            },
            _ if attr.flags.computed => {},
            _ => {
                attributes.remove(name);
            },
        }
    }
    for name in schema.block.blocks.keys() {
        match desired.get(name) {
            Some(v) if !v.is_null() => {
                attributes.insert(name.clone(), v.clone());
            },
            _ => {
                attributes.remove(name);
            },
        }
    }

    InstanceState {
        id: prior.id.clone(),
        attributes,
        ..InstanceState::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, DiffSuppressor, NestedBlock, StateNormalizer};
    use crate::types::PlanAction;
    use serde_json::json;

    fn no_custom(_: &InstanceState, _: &Map<String, Value>) -> Vec<String> {
        vec![]
    }

    fn monitor_schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("type", Attribute::required_string().with_force_new())
            .with_attribute(
                "query",
                Attribute::required_string().with_normalizer(StateNormalizer::trim()),
            )
            .with_attribute("tags", Attribute::optional_string_set())
            .with_attribute(
                "critical",
                Attribute::optional_string().with_diff_suppress(DiffSuppressor::float_int()),
            )
            .with_attribute(
                "notify_no_data",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("team", Attribute::optional_computed_string())
            .with_attribute("url", Attribute::computed_string())
    }

    fn state(id: &str, attributes: Value) -> InstanceState {
        let mut state = InstanceState::from_value(&attributes).unwrap();
        state.id = id.to_string();
        state
    }

    #[test]
    fn test_plan_create_without_prior() {
        let plan = plan(
            &monitor_schema(),
            None,
            &json!({"name": "cpu", "type": "metric alert", "query": " q "}),
            &no_custom,
        )
        .unwrap();

        assert_eq!(plan.action, PlanAction::Create);
        assert_eq!(plan.planned_state["query"], json!("q"));
        assert_eq!(plan.planned_state["notify_no_data"], json!(false));
        assert!(plan.changes.iter().any(|c| c.path == "name"));
    }

    #[test]
    fn test_plan_absent_prior_is_create() {
        let mut prior = state("1", json!({"name": "cpu"}));
        prior.clear_id();
        let plan = plan(
            &monitor_schema(),
            Some(&prior),
            &json!({"name": "cpu", "type": "metric alert", "query": "q"}),
            &no_custom,
        )
        .unwrap();
        assert_eq!(plan.action, PlanAction::Create);
    }

    #[test]
    fn test_plan_no_change_after_apply() {
        let prior = state(
            "1",
            json!({
                "name": "cpu",
                "type": "metric alert",
                "query": "q",
                "tags": ["b", "a"],
                "critical": "1.0",
                "notify_no_data": false,
                "team": "core",
                "url": "/monitors/1"
            }),
        );
        let config = json!({
            "name": "cpu",
            "type": "metric alert",
            "query": "  q\n",
            "tags": ["a", "b", "a"],
            "critical": "1"
        });

        let plan = plan(&monitor_schema(), Some(&prior), &config, &no_custom).unwrap();
        assert!(plan.is_empty(), "unexpected changes: {:?}", plan.changes);
        assert_eq!(plan.planned_state["id"], json!("1"));
    }

    #[test]
    fn test_plan_update_keeps_computed() {
        let prior = state(
            "1",
            json!({
                "name": "cpu",
                "type": "metric alert",
                "query": "q",
                "notify_no_data": false,
                "url": "/monitors/1"
            }),
        );
        let plan = plan(
            &monitor_schema(),
            Some(&prior),
            &json!({"name": "cpu2", "type": "metric alert", "query": "q"}),
            &no_custom,
        )
        .unwrap();

        assert_eq!(plan.action, PlanAction::Update);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "name");
        assert_eq!(plan.planned_state["url"], json!("/monitors/1"));
        assert_eq!(plan.planned_state["id"], json!("1"));
    }

    #[test]
    fn test_plan_force_new_replaces() {
        let prior = state("1", json!({"name": "cpu", "type": "metric alert", "query": "q"}));
        let plan = plan(
            &monitor_schema(),
            Some(&prior),
            &json!({"name": "cpu", "type": "log alert", "query": "q"}),
            &no_custom,
        )
        .unwrap();

        assert_eq!(plan.action, PlanAction::Replace);
        assert_eq!(plan.replace_paths, vec!["type".to_string()]);
        assert_eq!(plan.planned_state["id"], Value::Null);
    }

    #[test]
    fn test_suppressor_ignored_on_force_new() {
        let schema = Schema::v0().with_attribute(
            "region",
            Attribute::required_string()
                .with_force_new()
                .with_diff_suppress(DiffSuppressor::case_insensitive()),
        );
        let prior = state("1", json!({"region": "US1"}));
        let plan = plan(&schema, Some(&prior), &json!({"region": "us1"}), &no_custom).unwrap();
        assert!(plan.requires_replace());
    }

    #[test]
    fn test_suppressor_not_consulted_when_one_side_unset() {
        let schema = Schema::v0().with_attribute(
            "critical",
            Attribute::optional_string().with_diff_suppress(DiffSuppressor::new(|_, _, _| true)),
        );
        let prior = state("1", json!({"critical": "1"}));
        let plan = plan(&schema, Some(&prior), &json!({}), &no_custom).unwrap();
        assert_eq!(plan.action, PlanAction::Update);
        assert_eq!(plan.changes[0].after, None);
    }

    #[test]
    fn test_suppressor_reads_sibling_attribute() {
        let schema = Schema::v0()
            .with_attribute("pinned", Attribute::optional_bool())
            .with_attribute(
                "query",
                Attribute::optional_string().with_diff_suppress(DiffSuppressor::new(
                    |_, _, config| config.get("pinned") == Some(&Value::Bool(true)),
                )),
            );
        let prior = state("1", json!({"pinned": true, "query": "a"}));

        let pinned = plan(&schema, Some(&prior), &json!({"pinned": true, "query": "b"}), &no_custom)
            .unwrap();
        assert!(pinned.is_empty());

        let unpinned = plan(&schema, Some(&prior), &json!({"pinned": false, "query": "b"}), &no_custom)
            .unwrap();
        assert_eq!(unpinned.action, PlanAction::Update);
        assert!(unpinned.changes.iter().any(|c| c.path == "query"));
    }

    #[test]
    fn test_set_block_order_is_irrelevant() {
        let rule = Block::new().with_attribute("name", Attribute::required_string());
        let schema = Schema::v0().with_block("rule", NestedBlock::set(rule));
        let prior = state("1", json!({"rule": [{"name": "a"}, {"name": "b"}]}));

        let reordered = json!({"rule": [{"name": "b"}, {"name": "a"}]});
        assert!(plan(&schema, Some(&prior), &reordered, &no_custom).unwrap().is_empty());

        let changed = json!({"rule": [{"name": "b"}, {"name": "c"}]});
        let plan = plan(&schema, Some(&prior), &changed, &no_custom).unwrap();
        assert_eq!(plan.action, PlanAction::Update);
        assert_eq!(plan.changes[0].path, "rule");
    }

    #[test]
    fn test_tainted_prior_is_replaced() {
        let config = json!({"name": "m", "type": "metric alert", "query": "q"});
        let mut prior = state("7", config.clone());
        prior.tainted = true;

        let plan = plan(&monitor_schema(), Some(&prior), &config, &no_custom).unwrap();
        assert!(plan.requires_replace());
        assert_eq!(plan.planned_state["id"], Value::Null);
    }

    #[test]
    fn test_unset_equals_empty() {
        let schema = Schema::v0()
            .with_attribute("message", Attribute::optional_string())
            .with_attribute("tags", Attribute::optional_string_set());
        let prior = state("1", json!({}));
        let plan = plan(&schema, Some(&prior), &json!({"message": "", "tags": []}), &no_custom)
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_list_order_matters() {
        let schema = Schema::v0().with_attribute("indexes", Attribute::required_string_list());
        let prior = state("logs-index-order", json!({"indexes": ["main", "minor"]}));
        let plan = plan(
            &schema,
            Some(&prior),
            &json!({"indexes": ["minor", "main"]}),
            &no_custom,
        )
        .unwrap();
        assert_eq!(plan.action, PlanAction::Update);
    }

    #[test]
    fn test_nested_block_paths() {
        let schema = Schema::v0().with_block(
            "display",
            NestedBlock::single(
                Block::new()
                    .with_attribute("message", Attribute::optional_bool().with_default(json!(true)))
                    .with_attribute("tags", Attribute::optional_bool().with_default(json!(true))),
            ),
        );
        let prior = state("a:b", json!({"display": [{"message": true, "tags": true}]}));

        let plan_same = plan(&schema, Some(&prior), &json!({"display": [{}]}), &no_custom).unwrap();
        assert!(plan_same.is_empty());

        let plan = plan(
            &schema,
            Some(&prior),
            &json!({"display": [{"message": false}]}),
            &no_custom,
        )
        .unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "display[0].message");
    }

    #[test]
    fn test_custom_replace_paths() {
        let schema = Schema::v0().with_attribute("monitor", Attribute::required_string());
        let prior = state("1", json!({"monitor": "{\"type\":\"metric alert\"}"}));
        let custom = |_: &InstanceState, _: &Map<String, Value>| vec!["monitor".to_string()];

        let plan = plan(
            &schema,
            Some(&prior),
            &json!({"monitor": "{\"type\":\"log alert\"}"}),
            &custom,
        )
        .unwrap();
        assert!(plan.requires_replace());
        assert_eq!(plan.changes.len(), 1);
    }

    #[test]
    fn test_plan_delete() {
        let prior = state("1", json!({"name": "cpu"}));
        let plan = plan(&monitor_schema(), Some(&prior), &Value::Null, &no_custom).unwrap();
        assert_eq!(plan.action, PlanAction::Delete);
        assert_eq!(plan.changes[0].path, "name");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let schema = monitor_schema();
        let once = normalize_config(
            &schema,
            &json!({"name": "cpu", "query": " q ", "tags": ["z", "a", "z"]}),
        )
        .unwrap();
        let twice = normalize_config(&schema, &Value::Object(once.clone())).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once["tags"], json!(["a", "z"]));
    }
}
