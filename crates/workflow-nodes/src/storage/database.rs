//! Database nodes
//!
//! Query, insert, update and delete rows of a user table. The table columns
//! arrive asynchronously once a table is selected; insert and update then get
//! one input per column and every node gets an `outputList` shaped like a row.

use std::collections::HashMap;

use workflow_engine::descriptor::{default_input_tag, optional_input_tag};
use workflow_engine::node_config::DatabaseConfig;
use workflow_engine::{
    DescriptorFn, InputValue, InputVariableTag, Issue, IssueKind, Node, NodeBody, NodeCategory,
    NodeConfig, NodeDefinition, NodeDescriptor, NodeType, SchemaRequest, ValidationContext,
    VariableLookup, ViewType, ViewVariableMeta,
};

pub const OUTPUT_LIST: &str = "outputList";
pub const ROW_NUM: &str = "rowNum";

fn default_outputs(fields: &[ViewVariableMeta]) -> Vec<ViewVariableMeta> {
    vec![
        ViewVariableMeta::new(OUTPUT_LIST, ViewType::list_of(ViewType::Object))
            .with_children(fields.to_vec()),
        ViewVariableMeta::new(ROW_NUM, ViewType::Integer),
    ]
}

fn body(title: &str, config: NodeConfig) -> NodeBody {
    NodeBody::new(title, config).with_outputs(default_outputs(&[]))
}

/// Whether this node type writes column values and so takes one input per column
fn writes_columns(node_type: NodeType) -> bool {
    matches!(node_type, NodeType::DatabaseInsert | NodeType::DatabaseUpdate)
}

/// Whether this node type filters rows and so needs a condition
fn filters_rows(node_type: NodeType) -> bool {
    matches!(
        node_type,
        NodeType::DatabaseQuery | NodeType::DatabaseUpdate | NodeType::DatabaseDelete
    )
}

/// The schema request for the node's selected table, if one is selected
pub fn schema_request(node: &Node) -> Option<SchemaRequest> {
    let table_id = node.config().database()?.table_id.clone()?;
    Some(SchemaRequest::DatabaseTable { table_id })
}

/// Apply the columns of the selected table
fn apply_schema(body: &mut NodeBody, fields: Vec<ViewVariableMeta>) {
    let node_type = body.node_type();
    if writes_columns(node_type) {
        let mut bound: HashMap<String, InputValue> = body
            .inputs
            .drain(..)
            .map(|input| (input.name.clone(), input))
            .collect();
        body.inputs = fields
            .iter()
            .map(|f| bound.remove(&f.name).unwrap_or_else(|| InputValue::unbound(&f.name)))
            .collect();
    }

    let keys: HashMap<&str, &str> = body
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.key.as_str()))
        .collect();
    let outputs = default_outputs(&fields)
        .into_iter()
        .map(|meta| match keys.get(meta.name.as_str()) {
            Some(key) => meta.with_key(*key),
            None => meta,
        })
        .collect();
    body.outputs = outputs;

    if let Some(config) = body.config.database_mut() {
        config.table_fields = fields;
    }
}

/// A newly selected table invalidates everything derived from the old one
fn sync_table(before: &NodeBody, after: &mut NodeBody) {
    let previous = before.config.database().and_then(|c| c.table_id.clone());
    let Some(config) = after.config.database_mut() else {
        return;
    };
    if config.table_id == previous {
        return;
    }
    config.table_fields.clear();
    config.conditions.clear();
    if writes_columns(after.node_type()) {
        after.inputs.clear();
    }
    after.outputs = default_outputs(&[]);
}

/// Column inputs are required only for required columns
fn column_input_tag(
    node: &Node,
    input: &InputValue,
    lookup: &dyn VariableLookup,
) -> InputVariableTag {
    let required = node
        .config()
        .database()
        .is_some_and(|c| c.table_fields.iter().any(|f| f.name == input.name && f.required));
    if required {
        default_input_tag(node, input, lookup)
    } else {
        optional_input_tag(node, input, lookup)
    }
}

fn validate(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
    let Some(config) = node.config().database() else {
        return Vec::new();
    };
    if config.table_id.as_deref().map_or(true, str::is_empty) {
        return vec![Issue::new(
            &node.id,
            "inputs.tableId",
            IssueKind::EmptyValue,
            "No table selected",
        )];
    }

    let mut issues = Vec::new();
    if filters_rows(node.node_type()) && config.conditions.is_empty() {
        issues.push(Issue::new(
            &node.id,
            "inputs.conditions",
            IssueKind::InvalidConfig,
            "At least one condition is required",
        ));
    }
    issues.extend(validate_conditions(node, config, ctx));
    issues
}

fn validate_conditions(
    node: &Node,
    config: &DatabaseConfig,
    ctx: &ValidationContext<'_>,
) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (i, condition) in config.conditions.iter().enumerate() {
        let path = format!("inputs.conditions[{}]", i);
        if condition.field.is_empty() {
            issues.push(Issue::new(
                &node.id,
                format!("{}.field", path),
                IssueKind::EmptyValue,
                "Condition has no field",
            ));
        } else if !config.table_fields.is_empty()
            && !config.table_fields.iter().any(|f| f.name == condition.field)
        {
            issues.push(Issue::new(
                &node.id,
                format!("{}.field", path),
                IssueKind::InvalidConfig,
                format!("'{}' is not a column of the table", condition.field),
            ));
        }

        let unresolved = condition
            .right
            .as_ref()
            .and_then(|right| right.key_path())
            .is_some_and(|key_path| ctx.lookup.lookup(&node.id, key_path).is_none());
        if unresolved {
            issues.push(Issue::new(
                &node.id,
                format!("{}.right", path),
                IssueKind::InvalidReference,
                "Condition value references a variable that no longer exists",
            ));
        }
    }
    issues
}

fn descriptor(
    node_type: NodeType,
    label: &'static str,
    default_body: fn() -> NodeBody,
) -> NodeDescriptor {
    NodeDescriptor::new(node_type, label, NodeCategory::Storage, default_body)
        .with_input_tag(column_input_tag)
        .with_config_sync(sync_table)
        .with_schema_target(schema_request, apply_schema)
        .with_validator(validate)
}

pub struct DatabaseQueryNode;

impl NodeDefinition for DatabaseQueryNode {
    fn descriptor() -> NodeDescriptor {
        descriptor(NodeType::DatabaseQuery, "Query Data", || {
            body("Query Data", NodeConfig::DatabaseQuery(DatabaseConfig::default()))
        })
    }
}

inventory::submit!(DescriptorFn(DatabaseQueryNode::descriptor));

pub struct DatabaseInsertNode;

impl NodeDefinition for DatabaseInsertNode {
    fn descriptor() -> NodeDescriptor {
        descriptor(NodeType::DatabaseInsert, "Add Data", || {
            body("Add Data", NodeConfig::DatabaseInsert(DatabaseConfig::default()))
        })
    }
}

inventory::submit!(DescriptorFn(DatabaseInsertNode::descriptor));

pub struct DatabaseUpdateNode;

impl NodeDefinition for DatabaseUpdateNode {
    fn descriptor() -> NodeDescriptor {
        descriptor(NodeType::DatabaseUpdate, "Update Data", || {
            body("Update Data", NodeConfig::DatabaseUpdate(DatabaseConfig::default()))
        })
    }
}

inventory::submit!(DescriptorFn(DatabaseUpdateNode::descriptor));

pub struct DatabaseDeleteNode;

impl NodeDefinition for DatabaseDeleteNode {
    fn descriptor() -> NodeDescriptor {
        descriptor(NodeType::DatabaseDelete, "Delete Data", || {
            body("Delete Data", NodeConfig::DatabaseDelete(DatabaseConfig::default()))
        })
    }
}

inventory::submit!(DescriptorFn(DatabaseDeleteNode::descriptor));
