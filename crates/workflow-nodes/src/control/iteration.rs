//! Locals and checks shared by the iterating containers (Loop, Batch)

use serde_json::Value;
use workflow_engine::{
    InputValue, Issue, IssueKind, Node, ValidationContext, ValueExpression, VariableLookup,
    ViewType, ViewVariableMeta,
};

/// Name of the iteration counter local
pub const INDEX_LOCAL: &str = "index";

/// Locals keep the same key across recomputation so subscriptions can follow them
fn local_key(node: &Node, name: &str) -> String {
    format!("{}:{}", node.id, name)
}

fn local(node: &Node, name: &str, ty: ViewType) -> ViewVariableMeta {
    ViewVariableMeta::new(name, ty)
        .with_key(local_key(node, name))
        .read_only()
}

/// `index` followed by one element local per array input
pub fn element_locals(node: &Node, lookup: &dyn VariableLookup) -> Vec<ViewVariableMeta> {
    let mut locals = vec![local(node, INDEX_LOCAL, ViewType::Integer)];
    for input in node.inputs() {
        let Some(resolved) = input
            .input
            .key_path()
            .and_then(|path| lookup.lookup(&node.id, path))
        else {
            continue;
        };
        if let ViewType::List(item) = resolved.meta.ty {
            let mut element = local(node, &input.name, *item);
            element.children = resolved.meta.children;
            locals.push(element);
        }
    }
    locals
}

/// Type of a variable initialised from `expression`, as seen from `node`
pub fn expression_type(
    node: &Node,
    expression: &ValueExpression,
    lookup: &dyn VariableLookup,
) -> Option<ViewVariableMeta> {
    match expression {
        ValueExpression::Ref { key_path } => lookup.lookup(&node.id, key_path).map(|r| r.meta),
        ValueExpression::Literal { content } if !expression.is_empty() => {
            Some(ViewVariableMeta::new("", literal_type(content)))
        }
        ValueExpression::Literal { .. } => None,
    }
}

fn literal_type(content: &Value) -> ViewType {
    match content {
        Value::Bool(_) => ViewType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ViewType::Integer,
        Value::Number(_) => ViewType::Number,
        Value::Object(_) => ViewType::Object,
        Value::Array(items) => ViewType::list_of(
            items
                .first()
                .map(literal_type)
                .unwrap_or(ViewType::String),
        ),
        Value::Null | Value::String(_) => ViewType::String,
    }
}

/// Locals for named variables, typed by what they are initialised from
pub fn variable_locals(
    node: &Node,
    variables: &[InputValue],
    lookup: &dyn VariableLookup,
) -> Vec<ViewVariableMeta> {
    variables
        .iter()
        .filter(|v| !v.name.is_empty())
        .filter_map(|v| {
            let meta = expression_type(node, &v.input, lookup)?;
            let mut variable = local(node, &v.name, meta.ty);
            variable.children = meta.children;
            Some(variable)
        })
        .collect()
}

/// Every bound reference input of an iterating container must point at a list
pub fn validate_array_inputs(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
    node.inputs()
        .iter()
        .filter_map(|input| {
            let resolved = input
                .input
                .key_path()
                .and_then(|path| ctx.lookup.lookup(&node.id, path))?;
            if resolved.meta.ty.is_list() {
                return None;
            }
            Some(Issue::new(
                &node.id,
                format!("inputs.{}", input.name),
                IssueKind::InvalidConfig,
                format!(
                    "Input '{}' must reference an array, found {}",
                    input.name, resolved.meta.ty
                ),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_types() {
        assert_eq!(literal_type(&serde_json::json!(3)), ViewType::Integer);
        assert_eq!(literal_type(&serde_json::json!(0.5)), ViewType::Number);
        assert_eq!(
            literal_type(&serde_json::json!([{"a": 1}])),
            ViewType::list_of(ViewType::Object)
        );
        assert_eq!(
            literal_type(&serde_json::json!([])),
            ViewType::list_of(ViewType::String)
        );
    }
}
