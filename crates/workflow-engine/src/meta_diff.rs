//! Meta tree diffing and JSON default realignment
//!
//! When a user edits an output schema, JSON defaults derived from the old
//! schema (error-branch data, object literals) must follow the edit: renamed
//! fields keep their value, removed fields disappear, retyped fields reset and
//! new fields receive a type default.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::types::{ViewType, ViewVariableMeta};

/// A meta flattened out of its tree, with the names and types of its ancestors
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMeta {
    pub key: String,
    pub name: String,
    pub ty: ViewType,
    /// `(name, type)` of each ancestor, outermost first
    pub parents: Vec<(String, ViewType)>,
}

impl FlatMeta {
    pub fn level(&self) -> usize {
        self.parents.len()
    }
}

/// Differences between two meta trees, matched by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDiff {
    pub removed: Vec<FlatMeta>,
    /// `(before, after)` pairs whose name changed
    pub renamed: Vec<(FlatMeta, FlatMeta)>,
    /// `(before, after)` pairs whose type changed
    pub retyped: Vec<(FlatMeta, FlatMeta)>,
    pub added: Vec<FlatMeta>,
}

impl MetaDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
            && self.renamed.is_empty()
            && self.retyped.is_empty()
            && self.added.is_empty()
    }
}

/// Flatten a meta tree in pre-order
pub fn flatten_metas(metas: &[ViewVariableMeta]) -> Vec<FlatMeta> {
    fn walk(metas: &[ViewVariableMeta], parents: &[(String, ViewType)], out: &mut Vec<FlatMeta>) {
        for meta in metas {
            out.push(FlatMeta {
                key: meta.key.clone(),
                name: meta.name.clone(),
                ty: meta.ty.clone(),
                parents: parents.to_vec(),
            });
            if !meta.children.is_empty() {
                let mut nested = parents.to_vec();
                nested.push((meta.name.clone(), meta.ty.clone()));
                walk(&meta.children, &nested, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(metas, &[], &mut out);
    out
}

/// Compare two meta trees by key
pub fn diff_metas(old: &[ViewVariableMeta], new: &[ViewVariableMeta]) -> MetaDiff {
    let old_flat = flatten_metas(old);
    let new_flat = flatten_metas(new);
    let new_by_key: HashMap<&str, &FlatMeta> =
        new_flat.iter().map(|m| (m.key.as_str(), m)).collect();
    let old_by_key: HashMap<&str, &FlatMeta> =
        old_flat.iter().map(|m| (m.key.as_str(), m)).collect();

    let mut diff = MetaDiff::default();
    for before in &old_flat {
        match new_by_key.get(before.key.as_str()) {
            None => diff.removed.push(before.clone()),
            Some(after) => {
                if before.name != after.name {
                    diff.renamed.push((before.clone(), (*after).clone()));
                }
                if before.ty != after.ty {
                    diff.retyped.push((before.clone(), (*after).clone()));
                }
            }
        }
    }
    for after in &new_flat {
        if !old_by_key.contains_key(after.key.as_str()) && !after.name.is_empty() {
            diff.added.push(after.clone());
        }
    }
    diff
}

/// JSON default for a single type
pub fn default_value_for(ty: &ViewType) -> Value {
    match ty {
        ViewType::String | ViewType::Time | ViewType::File(_) => Value::String(String::new()),
        ViewType::Integer | ViewType::Number => Value::from(0),
        ViewType::Boolean => Value::Bool(false),
        ViewType::Object => Value::Object(Map::new()),
        ViewType::List(item) if **item == ViewType::Object => {
            Value::Array(vec![Value::Object(Map::new())])
        }
        ViewType::List(_) => Value::Array(Vec::new()),
    }
}

fn meta_to_json(meta: &ViewVariableMeta) -> Value {
    match &meta.ty {
        ViewType::Object => Value::Object(metas_to_map(&meta.children)),
        ViewType::List(item) if **item == ViewType::Object => {
            Value::Array(vec![Value::Object(metas_to_map(&meta.children))])
        }
        other => default_value_for(other),
    }
}

fn metas_to_map(metas: &[ViewVariableMeta]) -> Map<String, Value> {
    metas
        .iter()
        .filter(|m| !m.name.is_empty())
        .map(|m| (m.name.clone(), meta_to_json(m)))
        .collect()
}

/// Generate a default JSON object for a meta list
pub fn default_json_for(metas: &[ViewVariableMeta]) -> Value {
    Value::Object(metas_to_map(metas))
}

/// Rebuild the fields of one object level against the new schema.
///
/// Keys not described by the old schema are kept as they are.
fn realign_level(
    old_map: Option<&Map<String, Value>>,
    old: &[ViewVariableMeta],
    new: &[ViewVariableMeta],
) -> Map<String, Value> {
    let mut out = old_map.cloned().unwrap_or_default();
    for meta in old {
        out.remove(&meta.name);
    }

    for meta in new.iter().filter(|m| !m.name.is_empty()) {
        let carried = old.iter().find(|o| o.key == meta.key).and_then(|prev| {
            old_map?
                .get(&prev.name)
                .map(|current| realign_value(current, prev, meta))
        });
        out.insert(meta.name.clone(), carried.unwrap_or_else(|| meta_to_json(meta)));
    }
    out
}

fn realign_value(current: &Value, prev: &ViewVariableMeta, meta: &ViewVariableMeta) -> Value {
    let object_list = ViewType::list_of(ViewType::Object);
    match (&prev.ty, &meta.ty, current) {
        (ViewType::Object, ViewType::Object, Value::Object(map)) => {
            Value::Object(realign_level(Some(map), &prev.children, &meta.children))
        }
        (before, after, Value::Array(items)) if *before == object_list && *after == object_list => {
            Value::Array(
                items
                    .iter()
                    .map(|item| {
                        Value::Object(realign_level(item.as_object(), &prev.children, &meta.children))
                    })
                    .collect(),
            )
        }
        (before, ViewType::Object, Value::Array(items)) if *before == object_list => {
            let first = items.first().and_then(Value::as_object);
            Value::Object(realign_level(first, &prev.children, &meta.children))
        }
        (ViewType::Object, after, Value::Object(map)) if *after == object_list => Value::Array(vec![
            Value::Object(realign_level(Some(map), &prev.children, &meta.children)),
        ]),
        (before, after, value) if before == after => value.clone(),
        _ => meta_to_json(meta),
    }
}

/// Rewrite a JSON default after its schema changed from `old` to `new`.
///
/// Renamed fields carry their value, removed fields are dropped, retyped
/// fields reset to a default (objects and lists of objects convert into each
/// other) and added fields get a default. Malformed JSON is returned unchanged.
pub fn realign_json(json: &str, old: &[ViewVariableMeta], new: &[ViewVariableMeta]) -> String {
    let value: Value = match serde_json::from_str(json) {
        Ok(value @ Value::Object(_)) => value,
        _ => return json.to_string(),
    };

    if diff_metas(old, new).is_empty() {
        return json.to_string();
    }

    let realigned = Value::Object(realign_level(value.as_object(), old, new));
    serde_json::to_string_pretty(&realigned).unwrap_or_else(|_| json.to_string())
}
