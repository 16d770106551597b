//! Value expressions bound to node inputs
//!
//! An input is either a literal JSON value or a reference to a variable
//! reachable from the node (a key path resolved by the variable service).
//! This module holds the editor shapes and their wire forms; converting
//! between them needs scope resolution and lives in
//! [`variables`](crate::variables).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};
use crate::types::{assist_code, AssistType, DtoType, SchemaDto, ViewType};

/// Editor-level value expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueExpression {
    Literal { content: Value },
    Ref { key_path: Vec<String> },
}

impl ValueExpression {
    pub fn literal(content: impl Into<Value>) -> Self {
        Self::Literal {
            content: content.into(),
        }
    }

    pub fn reference<I, S>(key_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ref {
            key_path: key_path.into_iter().map(Into::into).collect(),
        }
    }

    /// An expression with nothing bound: null or empty-string literal, or an empty path
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Literal { content } => match content {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                _ => false,
            },
            Self::Ref { key_path } => key_path.is_empty(),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref { .. })
    }

    pub fn key_path(&self) -> Option<&[String]> {
        match self {
            Self::Ref { key_path } => Some(key_path),
            Self::Literal { .. } => None,
        }
    }
}

impl Default for ValueExpression {
    fn default() -> Self {
        Self::Literal {
            content: Value::Null,
        }
    }
}

/// A named input binding of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub name: String,
    pub input: ValueExpression,
}

impl InputValue {
    pub fn new(name: impl Into<String>, input: ValueExpression) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }

    /// An input with nothing bound yet
    pub fn unbound(name: impl Into<String>) -> Self {
        Self::new(name, ValueExpression::default())
    }
}

/// Where a referenced variable lives, as written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefSource {
    #[serde(rename = "block-output")]
    BlockOutput,
    #[serde(rename = "global_variable_app")]
    GlobalApp,
    #[serde(rename = "global_variable_user")]
    GlobalUser,
    #[serde(rename = "global_variable_system")]
    GlobalSystem,
    #[serde(rename = "loop-local")]
    LoopLocal,
}

/// Wire content of a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefContentDto {
    pub source: RefSource,
    #[serde(rename = "blockID")]
    pub block_id: String,
    /// Remaining key path joined with `.`
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Literal,
    Ref,
}

/// Wire value of an expression: a literal payload or a [`RefContentDto`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInputValueDto {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default)]
    pub content: Value,
}

/// Wire form of a [`ValueExpression`], carrying the type of the bound value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueExpressionDto {
    #[serde(rename = "type")]
    pub dto_type: DtoType,
    #[serde(default, with = "assist_code", skip_serializing_if = "Option::is_none")]
    pub assist_type: Option<AssistType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDto>,
    pub value: BlockInputValueDto,
}

/// Wire form of an [`InputValue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValueDto {
    pub name: String,
    pub input: ValueExpressionDto,
}

/// Infer the wire type of a literal payload
pub fn literal_dto_type(content: &Value) -> DtoType {
    match content {
        Value::Bool(_) => DtoType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => DtoType::Integer,
        Value::Number(_) => DtoType::Float,
        Value::Array(_) => DtoType::List,
        Value::Object(_) => DtoType::Object,
        Value::Null | Value::String(_) => DtoType::String,
    }
}

/// Coerce a literal towards the declared type of the field it is bound to.
///
/// Strings holding numbers or booleans are parsed; JSON-typed fields accept
/// JSON text. Anything that does not fit is an error.
pub fn coerce_literal(ty: &ViewType, content: &Value) -> Result<Value> {
    let mismatch = || {
        EngineError::UnknownTypeTag(format!("literal {} does not fit type {}", content, ty))
    };

    match (ty, content) {
        (_, Value::Null) => Ok(Value::Null),
        (ViewType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(content.clone()),
        (ViewType::Integer, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64))
            .ok_or_else(mismatch),
        (ViewType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch())
        }
        (ViewType::Number, Value::Number(_)) => Ok(content.clone()),
        (ViewType::Number, Value::String(s)) => {
            s.trim().parse::<f64>().map(Value::from).map_err(|_| mismatch())
        }
        (ViewType::Boolean, Value::Bool(_)) => Ok(content.clone()),
        (ViewType::Boolean, Value::String(s)) => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        (ViewType::String | ViewType::Time | ViewType::File(_), Value::String(_)) => {
            Ok(content.clone())
        }
        (ViewType::String, Value::Number(_) | Value::Bool(_)) => {
            Ok(Value::String(content.to_string()))
        }
        (ViewType::Object, Value::Object(_)) | (ViewType::List(_), Value::Array(_)) => {
            Ok(content.clone())
        }
        (ViewType::Object | ViewType::List(_), Value::String(s)) => {
            let parsed: Value = serde_json::from_str(s).map_err(|_| mismatch())?;
            match (ty, &parsed) {
                (ViewType::Object, Value::Object(_)) | (ViewType::List(_), Value::Array(_)) => {
                    Ok(parsed)
                }
                _ => Err(mismatch()),
            }
        }
        _ => Err(mismatch()),
    }
}
