//! Statically-tagged node configuration
//!
//! Every node carries exactly one [`NodeConfig`] variant and its
//! [`NodeType`] is derived from that variant, so a node can never disagree
//! with its own configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::types::ViewVariableMeta;
use crate::value::{InputValue, ValueExpression};

/// Built-in node types, identified on the wire by numeric string tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeType {
    Start,
    End,
    Llm,
    Plugin,
    Code,
    Condition,
    Output,
    Break,
    SetVariable,
    Loop,
    Batch,
    Continue,
    Comment,
    DatabaseUpdate,
    DatabaseQuery,
    DatabaseDelete,
    Http,
    DatabaseInsert,
}

impl NodeType {
    pub const ALL: [NodeType; 18] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Llm,
        NodeType::Plugin,
        NodeType::Code,
        NodeType::Condition,
        NodeType::Output,
        NodeType::Break,
        NodeType::SetVariable,
        NodeType::Loop,
        NodeType::Batch,
        NodeType::Continue,
        NodeType::Comment,
        NodeType::DatabaseUpdate,
        NodeType::DatabaseQuery,
        NodeType::DatabaseDelete,
        NodeType::Http,
        NodeType::DatabaseInsert,
    ];

    /// Wire tag of this node type
    pub fn tag(&self) -> &'static str {
        match self {
            NodeType::Start => "1",
            NodeType::End => "2",
            NodeType::Llm => "3",
            NodeType::Plugin => "4",
            NodeType::Code => "5",
            NodeType::Condition => "8",
            NodeType::Output => "13",
            NodeType::Break => "19",
            NodeType::SetVariable => "20",
            NodeType::Loop => "21",
            NodeType::Batch => "28",
            NodeType::Continue => "29",
            NodeType::Comment => "31",
            NodeType::DatabaseUpdate => "42",
            NodeType::DatabaseQuery => "43",
            NodeType::DatabaseDelete => "44",
            NodeType::Http => "45",
            NodeType::DatabaseInsert => "46",
        }
    }

    /// Loop-scoped control nodes that are meaningless outside a loop body
    pub fn is_loop_only(&self) -> bool {
        matches!(self, NodeType::Break | NodeType::Continue | NodeType::SetVariable)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| EngineError::UnknownNodeType(s.to_string()))
    }
}

impl TryFrom<String> for NodeType {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> String {
        t.tag().to_string()
    }
}

/// What happens when a node fails at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorProcessType {
    /// Abort the workflow
    #[default]
    Throw,
    /// Continue with the configured default data
    Default,
    /// Continue through the dedicated `branch_error` port
    ExceptionBranch,
}

/// Error handling setting of nodes that can fail at run time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSetting {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub process_type: ErrorProcessType,
    /// JSON object returned in place of the outputs when `process_type` is `Default`
    #[serde(default = "empty_json_object")]
    pub data_on_err: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_times: u32,
}

fn empty_json_object() -> String {
    "{}".to_string()
}

impl Default for ErrorSetting {
    fn default() -> Self {
        Self {
            enabled: false,
            process_type: ErrorProcessType::Throw,
            data_on_err: empty_json_object(),
            timeout_ms: None,
            retry_times: 0,
        }
    }
}

impl ErrorSetting {
    pub fn has_error_branch(&self) -> bool {
        self.enabled && self.process_type == ErrorProcessType::ExceptionBranch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// A single comparison of a condition branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<ValueExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<ValueExpression>,
}

/// One `if` / `else if` branch of a condition node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionBranch {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<Comparison>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub branches: Vec<ConditionBranch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub error: ErrorSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default)]
    pub error: ErrorSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeConfig {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub error: ErrorSetting,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub error: ErrorSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminatePlan {
    /// Return the bound inputs as the workflow result
    #[default]
    ReturnVariables,
    /// Answer with a rendered template
    UseAnswerContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConfig {
    #[serde(default)]
    pub terminate_plan: TerminatePlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopType {
    #[default]
    Array,
    Count,
    Infinite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    #[serde(default)]
    pub loop_type: LoopType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<ValueExpression>,
    /// Loop variables readable and writable from the loop body
    #[serde(default)]
    pub variables: Vec<InputValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    pub batch_size: i64,
    pub concurrent_size: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrent_size: 10,
        }
    }
}

/// A filter condition over a database table field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    pub field: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<ValueExpression>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    /// Table columns, filled in asynchronously once the table schema arrives
    #[serde(default)]
    pub table_fields: Vec<ViewVariableMeta>,
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<FieldCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentConfig {
    #[serde(default)]
    pub note: String,
}

/// Per-type configuration of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "settings", rename_all = "snake_case")]
pub enum NodeConfig {
    Start,
    End(EndConfig),
    Llm(LlmConfig),
    Plugin(PluginConfig),
    Code(CodeConfig),
    Condition(ConditionConfig),
    Output(OutputConfig),
    Break,
    SetVariable,
    Loop(LoopConfig),
    Batch(BatchConfig),
    Continue,
    Comment(CommentConfig),
    DatabaseUpdate(DatabaseConfig),
    DatabaseQuery(DatabaseConfig),
    DatabaseDelete(DatabaseConfig),
    Http(HttpConfig),
    DatabaseInsert(DatabaseConfig),
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Start => NodeType::Start,
            NodeConfig::End(_) => NodeType::End,
            NodeConfig::Llm(_) => NodeType::Llm,
            NodeConfig::Plugin(_) => NodeType::Plugin,
            NodeConfig::Code(_) => NodeType::Code,
            NodeConfig::Condition(_) => NodeType::Condition,
            NodeConfig::Output(_) => NodeType::Output,
            NodeConfig::Break => NodeType::Break,
            NodeConfig::SetVariable => NodeType::SetVariable,
            NodeConfig::Loop(_) => NodeType::Loop,
            NodeConfig::Batch(_) => NodeType::Batch,
            NodeConfig::Continue => NodeType::Continue,
            NodeConfig::Comment(_) => NodeType::Comment,
            NodeConfig::DatabaseUpdate(_) => NodeType::DatabaseUpdate,
            NodeConfig::DatabaseQuery(_) => NodeType::DatabaseQuery,
            NodeConfig::DatabaseDelete(_) => NodeType::DatabaseDelete,
            NodeConfig::Http(_) => NodeType::Http,
            NodeConfig::DatabaseInsert(_) => NodeType::DatabaseInsert,
        }
    }

    /// Error handling setting, for node types that have one
    pub fn error_setting(&self) -> Option<&ErrorSetting> {
        match self {
            NodeConfig::Llm(c) => Some(&c.error),
            NodeConfig::Plugin(c) => Some(&c.error),
            NodeConfig::Code(c) => Some(&c.error),
            NodeConfig::Http(c) => Some(&c.error),
            _ => None,
        }
    }

    pub fn error_setting_mut(&mut self) -> Option<&mut ErrorSetting> {
        match self {
            NodeConfig::Llm(c) => Some(&mut c.error),
            NodeConfig::Plugin(c) => Some(&mut c.error),
            NodeConfig::Code(c) => Some(&mut c.error),
            NodeConfig::Http(c) => Some(&mut c.error),
            _ => None,
        }
    }

    /// Database settings shared by the four database node types
    pub fn database(&self) -> Option<&DatabaseConfig> {
        match self {
            NodeConfig::DatabaseUpdate(c)
            | NodeConfig::DatabaseQuery(c)
            | NodeConfig::DatabaseDelete(c)
            | NodeConfig::DatabaseInsert(c) => Some(c),
            _ => None,
        }
    }

    pub fn database_mut(&mut self) -> Option<&mut DatabaseConfig> {
        match self {
            NodeConfig::DatabaseUpdate(c)
            | NodeConfig::DatabaseQuery(c)
            | NodeConfig::DatabaseDelete(c)
            | NodeConfig::DatabaseInsert(c) => Some(c),
            _ => None,
        }
    }
}
