//! Loop node
//!
//! A container whose body runs once per element of its array inputs, a fixed
//! number of times, or until a Break. The body sees `index`, one element
//! local per array input and the loop variables, which SetVariable nodes in
//! the body may overwrite.

use serde_json::Value;
use workflow_engine::format::{default_format_on_init, default_format_on_submit, SETTINGS_KEY};
use workflow_engine::node_config::{LoopConfig, LoopType};
use workflow_engine::validation::check_name;
use workflow_engine::value::{InputValueDto, ValueExpressionDto};
use workflow_engine::variables::{
    inputs_to_dto, inputs_to_vo, value_expression_to_dto, value_expression_to_vo,
};
use workflow_engine::{
    DescriptorFn, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig, NodeDataDto,
    NodeDefinition, NodeDescriptor, NodeType, Result, ValidationContext, VariableLookup,
    ViewVariableMeta,
};

use super::iteration::{element_locals, validate_array_inputs, variable_locals};

pub struct LoopNode;

impl LoopNode {
    /// Key under `inputs` holding the loop variables
    pub const VARIABLES_KEY: &'static str = "variableParameters";
    /// Key under `inputs` holding the iteration count of count loops
    pub const LOOP_COUNT_KEY: &'static str = "loopCount";

    pub fn config(node: &Node) -> Option<&LoopConfig> {
        match node.config() {
            NodeConfig::Loop(config) => Some(config),
            _ => None,
        }
    }

    fn default_body() -> NodeBody {
        NodeBody::new("Loop", NodeConfig::Loop(LoopConfig::default()))
    }

    fn locals(node: &Node, lookup: &dyn VariableLookup) -> Vec<ViewVariableMeta> {
        let mut locals = element_locals(node, lookup);
        if let Some(config) = Self::config(node) {
            locals.extend(variable_locals(node, &config.variables, lookup));
        }
        locals
    }

    fn validate(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let Some(config) = Self::config(node) else {
            return Vec::new();
        };
        let mut issues = Vec::new();

        match config.loop_type {
            LoopType::Array => issues.extend(validate_array_inputs(node, ctx)),
            LoopType::Count => match &config.loop_count {
                Some(count) if !count.is_empty() => {
                    if let Some(path) = count.key_path() {
                        if ctx.lookup.lookup(&node.id, path).is_none() {
                            issues.push(Issue::new(
                                &node.id,
                                "inputs.loopCount",
                                IssueKind::InvalidReference,
                                "Loop count references a variable that no longer exists",
                            ));
                        }
                    }
                }
                _ => issues.push(Issue::new(
                    &node.id,
                    "inputs.loopCount",
                    IssueKind::EmptyValue,
                    "A count loop needs a loop count",
                )),
            },
            LoopType::Infinite => {}
        }

        let mut seen = std::collections::HashSet::new();
        for (i, variable) in config.variables.iter().enumerate() {
            let path = if variable.name.is_empty() {
                format!("inputs.{}[{}]", Self::VARIABLES_KEY, i)
            } else {
                format!("inputs.{}.{}", Self::VARIABLES_KEY, variable.name)
            };
            if let Some(kind) = check_name(&variable.name) {
                issues.push(Issue::new(&node.id, path, kind, "Invalid loop variable name"));
            } else if !seen.insert(variable.name.as_str()) {
                issues.push(Issue::new(
                    &node.id,
                    path,
                    IssueKind::Duplicated,
                    format!("Loop variable '{}' is declared twice", variable.name),
                ));
            } else if let Some(key_path) = variable.input.key_path() {
                if ctx.lookup.lookup(&node.id, key_path).is_none() {
                    issues.push(Issue::new(
                        &node.id,
                        path,
                        IssueKind::InvalidReference,
                        format!("Loop variable '{}' is initialised from a missing variable", variable.name),
                    ));
                }
            }
        }
        issues
    }

    fn format_on_init(data: &NodeDataDto, body: NodeBody) -> Result<NodeBody> {
        let mut data = data.clone();
        let variables = data
            .inputs
            .extra
            .remove(Self::VARIABLES_KEY)
            .map(serde_json::from_value::<Vec<InputValueDto>>)
            .transpose()?;
        let loop_count = data
            .inputs
            .extra
            .remove(Self::LOOP_COUNT_KEY)
            .map(serde_json::from_value::<ValueExpressionDto>)
            .transpose()?;

        let mut body = default_format_on_init(&data, body)?;
        if let NodeConfig::Loop(config) = &mut body.config {
            if let Some(variables) = variables {
                config.variables = inputs_to_vo(&variables);
            }
            if let Some(count) = loop_count {
                config.loop_count = value_expression_to_vo(&count);
            }
        }
        Ok(body)
    }

    fn format_on_submit(node: &Node, lookup: &dyn VariableLookup) -> NodeDataDto {
        let mut data = default_format_on_submit(node, lookup);
        let Some(config) = Self::config(node) else {
            return data;
        };
        if let Some(Value::Object(settings)) = data.inputs.extra.get_mut(SETTINGS_KEY) {
            settings.remove("variables");
            settings.remove(Self::LOOP_COUNT_KEY);
        }

        let variables = inputs_to_dto(&node.id, &config.variables, lookup);
        if let Ok(variables) = serde_json::to_value(variables) {
            data.inputs.extra.insert(Self::VARIABLES_KEY.to_string(), variables);
        }
        let loop_count = config
            .loop_count
            .as_ref()
            .and_then(|count| value_expression_to_dto(&node.id, count, lookup))
            .and_then(|dto| serde_json::to_value(dto).ok());
        if let Some(loop_count) = loop_count {
            data.inputs.extra.insert(Self::LOOP_COUNT_KEY.to_string(), loop_count);
        }
        data
    }
}

impl NodeDefinition for LoopNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(NodeType::Loop, "Loop", NodeCategory::Control, Self::default_body)
            .with_sub_canvas(true)
            .with_locals(Self::locals)
            .with_formatters(Self::format_on_init, Self::format_on_submit)
            .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(LoopNode::descriptor));
