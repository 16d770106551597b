//! Plugin node
//!
//! Calls one API of an installed plugin. The outputs follow the API's
//! response schema, which arrives asynchronously once the API is chosen.

use workflow_engine::node_config::PluginConfig;
use workflow_engine::{
    DescriptorFn, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition,
    NodeDescriptor, NodeType, SchemaRequest, ValidationContext, ViewVariableMeta,
};

use crate::error_handling::{sync_error_setting, with_error_handling};

pub struct PluginNode;

impl PluginNode {
    fn config(node: &Node) -> Option<&PluginConfig> {
        match node.config() {
            NodeConfig::Plugin(config) => Some(config),
            _ => None,
        }
    }

    /// The schema request for the node's selected API, if one is selected
    pub fn schema_request(node: &Node) -> Option<SchemaRequest> {
        let config = Self::config(node)?;
        Some(SchemaRequest::PluginApi {
            plugin_id: config.plugin_id.clone()?,
            api_name: config.api_name.clone()?,
        })
    }

    fn default_body() -> NodeBody {
        NodeBody::new("Plugin", NodeConfig::Plugin(PluginConfig::default()))
    }

    /// Replace the outputs with the API response schema
    fn apply_schema(body: &mut NodeBody, outputs: Vec<ViewVariableMeta>) {
        let before = body.clone();
        body.outputs = outputs;
        sync_error_setting(&before, body);
    }

    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let Some(config) = Self::config(node) else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        if config.plugin_id.as_deref().map_or(true, str::is_empty) {
            issues.push(Issue::new(
                &node.id,
                "inputs.pluginId",
                IssueKind::EmptyValue,
                "No plugin selected",
            ));
        }
        if config.api_name.as_deref().map_or(true, str::is_empty) {
            issues.push(Issue::new(
                &node.id,
                "inputs.apiName",
                IssueKind::EmptyValue,
                "No plugin API selected",
            ));
        }
        issues
    }
}

impl NodeDefinition for PluginNode {
    fn descriptor() -> NodeDescriptor {
        with_error_handling(
            NodeDescriptor::new(
                NodeType::Plugin,
                "Plugin",
                NodeCategory::Processing,
                Self::default_body,
            )
            .with_schema_target(Self::schema_request, Self::apply_schema)
            .with_validator(Self::validate),
        )
    }
}

inventory::submit!(DescriptorFn(PluginNode::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_engine::ViewType;

    #[test]
    fn test_schema_keeps_error_body() {
        let mut body = PluginNode::default_body();
        if let Some(setting) = body.config.error_setting_mut() {
            setting.enabled = true;
        }
        crate::error_handling::sync_error_body(&mut body);

        PluginNode::apply_schema(
            &mut body,
            vec![ViewVariableMeta::new("data", ViewType::Object)],
        );
        let names: Vec<&str> = body.outputs.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["data", "errorBody"]);
    }

    #[test]
    fn test_schema_request_needs_selection() {
        let mut node = Node {
            id: "plugin".to_string(),
            parent_id: None,
            body: PluginNode::default_body(),
            sub_canvas: None,
        };
        assert!(PluginNode::schema_request(&node).is_none());

        node.body.config = NodeConfig::Plugin(PluginConfig {
            plugin_id: Some("weather".to_string()),
            api_name: Some("forecast".to_string()),
            ..Default::default()
        });
        assert_eq!(
            PluginNode::schema_request(&node),
            Some(SchemaRequest::PluginApi {
                plugin_id: "weather".to_string(),
                api_name: "forecast".to_string(),
            })
        );
    }
}
