//! HTTP request node

use workflow_engine::node_config::HttpConfig;
use workflow_engine::{
    DescriptorFn, Issue, IssueKind, Node, NodeBody, NodeCategory, NodeConfig, NodeDefinition,
    NodeDescriptor, NodeType, ValidationContext, ViewType, ViewVariableMeta,
};

use crate::error_handling::with_error_handling;
use crate::template::check_placeholders;

pub struct HttpNode;

impl HttpNode {
    pub const METHODS: [&'static str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

    fn default_body() -> NodeBody {
        NodeBody::new(
            "HTTP Request",
            NodeConfig::Http(HttpConfig {
                method: Self::METHODS[0].to_string(),
                ..Default::default()
            }),
        )
        .with_outputs(vec![
            ViewVariableMeta::new("body", ViewType::String),
            ViewVariableMeta::new("statusCode", ViewType::Integer),
            ViewVariableMeta::new("headers", ViewType::String),
        ])
    }

    fn validate(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let NodeConfig::Http(config) = node.config() else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        if !Self::METHODS.contains(&config.method.to_ascii_uppercase().as_str()) {
            issues.push(Issue::new(
                &node.id,
                "inputs.method",
                IssueKind::InvalidConfig,
                format!("Unsupported method '{}'", config.method),
            ));
        }
        if config.url.trim().is_empty() {
            issues.push(Issue::new(&node.id, "inputs.url", IssueKind::EmptyValue, "URL is empty"));
        } else {
            issues.extend(check_placeholders(node, &config.url, "inputs.url"));
        }
        issues
    }
}

impl NodeDefinition for HttpNode {
    fn descriptor() -> NodeDescriptor {
        with_error_handling(
            NodeDescriptor::new(
                NodeType::Http,
                "HTTP Request",
                NodeCategory::Processing,
                Self::default_body,
            )
            .with_validator(Self::validate),
        )
    }
}

inventory::submit!(DescriptorFn(HttpNode::descriptor));
