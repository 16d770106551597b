//! Condition node
//!
//! An `if / else if / else` switch. Each branch gets its own output port:
//! `true` for the first, `true_1`, `true_2`, ... for the following ones and
//! `false` for the fallthrough.

use workflow_engine::descriptor::{PortDefinition, DEFAULT_INPUT_PORT};
use workflow_engine::node_config::{Comparison, ConditionBranch, ConditionConfig};
use workflow_engine::{
    DescriptorFn, Document, Issue, IssueKind, Line, Node, NodeBody, NodeCategory, NodeConfig,
    NodeDefinition, NodeDescriptor, NodeType, ValidationContext, ValueExpression,
};

pub struct ConditionNode;

impl ConditionNode {
    pub const PORT_TRUE: &'static str = "true";
    pub const PORT_FALSE: &'static str = "false";

    /// Port of the branch at `index`
    pub fn branch_port(index: usize) -> String {
        match index {
            0 => Self::PORT_TRUE.to_string(),
            n => format!("{}_{}", Self::PORT_TRUE, n),
        }
    }

    fn config(node: &Node) -> Option<&ConditionConfig> {
        match node.config() {
            NodeConfig::Condition(config) => Some(config),
            _ => None,
        }
    }

    fn default_body() -> NodeBody {
        NodeBody::new(
            "Condition",
            NodeConfig::Condition(ConditionConfig {
                branches: vec![ConditionBranch {
                    conditions: vec![Comparison {
                        operator: "equal".to_string(),
                        left: None,
                        right: None,
                    }],
                    ..Default::default()
                }],
            }),
        )
    }

    fn ports(node: &Node) -> Vec<PortDefinition> {
        let branches = Self::config(node).map_or(0, |c| c.branches.len()).max(1);
        let mut ports = vec![PortDefinition::input(DEFAULT_INPUT_PORT)];
        ports.extend((0..branches).map(|i| PortDefinition::output(Self::branch_port(i))));
        ports.push(PortDefinition::output(Self::PORT_FALSE));
        ports
    }

    /// The last outgoing line must stay
    fn can_remove_line(document: &Document, line: &Line) -> bool {
        document.outgoing_lines(&line.from).len() > 1
    }

    fn validate(node: &Node, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let Some(config) = Self::config(node) else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        if config.branches.is_empty() {
            issues.push(Issue::new(
                &node.id,
                "inputs.branches",
                IssueKind::InvalidConfig,
                "A condition needs at least one branch",
            ));
        }

        for (b, branch) in config.branches.iter().enumerate() {
            let branch_path = format!("inputs.branches[{}]", b);
            if !branch.conditions.iter().any(|c| c.left.as_ref().is_some_and(|l| !l.is_empty())) {
                issues.push(Issue::new(
                    &node.id,
                    &branch_path,
                    IssueKind::InvalidConfig,
                    format!("Branch {} has no condition with a left operand", b + 1),
                ));
            }

            for (c, comparison) in branch.conditions.iter().enumerate() {
                let operands = [("left", &comparison.left), ("right", &comparison.right)];
                for (side, operand) in operands {
                    let Some(ValueExpression::Ref { key_path }) = operand else {
                        continue;
                    };
                    if !key_path.is_empty() && ctx.lookup.lookup(&node.id, key_path).is_none() {
                        issues.push(Issue::new(
                            &node.id,
                            format!("{}.conditions[{}].{}", branch_path, c, side),
                            IssueKind::InvalidReference,
                            format!("'{}' references a variable that no longer exists", key_path.join(".")),
                        ));
                    }
                }
            }
        }
        issues
    }
}

impl NodeDefinition for ConditionNode {
    fn descriptor() -> NodeDescriptor {
        NodeDescriptor::new(
            NodeType::Condition,
            "Condition",
            NodeCategory::Control,
            Self::default_body,
        )
        .with_ports(Self::ports)
        .with_line_policy(Self::can_remove_line)
        .with_validator(Self::validate)
    }
}

inventory::submit!(DescriptorFn(ConditionNode::descriptor));
