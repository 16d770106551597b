//! Persisted workflow JSON
//!
//! ```json
//! { "nodes": [{ "id", "type", "data": { "nodeMeta", "inputs", "outputs" },
//!               "blocks"?, "edges"? }],
//!   "edges": [{ "sourceNodeID", "targetNodeID", "sourcePortID"?, "targetPortID"? }] }
//! ```
//!
//! Containers persist their sub-canvas as `blocks` and `edges`. Proxy block
//! nodes are not persisted: a line leaving a proxy is written as leaving the
//! container through the `block-start` port.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{proxy_id_for, Document, Line, NodeSpec, NodeSubtree, BLOCK_START_PORT};
use crate::error::Result;
use crate::node_config::NodeType;
use crate::registry::NodeRegistry;
use crate::types::{NodeId, VariableMetaDto};
use crate::value::InputValueDto;
use crate::variables::VariableLookup;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDto {
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub edges: Vec<EdgeDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: NodeDataDto,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<NodeDto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<EdgeDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDataDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_meta: Option<NodeMetaDto>,
    #[serde(default)]
    pub inputs: InputsDto,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<VariableMetaDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetaDto {
    #[serde(default)]
    pub title: String,
}

/// Input bindings plus whatever type-specific settings a node persists next to them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsDto {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_parameters: Vec<InputValueDto>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDto {
    #[serde(rename = "sourceNodeID")]
    pub source_node_id: NodeId,
    #[serde(rename = "targetNodeID")]
    pub target_node_id: NodeId,
    #[serde(rename = "sourcePortID", default, skip_serializing_if = "Option::is_none")]
    pub source_port_id: Option<String>,
    #[serde(rename = "targetPortID", default, skip_serializing_if = "Option::is_none")]
    pub target_port_id: Option<String>,
}

impl EdgeDto {
    fn from_line(document: &Document, line: &Line) -> Self {
        let (source_node_id, source_port_id) = match document.proxy_owner(&line.from) {
            Some(owner) => (owner.clone(), Some(BLOCK_START_PORT.to_string())),
            None => (line.from.clone(), line.from_port.clone()),
        };
        Self {
            source_node_id,
            target_node_id: line.to.clone(),
            source_port_id,
            target_port_id: line.to_port.clone(),
        }
    }

    fn to_line(&self, parent: Option<&str>) -> Line {
        let from_proxy = parent.is_some_and(|p| p == self.source_node_id)
            && self.source_port_id.as_deref() == Some(BLOCK_START_PORT);

        let mut line = if from_proxy {
            Line::new(proxy_id_for(&self.source_node_id), self.target_node_id.clone())
        } else {
            let mut line = Line::new(self.source_node_id.clone(), self.target_node_id.clone());
            line.from_port = self.source_port_id.clone();
            line
        };
        line.to_port = self.target_port_id.clone();
        line
    }
}

/// Serialize a document through each node type's submit formatter
pub fn to_workflow_dto(
    document: &Document,
    registry: &NodeRegistry,
    lookup: &dyn VariableLookup,
) -> WorkflowDto {
    let (nodes, edges) = canvas_to_dto(document, registry, lookup, None);
    WorkflowDto { nodes, edges }
}

fn canvas_to_dto(
    document: &Document,
    registry: &NodeRegistry,
    lookup: &dyn VariableLookup,
    parent: Option<&str>,
) -> (Vec<NodeDto>, Vec<EdgeDto>) {
    let nodes = document
        .nodes_in_canvas(parent)
        .into_iter()
        .filter_map(|node| {
            let Some(descriptor) = registry.get(node.node_type()) else {
                log::warn!("Not persisting node '{}': {} is not registered", node.id, node.node_type());
                return None;
            };
            let (blocks, edges) = if node.is_container() {
                canvas_to_dto(document, registry, lookup, Some(&node.id))
            } else {
                (Vec::new(), Vec::new())
            };
            Some(NodeDto {
                id: node.id.clone(),
                node_type: node.node_type(),
                data: (descriptor.format_on_submit)(node, lookup),
                blocks,
                edges,
            })
        })
        .collect();

    let edges = document
        .lines_in_canvas(parent)
        .into_iter()
        .map(|line| EdgeDto::from_line(document, line))
        .collect();
    (nodes, edges)
}

/// Build a document from persisted JSON through each node type's init formatter.
///
/// Unknown node types, duplicate ids and malformed node data are errors.
/// Edges that no longer fit the nodes' ports are dropped with a warning.
pub fn from_workflow_dto(dto: &WorkflowDto, registry: &NodeRegistry) -> Result<Document> {
    let mut document = Document::new();
    load_canvas(&mut document, registry, None, &dto.nodes, &dto.edges)?;
    log::debug!(
        "Loaded workflow with {} nodes and {} lines",
        document.node_count(),
        document.lines().len()
    );
    Ok(document)
}

fn load_canvas(
    document: &mut Document,
    registry: &NodeRegistry,
    parent: Option<&str>,
    nodes: &[NodeDto],
    edges: &[EdgeDto],
) -> Result<()> {
    for dto in nodes {
        let descriptor = registry.descriptor(dto.node_type)?;
        let mut spec = NodeSpec::new(dto.node_type).with_id(dto.id.clone());
        if let Some(parent) = parent {
            spec = spec.inside(parent);
        }
        let mut node = document.create_node(spec, registry)?;
        node.body = (descriptor.format_on_init)(&dto.data, node.body)?;

        document.attach_subtree(NodeSubtree {
            nodes: vec![node],
            lines: Vec::new(),
            canvas_index: usize::MAX,
        })?;

        if !dto.blocks.is_empty() || !dto.edges.is_empty() {
            load_canvas(document, registry, Some(&dto.id), &dto.blocks, &dto.edges)?;
        }
    }

    for edge in edges {
        let line = edge.to_line(parent);
        if let Err(e) = document.check_line(&line, registry) {
            log::warn!(
                "Dropping edge {} -> {}: {}",
                edge.source_node_id,
                edge.target_node_id,
                e
            );
            continue;
        }
        document.insert_line(line, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_registry;
    use crate::types::{ViewType, ViewVariableMeta};
    use crate::value::{InputValue, ValueExpression};
    use crate::variables::VariableResolver;

    fn add(doc: &mut Document, registry: &NodeRegistry, spec: NodeSpec) {
        let node = doc.create_node(spec, registry).unwrap();
        doc.attach_subtree(NodeSubtree {
            nodes: vec![node],
            lines: Vec::new(),
            canvas_index: usize::MAX,
        })
        .unwrap();
    }

    fn sample(registry: &NodeRegistry) -> Document {
        let mut doc = Document::new();
        add(
            &mut doc,
            registry,
            NodeSpec::new(NodeType::Code)
                .with_id("code")
                .with_title("Produce")
                .with_outputs(vec![ViewVariableMeta::new("rows", ViewType::list_of(ViewType::Object))
                    .with_children(vec![ViewVariableMeta::new("id", ViewType::Integer)])]),
        );
        add(&mut doc, registry, NodeSpec::new(NodeType::Batch).with_id("batch"));
        add(
            &mut doc,
            registry,
            NodeSpec::new(NodeType::Code)
                .with_id("inner")
                .inside("batch")
                .with_inputs(vec![InputValue::new(
                    "ids",
                    ValueExpression::reference(["code", "rows", "id"]),
                )]),
        );
        doc.insert_line(Line::new("code", "batch"), None).unwrap();
        doc.insert_line(Line::new(proxy_id_for("batch"), "inner"), None).unwrap();
        doc
    }

    #[test]
    fn test_proxy_edges_persist_as_block_start() {
        let registry = test_registry();
        let doc = sample(&registry);
        let resolver = VariableResolver::new(Default::default());
        let scope = crate::variables::Scope {
            document: &doc,
            registry: &registry,
            resolver: &resolver,
        };

        let dto = to_workflow_dto(&doc, &registry, &scope);
        assert_eq!(dto.nodes.len(), 2);
        assert_eq!(dto.edges.len(), 1);

        let batch = &dto.nodes[1];
        assert_eq!(batch.blocks.len(), 1);
        assert_eq!(
            batch.edges,
            vec![EdgeDto {
                source_node_id: "batch".to_string(),
                target_node_id: "inner".to_string(),
                source_port_id: Some(BLOCK_START_PORT.to_string()),
                target_port_id: None,
            }]
        );

        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["nodes"][0]["type"], "5");
        assert_eq!(json["nodes"][0]["data"]["nodeMeta"]["title"], "Produce");
        assert_eq!(json["nodes"][1]["edges"][0]["sourcePortID"], "block-start");
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let registry = test_registry();
        let doc = sample(&registry);
        let resolver = VariableResolver::new(Default::default());
        let scope = crate::variables::Scope {
            document: &doc,
            registry: &registry,
            resolver: &resolver,
        };

        let json = serde_json::to_string(&to_workflow_dto(&doc, &registry, &scope)).unwrap();
        let parsed: WorkflowDto = serde_json::from_str(&json).unwrap();
        let back = from_workflow_dto(&parsed, &registry).unwrap();

        assert_eq!(back.node_ids(), doc.node_ids());
        assert_eq!(back.lines().len(), 2);
        assert!(back.lines().iter().any(|l| l.from == "batch-block-start" && l.to == "inner"));
        assert_eq!(back.node("code").unwrap().title(), "Produce");
        assert_eq!(back.node("code").unwrap().outputs()[0].children[0].name, "id");
        assert_eq!(
            back.node("inner").unwrap().inputs(),
            doc.node("inner").unwrap().inputs()
        );
    }

    #[test]
    fn test_unknown_type_rejected_and_bad_edges_dropped() {
        let registry = test_registry();
        let bad: std::result::Result<WorkflowDto, _> = serde_json::from_value(serde_json::json!({
            "nodes": [{"id": "x", "type": "999"}]
        }));
        assert!(bad.is_err());

        let dto: WorkflowDto = serde_json::from_value(serde_json::json!({
            "nodes": [{"id": "a", "type": "5"}, {"id": "b", "type": "5"}],
            "edges": [
                {"sourceNodeID": "a", "targetNodeID": "b"},
                {"sourceNodeID": "a", "targetNodeID": "ghost"},
                {"sourceNodeID": "a", "targetNodeID": "b", "sourcePortID": "nowhere"}
            ]
        }))
        .unwrap();
        let doc = from_workflow_dto(&dto, &registry).unwrap();
        assert_eq!(doc.node_count(), 2);
        assert_eq!(doc.lines().len(), 1);
    }
}
