//! Default persistence formatters and helpers shared by node crates
//!
//! The default formatters persist the title as `nodeMeta`, input bindings as
//! `inputs.inputParameters`, outputs as wire metas and the node config under
//! `inputs.settings`. Node types with a different persisted shape replace
//! them through [`NodeDescriptor::with_formatters`](crate::descriptor::NodeDescriptor::with_formatters)
//! and reuse the helpers here.

use serde_json::{Map, Value};

use crate::document::{Node, NodeBody};
use crate::dto::{InputsDto, NodeDataDto, NodeMetaDto};
use crate::error::Result;
use crate::node_config::NodeConfig;
use crate::types::{dto_meta_to_view_meta, view_meta_to_dto_meta, VariableMetaDto, ViewVariableMeta};
use crate::variables::{inputs_to_dto, inputs_to_vo, VariableLookup};

/// Key under `inputs` holding the serialized node config
pub const SETTINGS_KEY: &str = "settings";

/// The settings payload of a config, `None` for configs without settings
pub fn settings_of(config: &NodeConfig) -> Option<Value> {
    let mut tagged = serde_json::to_value(config).ok()?;
    tagged.as_object_mut()?.remove(SETTINGS_KEY)
}

/// Rebuild a config of the same variant as `template` from a settings payload
pub fn config_with_settings(template: &NodeConfig, settings: Value) -> Result<NodeConfig> {
    let mut tagged = serde_json::to_value(template)?;
    if let Some(map) = tagged.as_object_mut() {
        if map.contains_key(SETTINGS_KEY) {
            map.insert(SETTINGS_KEY.to_string(), settings);
        }
    }
    Ok(serde_json::from_value(tagged)?)
}

pub fn outputs_to_dto(outputs: &[ViewVariableMeta]) -> Vec<VariableMetaDto> {
    outputs.iter().map(view_meta_to_dto_meta).collect()
}

pub fn outputs_to_vo(outputs: &[VariableMetaDto]) -> Result<Vec<ViewVariableMeta>> {
    outputs.iter().map(dto_meta_to_view_meta).collect()
}

/// Apply wire data over a default body
pub fn default_format_on_init(data: &NodeDataDto, mut body: NodeBody) -> Result<NodeBody> {
    if let Some(meta) = &data.node_meta {
        body.title = meta.title.clone();
    }
    body.inputs = inputs_to_vo(&data.inputs.input_parameters);
    body.outputs = outputs_to_vo(&data.outputs)?;
    if let Some(settings) = data.inputs.extra.get(SETTINGS_KEY) {
        body.config = config_with_settings(&body.config, settings.clone())?;
    }
    Ok(body)
}

/// Produce the wire data of a node
pub fn default_format_on_submit(node: &Node, lookup: &dyn VariableLookup) -> NodeDataDto {
    let mut extra = Map::new();
    if let Some(settings) = settings_of(node.config()) {
        extra.insert(SETTINGS_KEY.to_string(), settings);
    }
    NodeDataDto {
        node_meta: Some(NodeMetaDto {
            title: node.title().to_string(),
        }),
        inputs: InputsDto {
            input_parameters: inputs_to_dto(&node.id, node.inputs(), lookup),
            extra,
        },
        outputs: outputs_to_dto(node.outputs()),
    }
}
