//! Error handling shared by nodes that can fail at run time
//!
//! LLM, Code, Plugin and HTTP nodes carry an [`ErrorSetting`]. While it is
//! enabled the node exposes an extra `errorBody` output, and with the
//! exception-branch process type an extra `branch_error` port. The fallback
//! data used by the `default` process type is a JSON object shaped like the
//! outputs and follows every output schema edit.
//!
//! On the wire the setting lives in `inputs.settingOnError` and `errorBody`
//! is not persisted; both are reconstructed when a node is loaded.

use serde_json::{Map, Value};
use workflow_engine::descriptor::{default_ports, PortDefinition};
use workflow_engine::format::{default_format_on_init, default_format_on_submit, SETTINGS_KEY};
use workflow_engine::meta_diff::{default_json_for, realign_json};
use workflow_engine::node_config::{ErrorProcessType, ErrorSetting};
use workflow_engine::{
    Issue, IssueKind, Node, NodeBody, NodeDataDto, NodeDescriptor, Result, ValidationContext,
    VariableLookup, ViewType, ViewVariableMeta,
};

/// Output carrying the failure of a node
pub const ERROR_BODY: &str = "errorBody";
/// Output port taken when the node fails with the exception-branch process type
pub const BRANCH_ERROR_PORT: &str = "branch_error";
/// Key under `inputs` holding the persisted error setting
pub const SETTING_ON_ERROR_KEY: &str = "settingOnError";

const ERROR_FIELD: &str = "error";

pub fn error_body_meta() -> ViewVariableMeta {
    ViewVariableMeta::new(ERROR_BODY, ViewType::Object)
        .with_children(vec![
            ViewVariableMeta::new("errorMessage", ViewType::String).read_only(),
            ViewVariableMeta::new("errorCode", ViewType::String).read_only(),
        ])
        .read_only()
}

fn is_error_body(meta: &ViewVariableMeta) -> bool {
    meta.name == ERROR_BODY
}

/// Outputs the user declared, without `errorBody`
pub fn user_outputs(outputs: &[ViewVariableMeta]) -> Vec<ViewVariableMeta> {
    outputs.iter().filter(|m| !is_error_body(m)).cloned().collect()
}

/// Add or drop `errorBody` to match the error setting of the body
pub fn sync_error_body(body: &mut NodeBody) {
    let enabled = body.config.error_setting().is_some_and(|s| s.enabled);
    let present = body.outputs.iter().any(is_error_body);
    match (enabled, present) {
        (true, false) => body.outputs.push(error_body_meta()),
        (false, true) => body.outputs.retain(|m| !is_error_body(m)),
        _ => {}
    }
}

/// Config sync hook: keep `errorBody` and the fallback data in step with the outputs
pub fn sync_error_setting(before: &NodeBody, after: &mut NodeBody) {
    sync_error_body(after);

    let old = user_outputs(&before.outputs);
    let new = user_outputs(&after.outputs);
    let was_enabled = before.config.error_setting().is_some_and(|s| s.enabled);
    let Some(setting) = after.config.error_setting_mut() else {
        return;
    };

    if setting.enabled && !was_enabled && is_blank_object(&setting.data_on_err) {
        if let Ok(json) = serde_json::to_string_pretty(&default_json_for(&new)) {
            setting.data_on_err = json;
        }
    } else if old != new {
        setting.data_on_err = realign_json(&setting.data_on_err, &old, &new);
    }
}

fn is_blank_object(json: &str) -> bool {
    let trimmed = json.trim();
    trimmed.is_empty()
        || matches!(serde_json::from_str::<Value>(trimmed), Ok(Value::Object(map)) if map.is_empty())
}

/// Default ports plus `branch_error` when the exception branch is active
pub fn ports_with_error_branch(node: &Node) -> Vec<PortDefinition> {
    let mut ports = default_ports(node);
    if node.config().error_setting().is_some_and(ErrorSetting::has_error_branch) {
        ports.push(PortDefinition::output(BRANCH_ERROR_PORT));
    }
    ports
}

/// The fallback data must be a JSON object when it is used
pub fn validate_error_setting(node: &Node, _ctx: &ValidationContext<'_>) -> Vec<Issue> {
    let Some(setting) = node.config().error_setting() else {
        return Vec::new();
    };
    if !setting.enabled || setting.process_type != ErrorProcessType::Default {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(&setting.data_on_err) {
        Ok(Value::Object(_)) => Vec::new(),
        Ok(_) => vec![Issue::new(
            &node.id,
            "inputs.settingOnError.dataOnErr",
            IssueKind::InvalidDefaultJson,
            "Fallback data must be a JSON object",
        )],
        Err(e) => vec![Issue::new(
            &node.id,
            "inputs.settingOnError.dataOnErr",
            IssueKind::InvalidDefaultJson,
            format!("Fallback data is not valid JSON: {}", e),
        )],
    }
}

/// Move `settingOnError` back into the settings and rebuild `errorBody`
pub fn format_on_init(data: &NodeDataDto, body: NodeBody) -> Result<NodeBody> {
    let mut data = data.clone();
    data.outputs.retain(|o| o.name != ERROR_BODY);
    if let Some(error) = data.inputs.extra.remove(SETTING_ON_ERROR_KEY) {
        let settings = data
            .inputs
            .extra
            .entry(SETTINGS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(settings) = settings {
            settings.insert(ERROR_FIELD.to_string(), error);
        }
    }

    let mut body = default_format_on_init(&data, body)?;
    sync_error_body(&mut body);
    Ok(body)
}

/// Persist the error setting as `settingOnError` and leave `errorBody` out
pub fn format_on_submit(node: &Node, lookup: &dyn VariableLookup) -> NodeDataDto {
    let mut data = default_format_on_submit(node, lookup);
    data.outputs.retain(|o| o.name != ERROR_BODY);
    let error = match data.inputs.extra.get_mut(SETTINGS_KEY) {
        Some(Value::Object(settings)) => settings.remove(ERROR_FIELD),
        _ => None,
    };
    if let Some(error) = error {
        data.inputs.extra.insert(SETTING_ON_ERROR_KEY.to_string(), error);
    }
    data
}

/// Wire the error handling hooks into a descriptor
pub fn with_error_handling(descriptor: NodeDescriptor) -> NodeDescriptor {
    descriptor
        .with_ports(ports_with_error_branch)
        .with_formatters(format_on_init, format_on_submit)
        .with_config_sync(sync_error_setting)
        .with_validator(validate_error_setting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_engine::node_config::{CodeConfig, NodeConfig};

    fn code_body(outputs: Vec<ViewVariableMeta>) -> NodeBody {
        NodeBody::new("Code", NodeConfig::Code(CodeConfig::default())).with_outputs(outputs)
    }

    fn enable(body: &mut NodeBody, process_type: ErrorProcessType) {
        if let Some(setting) = body.config.error_setting_mut() {
            setting.enabled = true;
            setting.process_type = process_type;
        }
    }

    #[test]
    fn test_enabling_adds_error_body_and_default_data() {
        let before = code_body(vec![ViewVariableMeta::new("result", ViewType::String).with_key("k1")]);
        let mut after = before.clone();
        enable(&mut after, ErrorProcessType::Default);

        sync_error_setting(&before, &mut after);
        assert!(after.outputs.iter().any(|m| m.name == ERROR_BODY));
        let data: Value =
            serde_json::from_str(&after.config.error_setting().unwrap().data_on_err).unwrap();
        assert_eq!(data, serde_json::json!({"result": ""}));
    }

    #[test]
    fn test_disabling_removes_error_body() {
        let mut before = code_body(Vec::new());
        enable(&mut before, ErrorProcessType::Throw);
        sync_error_body(&mut before);

        let mut after = before.clone();
        if let Some(setting) = after.config.error_setting_mut() {
            setting.enabled = false;
        }
        sync_error_setting(&before, &mut after);
        assert!(after.outputs.is_empty());
    }

    #[test]
    fn test_output_rename_realigns_fallback_data() {
        let mut before = code_body(vec![ViewVariableMeta::new("result", ViewType::String).with_key("k1")]);
        enable(&mut before, ErrorProcessType::Default);
        if let Some(setting) = before.config.error_setting_mut() {
            setting.data_on_err = r#"{"result": "fallback"}"#.to_string();
        }
        sync_error_body(&mut before);

        let mut after = before.clone();
        after.outputs[0].name = "answer".to_string();
        sync_error_setting(&before, &mut after);

        let data: Value =
            serde_json::from_str(&after.config.error_setting().unwrap().data_on_err).unwrap();
        assert_eq!(data, serde_json::json!({"answer": "fallback"}));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut body = code_body(vec![ViewVariableMeta::new("result", ViewType::String)]);
        enable(&mut body, ErrorProcessType::Default);
        sync_error_body(&mut body);

        let mut again = body.clone();
        sync_error_setting(&body, &mut again);
        assert_eq!(again, body);
    }
}
