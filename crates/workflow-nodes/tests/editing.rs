//! End-to-end editing scenarios over the built-in node types

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use workflow_engine::node_config::{
    ConditionBranch, ConditionConfig, ErrorProcessType, LlmConfig, LoopConfig,
};
use workflow_engine::{
    EngineConfig, EngineError, InputValue, IssueKind, Line, NodeConfig, NodePatch, NodeSpec,
    NodeType, Session, ValueExpression, ViewType, ViewVariableMeta,
};
use workflow_nodes::error_handling::{BRANCH_ERROR_PORT, ERROR_BODY};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session() -> Session {
    init_logging();
    Session::new(
        Arc::new(workflow_nodes::builtin_registry()),
        EngineConfig::default(),
    )
}

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

fn reference(segments: &[&str]) -> ValueExpression {
    ValueExpression::reference(segments.iter().copied())
}

fn start_with(session: &mut Session, outputs: Vec<ViewVariableMeta>) -> String {
    session
        .add_node(NodeSpec::new(NodeType::Start).with_id("Start").with_outputs(outputs))
        .unwrap()
}

#[test]
fn test_start_llm_rename() {
    let mut session = session();
    start_with(
        &mut session,
        vec![ViewVariableMeta::new("query", ViewType::String)],
    );
    let llm = session
        .add_node(
            NodeSpec::new(NodeType::Llm)
                .with_id("LLM")
                .with_inputs(vec![InputValue::new("query", reference(&["Start", "query"]))]),
        )
        .unwrap();

    let resolved = session.resolve(&llm, &path(&["Start", "query"])).unwrap();
    assert_eq!(resolved.name, "query");
    assert_eq!(resolved.ty, ViewType::String);
    assert!(session.validate(&llm).is_empty());

    session
        .change_node_data(
            "Start",
            "outputs",
            NodePatch::Outputs(vec![ViewVariableMeta::new("question", ViewType::String)]),
        )
        .unwrap();

    assert!(session.resolve(&llm, &path(&["Start", "query"])).is_none());
    let issues = session.validate(&llm);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "inputs.query");
    assert_eq!(issues[0].kind, IssueKind::InvalidReference);
}

#[test]
fn test_single_duplicated_issue() {
    let mut session = session();
    let code = session
        .add_node(NodeSpec::new(NodeType::Code).with_outputs(vec![
            ViewVariableMeta::new("x", ViewType::String),
            ViewVariableMeta::new("x", ViewType::Integer),
            ViewVariableMeta::new("obj", ViewType::Object).with_children(vec![
                ViewVariableMeta::new("y", ViewType::String),
                ViewVariableMeta::new("y", ViewType::String),
            ]),
        ]))
        .unwrap();

    let duplicated: Vec<_> = session
        .validate(&code)
        .into_iter()
        .filter(|i| i.kind == IssueKind::Duplicated)
        .collect();
    assert_eq!(duplicated.len(), 1);
    assert_eq!(duplicated[0].path, "outputs.x");
}

#[test]
fn test_nearest_scope_wins() {
    let mut session = session();
    start_with(
        &mut session,
        vec![ViewVariableMeta::new("rows", ViewType::list_of(ViewType::Object))
            .with_children(vec![ViewVariableMeta::new("id", ViewType::Integer)])],
    );
    // a top-level node whose id collides with the loop element local
    session
        .add_node(
            NodeSpec::new(NodeType::Code)
                .with_id("items")
                .with_outputs(vec![ViewVariableMeta::new("id", ViewType::String)]),
        )
        .unwrap();
    let top = session.add_node(NodeSpec::new(NodeType::Code)).unwrap();
    let looped = session
        .add_node(
            NodeSpec::new(NodeType::Loop)
                .with_id("loop")
                .with_inputs(vec![InputValue::new("items", reference(&["Start", "rows"]))]),
        )
        .unwrap();
    let inner = session
        .add_node(NodeSpec::new(NodeType::Code).inside(&looped))
        .unwrap();

    let from_inside = session.resolve(&inner, &path(&["items", "id"])).unwrap();
    assert_eq!(from_inside.ty, ViewType::Integer);
    let from_top = session.resolve(&top, &path(&["items", "id"])).unwrap();
    assert_eq!(from_top.ty, ViewType::String);

    let index = session.resolve(&inner, &path(&["index"])).unwrap();
    assert_eq!(index.ty, ViewType::Integer);
    assert!(session.resolve(&top, &path(&["index"])).is_none());
}

#[test]
fn test_dangling_reference_after_delete() {
    let mut session = session();
    start_with(&mut session, Vec::new());
    let producer = session
        .add_node(
            NodeSpec::new(NodeType::Code)
                .with_id("producer")
                .with_outputs(vec![ViewVariableMeta::new("result", ViewType::String)]),
        )
        .unwrap();
    let consumer = session
        .add_node(
            NodeSpec::new(NodeType::Code)
                .with_id("consumer")
                .with_inputs(vec![InputValue::new("value", reference(&["producer", "result"]))]),
        )
        .unwrap();
    session.add_line(Line::new("Start", &producer)).unwrap();
    session.add_line(Line::new(&producer, &consumer)).unwrap();
    assert!(session.validate(&consumer).is_empty());

    session.remove_node(&producer).unwrap();
    assert!(session.document().lines().iter().all(|l| !l.touches(&producer)));
    assert!(session.document().lines().is_empty());

    let issues = session.validate(&consumer);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "inputs.value");
    assert_eq!(issues[0].kind, IssueKind::InvalidReference);

    // unresolved references are left out of the persisted form
    let dto = session.to_dto();
    let persisted = dto.nodes.iter().find(|n| n.id == consumer).unwrap();
    assert!(persisted.data.inputs.input_parameters.is_empty());
    assert!(session
        .value_expression_to_dto(&consumer, &reference(&["producer", "result"]))
        .is_none());
}

#[test]
fn test_undo_add_node_and_line() {
    let mut session = session();
    start_with(&mut session, Vec::new());
    let before = session.to_dto();

    let code = session.add_node(NodeSpec::new(NodeType::Code)).unwrap();
    session.add_line(Line::new("Start", &code)).unwrap();
    assert_eq!(session.history().undo_len(), 3);

    session.undo().unwrap();
    assert!(session.document().lines().is_empty());
    assert!(session.document().contains(&code));

    session.undo().unwrap();
    assert!(!session.document().contains(&code));
    assert_eq!(session.to_dto(), before);

    session.redo().unwrap();
    session.redo().unwrap();
    assert!(session.document().contains(&code));
    assert_eq!(session.document().lines().len(), 1);
    assert!(!session.history().can_redo());
}

#[test]
fn test_boundaries_cannot_be_removed() {
    let mut session = session();
    start_with(&mut session, Vec::new());
    let err = session.remove_node("Start").unwrap_err();
    assert!(matches!(err, EngineError::NotRemovable { .. }));
    assert!(err.is_structural());
    assert!(session.document().contains("Start"));
}

#[test]
fn test_condition_branches_and_lines() {
    let mut session = session();
    let condition = session.add_node(NodeSpec::new(NodeType::Condition)).unwrap();
    let a = session.add_node(NodeSpec::new(NodeType::Code)).unwrap();
    let b = session.add_node(NodeSpec::new(NodeType::Code)).unwrap();

    let two_branches = NodeConfig::Condition(ConditionConfig {
        branches: vec![ConditionBranch::default(), ConditionBranch::default()],
    });
    session
        .change_node_data(&condition, "inputs.branches", NodePatch::Config(two_branches))
        .unwrap();

    let to_a = session
        .add_line(Line::new(&condition, &a).from_port("true_1"))
        .unwrap();
    let to_b = session
        .add_line(Line::new(&condition, &b).from_port("false"))
        .unwrap();
    assert!(session
        .add_line(Line::new(&condition, &b).from_port("true_2"))
        .is_err());

    // dropping the second branch prunes the line leaving its port
    let one_branch = NodeConfig::Condition(ConditionConfig {
        branches: vec![ConditionBranch::default()],
    });
    session
        .change_node_data(&condition, "inputs.branches", NodePatch::Config(one_branch))
        .unwrap();
    assert!(session.document().line(&to_a).is_none());

    // the last outgoing line stays
    assert!(matches!(
        session.remove_line(&to_b),
        Err(EngineError::LineNotRemovable(_))
    ));

    // one undo restores the branch and its line together
    session.undo().unwrap();
    assert!(session.document().line(&to_a).is_some());
    assert!(session.remove_line(&to_b).unwrap());

    let issues = session.validate(&condition);
    assert_eq!(
        issues
            .iter()
            .filter(|i| i.kind == IssueKind::InvalidConfig)
            .count(),
        2
    );
}

#[test]
fn test_error_branch_port_follows_setting() {
    let mut session = session();
    let llm = session.add_node(NodeSpec::new(NodeType::Llm)).unwrap();
    let handler = session.add_node(NodeSpec::new(NodeType::Code)).unwrap();

    let mut config = LlmConfig::default();
    config.error.enabled = true;
    config.error.process_type = ErrorProcessType::ExceptionBranch;
    session
        .change_node_data(&llm, "inputs.settingOnError", NodePatch::Config(NodeConfig::Llm(config.clone())))
        .unwrap();
    let node = session.document().node(&llm).unwrap();
    assert!(node.outputs().iter().any(|o| o.name == ERROR_BODY));
    assert!(session
        .resolve(&handler, &path(&[llm.as_str(), ERROR_BODY, "errorMessage"]))
        .is_some());

    let line = session
        .add_line(Line::new(&llm, &handler).from_port(BRANCH_ERROR_PORT))
        .unwrap();

    config.error.enabled = false;
    session
        .change_node_data(&llm, "inputs.settingOnError", NodePatch::Config(NodeConfig::Llm(config)))
        .unwrap();
    assert!(session.document().line(&line).is_none());
    let node = session.document().node(&llm).unwrap();
    assert!(node.outputs().iter().all(|o| o.name != ERROR_BODY));
}

#[test]
fn test_loop_only_nodes_are_placed_in_loops() {
    let mut session = session();
    let stray = session.add_node(NodeSpec::new(NodeType::Break)).unwrap();
    let looped = session.add_node(NodeSpec::new(NodeType::Loop)).unwrap();
    let inner = session
        .add_node(NodeSpec::new(NodeType::Continue).inside(&looped))
        .unwrap();
    let nested = session
        .add_node(NodeSpec::new(NodeType::Batch).inside(&looped))
        .unwrap();

    let issues = session.validate_document();
    let misplaced: Vec<_> = issues
        .iter()
        .filter(|i| i.kind == IssueKind::Misplaced)
        .collect();
    assert_eq!(misplaced.len(), 1);
    assert_eq!(misplaced[0].node_id.as_deref(), Some(stray.as_str()));
    assert!(session.issues(&inner).is_empty());
    assert!(session
        .issues(&nested)
        .iter()
        .any(|i| i.kind == IssueKind::NestedComposite));
}

#[test]
fn test_loop_variables() {
    let mut session = session();
    let config = LoopConfig {
        variables: vec![InputValue::new("counter", ValueExpression::literal(0))],
        ..Default::default()
    };
    let looped = session
        .add_node(NodeSpec::new(NodeType::Loop).with_config(NodeConfig::Loop(config)))
        .unwrap();
    let setter = session
        .add_node(
            NodeSpec::new(NodeType::SetVariable)
                .inside(&looped)
                .with_inputs(vec![
                    InputValue::new("counter", ValueExpression::literal(1)),
                    InputValue::new("missing", ValueExpression::literal(1)),
                ]),
        )
        .unwrap();

    let counter = session.resolve(&setter, &path(&["counter"])).unwrap();
    assert_eq!(counter.ty, ViewType::Integer);

    let issues = session.validate(&setter);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path, "inputs.missing");
}

#[test]
fn test_subscription_follows_rename() {
    let mut session = session();
    start_with(
        &mut session,
        vec![ViewVariableMeta::new("query", ViewType::String).with_key("q")],
    );
    let llm = session.add_node(NodeSpec::new(NodeType::Llm)).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session
        .on_variable_change(&llm, path(&["Start", "query"]), move |change| {
            sink.borrow_mut().push(change.clone());
        })
        .unwrap();

    session
        .change_node_data(
            "Start",
            "outputs",
            NodePatch::Outputs(vec![ViewVariableMeta::new("query", ViewType::Integer).with_key("q")]),
        )
        .unwrap();
    assert_eq!(seen.borrow().len(), 1);

    session.remove_node(&llm).unwrap();
    session
        .change_node_data(
            "Start",
            "outputs",
            NodePatch::Outputs(vec![ViewVariableMeta::new("query", ViewType::String).with_key("q")]),
        )
        .unwrap();
    assert_eq!(seen.borrow().len(), 1);
}
