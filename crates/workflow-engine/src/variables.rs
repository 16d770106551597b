//! Variable service: scope chains, key-path resolution and subscriptions
//!
//! A reference is a key path such as `["llm_1", "output"]` or
//! `["item", "name"]`. Its first segment is matched against the names of the
//! scope roots visible from the referencing node, nearest first:
//!
//! 1. locals of the enclosing container (`index`, array elements, loop variables)
//! 2. outputs of sibling nodes in the same canvas
//! 3. the same two tiers for every outer container level
//! 4. global variables (`global_variable_app`, `_user`, `_system`)
//!
//! The first match wins; later segments descend into `children` by name.
//! Resolution results are memoized per document version.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::config::ForwardReferencePolicy;
use crate::document::{Document, GlobalScope};
use crate::node_config::NodeType;
use crate::registry::NodeRegistry;
use crate::types::{
    view_meta_to_dto_meta, view_to_dto, DtoType, NodeId, SchemaDto, VariableMetaDto, ViewType,
    ViewVariableMeta,
};
use crate::value::{
    literal_dto_type, BlockInputValueDto, InputValue, InputValueDto, RefContentDto, RefSource,
    ValueExpression, ValueExpressionDto, ValueKind,
};

/// Kind of a scope root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootKind {
    /// A single container local, addressed by its own name
    Local { container_id: NodeId },
    /// All locals of a container, addressed by the container id
    LocalBlock { container_id: NodeId },
    /// Outputs of a node, addressed by the node id
    NodeOutput { node_id: NodeId },
    Global { scope: GlobalScope },
}

/// A named entry point of the scope chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeRoot {
    pub name: String,
    pub kind: RootKind,
    /// For `Local` roots the local itself, otherwise the fields below the root
    pub fields: Vec<ViewVariableMeta>,
}

/// A successfully resolved reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVariable {
    pub kind: RootKind,
    pub key_path: Vec<String>,
    pub meta: ViewVariableMeta,
}

/// Anything that can resolve a key path from the point of view of a node
pub trait VariableLookup {
    fn lookup(&self, node_id: &str, key_path: &[String]) -> Option<ResolvedVariable>;
}

#[derive(Default)]
struct Memo {
    version: u64,
    entries: HashMap<(NodeId, Vec<String>), Option<ResolvedVariable>>,
}

/// Memoizing key-path resolver
pub struct VariableResolver {
    policy: ForwardReferencePolicy,
    memo: RefCell<Memo>,
    hits: Cell<u64>,
}

impl VariableResolver {
    pub fn new(policy: ForwardReferencePolicy) -> Self {
        Self {
            policy,
            memo: RefCell::new(Memo::default()),
            hits: Cell::new(0),
        }
    }

    pub fn policy(&self) -> ForwardReferencePolicy {
        self.policy
    }

    /// Number of lookups answered from the memo
    pub fn memo_hits(&self) -> u64 {
        self.hits.get()
    }

    /// Resolve a key path as seen from `node_id`; `None` means the reference is invalid
    pub fn resolve(
        &self,
        document: &Document,
        registry: &NodeRegistry,
        node_id: &str,
        key_path: &[String],
    ) -> Option<ResolvedVariable> {
        let key = (node_id.to_string(), key_path.to_vec());
        {
            let mut memo = self.memo.borrow_mut();
            if memo.version != document.version() {
                memo.entries.clear();
                memo.version = document.version();
            } else if let Some(hit) = memo.entries.get(&key) {
                self.hits.set(self.hits.get() + 1);
                return hit.clone();
            }
        }

        // Computing may recurse into container scopes; no memo borrow is held here
        let resolved = self.compute(document, registry, node_id, key_path);
        if resolved.is_none() {
            log::debug!("Unresolved reference {:?} from node '{}'", key_path, node_id);
        }

        let mut memo = self.memo.borrow_mut();
        if memo.version == document.version() {
            memo.entries.insert(key, resolved.clone());
        }
        resolved
    }

    fn compute(
        &self,
        document: &Document,
        registry: &NodeRegistry,
        node_id: &str,
        key_path: &[String],
    ) -> Option<ResolvedVariable> {
        let (first, rest) = key_path.split_first()?;
        let root = self
            .scope_chain(document, registry, node_id)
            .into_iter()
            .find(|root| &root.name == first)?;

        let meta = match &root.kind {
            RootKind::Local { .. } => descend(root.fields.first()?, rest)?,
            _ => {
                let (field, deeper) = rest.split_first()?;
                let start = root.fields.iter().find(|f| &f.name == field)?;
                descend(start, deeper)?
            }
        };

        Some(ResolvedVariable {
            kind: root.kind,
            key_path: key_path.to_vec(),
            meta,
        })
    }

    /// Every scope root visible from a node, nearest first
    pub fn scope_chain(
        &self,
        document: &Document,
        registry: &NodeRegistry,
        node_id: &str,
    ) -> Vec<ScopeRoot> {
        let mut roots = Vec::new();
        let Some(mut current) = document.node(node_id) else {
            return roots;
        };

        loop {
            let parent = current
                .parent_id
                .as_deref()
                .and_then(|id| document.node(id));

            if let Some(container) = parent {
                let locals = self.container_locals(document, registry, &container.id);
                for local in &locals {
                    roots.push(ScopeRoot {
                        name: local.name.clone(),
                        kind: RootKind::Local {
                            container_id: container.id.clone(),
                        },
                        fields: vec![local.clone()],
                    });
                }
                if !locals.is_empty() {
                    roots.push(ScopeRoot {
                        name: container.id.clone(),
                        kind: RootKind::LocalBlock {
                            container_id: container.id.clone(),
                        },
                        fields: locals,
                    });
                }
            }

            let upstream = match self.policy {
                ForwardReferencePolicy::Permissive => None,
                ForwardReferencePolicy::Upstream => Some(document.upstream_nodes(&current.id)),
            };
            for sibling in document.nodes_in_canvas(current.parent_id.as_deref()) {
                if sibling.id == current.id || sibling.node_type() == NodeType::Comment {
                    continue;
                }
                if let Some(visible) = &upstream {
                    if !visible.contains(&sibling.id) {
                        continue;
                    }
                }
                roots.push(ScopeRoot {
                    name: sibling.id.clone(),
                    kind: RootKind::NodeOutput {
                        node_id: sibling.id.clone(),
                    },
                    fields: sibling.outputs().to_vec(),
                });
            }

            match parent {
                Some(container) => current = container,
                None => break,
            }
        }

        for scope in GlobalScope::ALL {
            roots.push(ScopeRoot {
                name: scope.root_name().to_string(),
                kind: RootKind::Global { scope },
                fields: document.globals(scope).to_vec(),
            });
        }
        roots
    }

    /// Locals a container contributes to its sub-canvas
    pub fn container_locals(
        &self,
        document: &Document,
        registry: &NodeRegistry,
        container_id: &str,
    ) -> Vec<ViewVariableMeta> {
        let Some(container) = document.node(container_id) else {
            return Vec::new();
        };
        let Some(locals) = registry.get(container.node_type()).and_then(|d| d.locals) else {
            return Vec::new();
        };
        let scope = Scope {
            document,
            registry,
            resolver: self,
        };
        locals(container, &scope)
    }
}

/// Follow `path` through `children`. Passing through a list wraps the result in that list.
fn descend(start: &ViewVariableMeta, path: &[String]) -> Option<ViewVariableMeta> {
    let mut current = start.clone();
    let mut list_depth = 0;
    for segment in path {
        list_depth += list_layers(&current.ty);
        current = current.child(segment)?.clone();
    }
    for _ in 0..list_depth {
        current.ty = ViewType::list_of(current.ty);
    }
    Some(current)
}

fn list_layers(ty: &ViewType) -> usize {
    match ty {
        ViewType::List(item) => 1 + list_layers(item),
        _ => 0,
    }
}

/// A [`VariableLookup`] bound to one document state
pub struct Scope<'a> {
    pub document: &'a Document,
    pub registry: &'a NodeRegistry,
    pub resolver: &'a VariableResolver,
}

impl VariableLookup for Scope<'_> {
    fn lookup(&self, node_id: &str, key_path: &[String]) -> Option<ResolvedVariable> {
        self.resolver
            .resolve(self.document, self.registry, node_id, key_path)
    }
}

/// Opaque handle returned by [`Subscriptions::subscribe`]
pub type SubscriptionId = u64;

/// Delivered to a subscriber when its variable changed key or type
#[derive(Debug, Clone, PartialEq)]
pub struct VariableChange {
    pub subscription: SubscriptionId,
    pub node_id: NodeId,
    pub key_path: Vec<String>,
    pub previous: Option<ViewVariableMeta>,
    pub current: Option<ViewVariableMeta>,
}

pub type ChangeCallback = Box<dyn FnMut(&VariableChange)>;

struct Subscription {
    node_id: NodeId,
    key_path: Vec<String>,
    last: Option<ViewVariableMeta>,
    callback: ChangeCallback,
}

/// Observers of resolved variables, owned by the node that registered them
#[derive(Default)]
pub struct Subscriptions {
    entries: HashMap<SubscriptionId, Subscription>,
    by_node: HashMap<NodeId, HashSet<SubscriptionId>>,
    next_id: SubscriptionId,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a callback; `current` is the meta the path resolves to right now
    pub fn subscribe(
        &mut self,
        node_id: &str,
        key_path: Vec<String>,
        current: Option<ViewVariableMeta>,
        callback: ChangeCallback,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(
            id,
            Subscription {
                node_id: node_id.to_string(),
                key_path,
                last: current,
                callback,
            },
        );
        self.by_node.entry(node_id.to_string()).or_default().insert(id);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(sub) = self.entries.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.by_node.get_mut(&sub.node_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_node.remove(&sub.node_id);
            }
        }
        true
    }

    /// Drop every subscription owned by a node
    pub fn dispose_node(&mut self, node_id: &str) -> usize {
        let Some(ids) = self.by_node.remove(node_id) else {
            return 0;
        };
        for id in &ids {
            self.entries.remove(id);
        }
        ids.len()
    }

    /// Re-resolve every subscription and fire callbacks whose key or type changed
    pub fn notify(&mut self, lookup: &dyn VariableLookup) -> usize {
        let mut fired = 0;
        let mut ids: Vec<SubscriptionId> = self.entries.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(sub) = self.entries.get_mut(&id) else {
                continue;
            };
            let current = lookup.lookup(&sub.node_id, &sub.key_path).map(|r| r.meta);
            if same_identity(sub.last.as_ref(), current.as_ref()) {
                sub.last = current;
                continue;
            }

            let change = VariableChange {
                subscription: id,
                node_id: sub.node_id.clone(),
                key_path: sub.key_path.clone(),
                previous: sub.last.take(),
                current: current.clone(),
            };
            sub.last = current;
            (sub.callback)(&change);
            fired += 1;
        }
        fired
    }
}

fn same_identity(a: Option<&ViewVariableMeta>, b: Option<&ViewVariableMeta>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.key == b.key && a.ty == b.ty,
        _ => false,
    }
}

/// Resolver and subscriptions of one session
pub struct VariableService {
    resolver: VariableResolver,
    subscriptions: Subscriptions,
}

impl VariableService {
    pub fn new(policy: ForwardReferencePolicy) -> Self {
        Self {
            resolver: VariableResolver::new(policy),
            subscriptions: Subscriptions::new(),
        }
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Bind the resolver to a document state
    pub fn scope<'a>(&'a self, document: &'a Document, registry: &'a NodeRegistry) -> Scope<'a> {
        Scope {
            document,
            registry,
            resolver: &self.resolver,
        }
    }

    pub fn resolve(
        &self,
        document: &Document,
        registry: &NodeRegistry,
        node_id: &str,
        key_path: &[String],
    ) -> Option<ResolvedVariable> {
        self.resolver.resolve(document, registry, node_id, key_path)
    }

    pub fn on_variable_change(
        &mut self,
        document: &Document,
        registry: &NodeRegistry,
        node_id: &str,
        key_path: Vec<String>,
        callback: ChangeCallback,
    ) -> SubscriptionId {
        let current = self
            .resolver
            .resolve(document, registry, node_id, &key_path)
            .map(|r| r.meta);
        self.subscriptions.subscribe(node_id, key_path, current, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    pub fn dispose_node(&mut self, node_id: &str) -> usize {
        self.subscriptions.dispose_node(node_id)
    }

    pub fn notify(&mut self, document: &Document, registry: &NodeRegistry) -> usize {
        let scope = Scope {
            document,
            registry,
            resolver: &self.resolver,
        };
        self.subscriptions.notify(&scope)
    }
}

// --- expression converters ---

fn literal_schema(content: &serde_json::Value) -> Option<SchemaDto> {
    let items = content.as_array()?;
    let item_type = items.first().map(literal_dto_type).unwrap_or(DtoType::String);
    // nested lists are not inferred from literals
    let item_type = if item_type == DtoType::List {
        DtoType::String
    } else {
        item_type
    };
    Some(SchemaDto::Item(Box::new(VariableMetaDto {
        name: String::new(),
        dto_type: item_type,
        assist_type: None,
        schema: None,
        required: false,
        description: None,
        read_only: false,
        default_value: None,
    })))
}

/// Convert an expression to its wire form. Unresolvable references yield `None`.
pub fn value_expression_to_dto(
    node_id: &str,
    expression: &ValueExpression,
    lookup: &dyn VariableLookup,
) -> Option<ValueExpressionDto> {
    match expression {
        ValueExpression::Literal { content } => Some(ValueExpressionDto {
            dto_type: literal_dto_type(content),
            assist_type: None,
            schema: literal_schema(content),
            value: BlockInputValueDto {
                kind: ValueKind::Literal,
                content: content.clone(),
            },
        }),
        ValueExpression::Ref { key_path } => {
            let resolved = lookup.lookup(node_id, key_path)?;
            let (first, rest) = key_path.split_first()?;

            let content = match &resolved.kind {
                RootKind::NodeOutput { node_id } => RefContentDto {
                    source: RefSource::BlockOutput,
                    block_id: node_id.clone(),
                    name: rest.join("."),
                },
                RootKind::Global { scope } => RefContentDto {
                    source: match scope {
                        GlobalScope::App => RefSource::GlobalApp,
                        GlobalScope::User => RefSource::GlobalUser,
                        GlobalScope::System => RefSource::GlobalSystem,
                    },
                    block_id: String::new(),
                    name: rest.join("."),
                },
                RootKind::Local { container_id } => RefContentDto {
                    source: RefSource::LoopLocal,
                    block_id: container_id.clone(),
                    name: std::iter::once(first.as_str())
                        .chain(rest.iter().map(String::as_str))
                        .collect::<Vec<_>>()
                        .join("."),
                },
                // container-qualified locals persist as outputs of the container
                RootKind::LocalBlock { container_id } => RefContentDto {
                    source: RefSource::BlockOutput,
                    block_id: container_id.clone(),
                    name: rest.join("."),
                },
            };

            let type_dto = view_to_dto(&resolved.meta.ty);
            Some(ValueExpressionDto {
                dto_type: type_dto.dto_type,
                assist_type: type_dto.assist_type,
                schema: view_meta_to_dto_meta(&resolved.meta).schema,
                value: BlockInputValueDto {
                    kind: ValueKind::Ref,
                    content: serde_json::to_value(content).ok()?,
                },
            })
        }
    }
}

/// Convert a wire expression back to the editor form. Malformed references yield `None`.
pub fn value_expression_to_vo(dto: &ValueExpressionDto) -> Option<ValueExpression> {
    match dto.value.kind {
        ValueKind::Literal => Some(ValueExpression::Literal {
            content: dto.value.content.clone(),
        }),
        ValueKind::Ref => {
            let content: RefContentDto = serde_json::from_value(dto.value.content.clone()).ok()?;
            let segments = content
                .name
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let head = match content.source {
                RefSource::BlockOutput => Some(content.block_id.clone()),
                RefSource::GlobalApp => Some(GlobalScope::App.root_name().to_string()),
                RefSource::GlobalUser => Some(GlobalScope::User.root_name().to_string()),
                RefSource::GlobalSystem => Some(GlobalScope::System.root_name().to_string()),
                RefSource::LoopLocal => None,
            };

            let key_path: Vec<String> = head.into_iter().chain(segments).collect();
            if key_path.is_empty() {
                return None;
            }
            Some(ValueExpression::Ref { key_path })
        }
    }
}

/// Convert input bindings to wire form, omitting those that fail to convert
pub fn inputs_to_dto(
    node_id: &str,
    inputs: &[InputValue],
    lookup: &dyn VariableLookup,
) -> Vec<InputValueDto> {
    inputs
        .iter()
        .filter_map(|input| {
            let converted = value_expression_to_dto(node_id, &input.input, lookup);
            if converted.is_none() {
                log::debug!("Omitting input '{}' of node '{}': unresolved", input.name, node_id);
            }
            Some(InputValueDto {
                name: input.name.clone(),
                input: converted?,
            })
        })
        .collect()
}

/// Convert wire input bindings to editor form, omitting those that fail to convert
pub fn inputs_to_vo(inputs: &[InputValueDto]) -> Vec<InputValue> {
    inputs
        .iter()
        .filter_map(|dto| {
            Some(InputValue {
                name: dto.name.clone(),
                input: value_expression_to_vo(&dto.input)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Line, NodeSpec};
    use crate::test_support::{test_registry, vars};
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;

    fn add(doc: &mut Document, registry: &NodeRegistry, spec: NodeSpec) {
        let node = doc.create_node(spec, registry).unwrap();
        doc.attach_subtree(crate::document::NodeSubtree {
            nodes: vec![node],
            lines: Vec::new(),
            canvas_index: usize::MAX,
        })
        .unwrap();
    }

    fn outputs(names: &[(&str, ViewType)]) -> Vec<ViewVariableMeta> {
        names
            .iter()
            .map(|(n, t)| ViewVariableMeta::new(*n, t.clone()))
            .collect()
    }

    #[test]
    fn test_resolve_sibling_output() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(outputs(&[("out", ViewType::String)])));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));

        let resolver = VariableResolver::new(ForwardReferencePolicy::Permissive);
        let hit = resolver.resolve(&doc, &registry, "b", &vars(&["a", "out"])).unwrap();
        assert_eq!(hit.meta.ty, ViewType::String);
        assert_eq!(hit.kind, RootKind::NodeOutput { node_id: "a".into() });

        assert!(resolver.resolve(&doc, &registry, "b", &vars(&["a"])).is_none());
        assert!(resolver.resolve(&doc, &registry, "b", &vars(&["a", "missing"])).is_none());
        assert!(resolver.resolve(&doc, &registry, "a", &vars(&["a", "out"])).is_none());
    }

    #[test]
    fn test_list_of_object_drilldown() {
        let registry = test_registry();
        let mut doc = Document::new();
        let rows = ViewVariableMeta::new("rows", ViewType::list_of(ViewType::Object))
            .with_children(vec![ViewVariableMeta::new("id", ViewType::Integer)]);
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(vec![rows]));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));

        let resolver = VariableResolver::new(ForwardReferencePolicy::Permissive);
        let hit = resolver.resolve(&doc, &registry, "b", &vars(&["a", "rows", "id"])).unwrap();
        assert_eq!(hit.meta.ty, ViewType::list_of(ViewType::Integer));
    }

    #[test]
    fn test_memo_invalidated_by_version() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(outputs(&[("out", ViewType::String)])));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));

        let resolver = VariableResolver::new(ForwardReferencePolicy::Permissive);
        let path = vars(&["a", "out"]);
        assert!(resolver.resolve(&doc, &registry, "b", &path).is_some());
        assert!(resolver.resolve(&doc, &registry, "b", &path).is_some());
        assert_eq!(resolver.memo_hits(), 1);

        let mut body = doc.node("a").unwrap().body.clone();
        body.outputs[0].ty = ViewType::Integer;
        doc.replace_body("a", body).unwrap();
        let hit = resolver.resolve(&doc, &registry, "b", &path).unwrap();
        assert_eq!(hit.meta.ty, ViewType::Integer);
    }

    #[test]
    fn test_upstream_policy_hides_unconnected_siblings() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(outputs(&[("out", ViewType::String)])));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));

        let resolver = VariableResolver::new(ForwardReferencePolicy::Upstream);
        let path = vars(&["a", "out"]);
        assert!(resolver.resolve(&doc, &registry, "b", &path).is_none());

        doc.insert_line(Line::new("a", "b"), None).unwrap();
        assert!(resolver.resolve(&doc, &registry, "b", &path).is_some());
    }

    #[test]
    fn test_globals_resolve_last() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));
        doc.set_globals(GlobalScope::App, outputs(&[("region", ViewType::String)]));

        let resolver = VariableResolver::new(ForwardReferencePolicy::Permissive);
        let hit = resolver
            .resolve(&doc, &registry, "b", &vars(&["global_variable_app", "region"]))
            .unwrap();
        assert_eq!(hit.kind, RootKind::Global { scope: GlobalScope::App });

        let chain = resolver.scope_chain(&doc, &registry, "b");
        assert_eq!(chain.last().unwrap().name, "global_variable_system");
    }

    #[test]
    fn test_subscription_fires_on_type_change_and_disposes() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(outputs(&[("out", ViewType::String)])));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));

        let mut service = VariableService::new(ForwardReferencePolicy::Permissive);
        let seen: Rc<StdRefCell<Vec<VariableChange>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let id = service.on_variable_change(
            &doc,
            &registry,
            "b",
            vars(&["a", "out"]),
            Box::new(move |change| sink.borrow_mut().push(change.clone())),
        );

        // description change is not an identity change
        let mut body = doc.node("a").unwrap().body.clone();
        body.outputs[0].description = Some("text".into());
        doc.replace_body("a", body.clone()).unwrap();
        assert_eq!(service.notify(&doc, &registry), 0);

        body.outputs[0].ty = ViewType::Boolean;
        doc.replace_body("a", body).unwrap();
        assert_eq!(service.notify(&doc, &registry), 1);
        assert_eq!(seen.borrow()[0].subscription, id);
        assert_eq!(seen.borrow()[0].current.as_ref().unwrap().ty, ViewType::Boolean);

        assert_eq!(service.dispose_node("b"), 1);
        assert!(service.subscriptions().is_empty());
        assert!(!service.unsubscribe(id));
    }

    #[test]
    fn test_ref_conversion_fails_closed() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));
        let service = VariableService::new(ForwardReferencePolicy::Permissive);
        let scope = service.scope(&doc, &registry);

        let dangling = ValueExpression::reference(["ghost", "out"]);
        assert!(value_expression_to_dto("b", &dangling, &scope).is_none());

        let inputs = vec![
            InputValue::new("keep", ValueExpression::literal("hi")),
            InputValue::new("drop", dangling),
        ];
        let dtos = inputs_to_dto("b", &inputs, &scope);
        assert_eq!(dtos.len(), 1);
        assert_eq!(dtos[0].name, "keep");
    }

    #[test]
    fn test_ref_dto_round_trip() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("a").with_outputs(vec![
            ViewVariableMeta::new("obj", ViewType::Object)
                .with_children(vec![ViewVariableMeta::new("x", ViewType::Number)]),
        ]));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("b"));
        let service = VariableService::new(ForwardReferencePolicy::Permissive);
        let scope = service.scope(&doc, &registry);

        let expr = ValueExpression::reference(["a", "obj", "x"]);
        let dto = value_expression_to_dto("b", &expr, &scope).unwrap();
        assert_eq!(dto.dto_type, DtoType::Float);
        assert_eq!(
            dto.value.content,
            serde_json::json!({"source": "block-output", "blockID": "a", "name": "obj.x"})
        );
        assert_eq!(value_expression_to_vo(&dto).unwrap(), expr);
    }

    #[test]
    fn test_local_refs_keep_their_shape() {
        let registry = test_registry();
        let mut doc = Document::new();
        add(&mut doc, &registry, NodeSpec::new(NodeType::Loop).with_id("loop"));
        add(&mut doc, &registry, NodeSpec::new(NodeType::Code).with_id("c").inside("loop"));
        let service = VariableService::new(ForwardReferencePolicy::Permissive);
        let scope = service.scope(&doc, &registry);

        let bare = ValueExpression::reference(["index"]);
        let dto = value_expression_to_dto("c", &bare, &scope).unwrap();
        assert_eq!(dto.value.content["source"], "loop-local");
        assert_eq!(value_expression_to_vo(&dto).unwrap(), bare);

        let qualified = ValueExpression::reference(["loop", "index"]);
        let dto = value_expression_to_dto("c", &qualified, &scope).unwrap();
        assert_eq!(
            dto.value.content,
            serde_json::json!({"source": "block-output", "blockID": "loop", "name": "index"})
        );
        assert_eq!(value_expression_to_vo(&dto).unwrap(), qualified);
    }

    #[test]
    fn test_malformed_ref_dto_is_none() {
        let dto = ValueExpressionDto {
            dto_type: DtoType::String,
            assist_type: None,
            schema: None,
            value: BlockInputValueDto {
                kind: ValueKind::Ref,
                content: serde_json::json!({"unexpected": true}),
            },
        };
        assert!(value_expression_to_vo(&dto).is_none());
    }
}
