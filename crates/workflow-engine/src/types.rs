//! Core type model for workflow variables
//!
//! Two representations of a variable type exist side by side:
//!
//! - [`ViewType`]: the closed, editor-level enumeration used everywhere inside
//!   the engine.
//! - [`TypeDto`]: the wire-level descriptor (`{type, assistType, schema}`)
//!   used by the persisted graph.
//!
//! [`dto_to_view`] and [`view_to_dto`] convert between them. The mapping is
//! total over well-formed input and `dto_to_view(&view_to_dto(t)) == t` for
//! every `t`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for a line (edge)
pub type LineId = String;

/// Unique identifier for a port
pub type PortId = String;

/// Generate a fresh stable key for a variable meta
pub fn new_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// File flavours carried by file-typed variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Default,
    Image,
    Doc,
    Code,
    Ppt,
    Txt,
    Excel,
    Audio,
    Zip,
    Video,
    Svg,
    Voice,
}

impl FileKind {
    fn label(&self) -> &'static str {
        match self {
            FileKind::Default => "File",
            FileKind::Image => "Image",
            FileKind::Doc => "Doc",
            FileKind::Code => "Code",
            FileKind::Ppt => "PPT",
            FileKind::Txt => "Txt",
            FileKind::Excel => "Excel",
            FileKind::Audio => "Audio",
            FileKind::Zip => "Zip",
            FileKind::Video => "Video",
            FileKind::Svg => "Svg",
            FileKind::Voice => "Voice",
        }
    }
}

/// Editor-level variable type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewType {
    String,
    Integer,
    Number,
    Boolean,
    Time,
    Object,
    File(FileKind),
    List(Box<ViewType>),
}

impl ViewType {
    /// Wrap a type into a list of that type
    pub fn list_of(item: ViewType) -> Self {
        ViewType::List(Box::new(item))
    }

    /// The element type of a list, `None` for non-list types
    pub fn element(&self) -> Option<&ViewType> {
        match self {
            ViewType::List(item) => Some(item),
            _ => None,
        }
    }

    /// The innermost non-list type
    pub fn innermost(&self) -> &ViewType {
        match self {
            ViewType::List(item) => item.innermost(),
            other => other,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ViewType::List(_))
    }

    /// Whether metas of this type carry `children` (objects and lists of objects)
    pub fn has_children(&self) -> bool {
        matches!(self.innermost(), ViewType::Object)
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewType::String => write!(f, "String"),
            ViewType::Integer => write!(f, "Integer"),
            ViewType::Number => write!(f, "Number"),
            ViewType::Boolean => write!(f, "Boolean"),
            ViewType::Time => write!(f, "Time"),
            ViewType::Object => write!(f, "Object"),
            ViewType::File(kind) => write!(f, "{}", kind.label()),
            ViewType::List(item) => write!(f, "Array<{}>", item),
        }
    }
}

/// Whether a literal default of this type must be parsed as JSON
pub fn is_json_input_type(t: &ViewType) -> bool {
    matches!(t, ViewType::Object | ViewType::List(_))
}

/// Wire-level primitive type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtoType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    List,
}

/// Wire-level refinement of string-typed values (file flavours, time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistType {
    File(FileKind),
    Time,
}

impl AssistType {
    /// Numeric code used on the wire
    pub fn code(&self) -> i64 {
        match self {
            AssistType::File(FileKind::Default) => 1,
            AssistType::File(FileKind::Image) => 2,
            AssistType::File(FileKind::Doc) => 3,
            AssistType::File(FileKind::Code) => 4,
            AssistType::File(FileKind::Ppt) => 5,
            AssistType::File(FileKind::Txt) => 6,
            AssistType::File(FileKind::Excel) => 7,
            AssistType::File(FileKind::Audio) => 8,
            AssistType::File(FileKind::Zip) => 9,
            AssistType::File(FileKind::Video) => 10,
            AssistType::File(FileKind::Svg) => 11,
            AssistType::File(FileKind::Voice) => 12,
            AssistType::Time => 10000,
        }
    }

    /// Decode a wire code. `0` means "not set".
    pub fn from_code(code: i64) -> Result<Option<Self>> {
        let assist = match code {
            0 => return Ok(None),
            1 => AssistType::File(FileKind::Default),
            2 => AssistType::File(FileKind::Image),
            3 => AssistType::File(FileKind::Doc),
            4 => AssistType::File(FileKind::Code),
            5 => AssistType::File(FileKind::Ppt),
            6 => AssistType::File(FileKind::Txt),
            7 => AssistType::File(FileKind::Excel),
            8 => AssistType::File(FileKind::Audio),
            9 => AssistType::File(FileKind::Zip),
            10 => AssistType::File(FileKind::Video),
            11 => AssistType::File(FileKind::Svg),
            12 => AssistType::File(FileKind::Voice),
            10000 => AssistType::Time,
            other => return Err(EngineError::UnknownTypeTag(format!("assistType {}", other))),
        };
        Ok(Some(assist))
    }

    fn view_type(&self) -> ViewType {
        match self {
            AssistType::File(kind) => ViewType::File(*kind),
            AssistType::Time => ViewType::Time,
        }
    }
}

/// Serde adapter for `Option<AssistType>` encoded as a wire code
pub(crate) mod assist_code {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AssistType;

    pub fn serialize<S: Serializer>(value: &Option<AssistType>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(assist) => s.serialize_i64(assist.code()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AssistType>, D::Error> {
        match Option::<i64>::deserialize(d)? {
            Some(code) => AssistType::from_code(code).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Wire-level type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDto {
    #[serde(rename = "type")]
    pub dto_type: DtoType,
    #[serde(default, with = "assist_code", skip_serializing_if = "Option::is_none")]
    pub assist_type: Option<AssistType>,
    /// Item descriptor, present only for lists
    #[serde(default, rename = "schema", skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<TypeDto>>,
}

impl TypeDto {
    pub fn new(dto_type: DtoType) -> Self {
        Self {
            dto_type,
            assist_type: None,
            item: None,
        }
    }
}

/// Convert a wire type descriptor to the editor type
pub fn dto_to_view(dto: &TypeDto) -> Result<ViewType> {
    if dto.dto_type != DtoType::List && dto.item.is_some() {
        return Err(EngineError::UnknownTypeTag(format!(
            "{:?} carries an item schema",
            dto.dto_type
        )));
    }
    if dto.dto_type != DtoType::String && dto.assist_type.is_some() {
        return Err(EngineError::UnknownTypeTag(format!(
            "{:?} carries an assistType",
            dto.dto_type
        )));
    }

    let view = match dto.dto_type {
        DtoType::String => match &dto.assist_type {
            Some(assist) => assist.view_type(),
            None => ViewType::String,
        },
        DtoType::Integer => ViewType::Integer,
        DtoType::Float => ViewType::Number,
        DtoType::Boolean => ViewType::Boolean,
        DtoType::Object => ViewType::Object,
        DtoType::List => {
            let item = dto
                .item
                .as_deref()
                .ok_or_else(|| EngineError::UnknownTypeTag("list without item type".to_string()))?;
            ViewType::list_of(dto_to_view(item)?)
        }
    };
    Ok(view)
}

/// Convert an editor type to its wire descriptor
pub fn view_to_dto(view: &ViewType) -> TypeDto {
    match view {
        ViewType::String => TypeDto::new(DtoType::String),
        ViewType::Integer => TypeDto::new(DtoType::Integer),
        ViewType::Number => TypeDto::new(DtoType::Float),
        ViewType::Boolean => TypeDto::new(DtoType::Boolean),
        ViewType::Object => TypeDto::new(DtoType::Object),
        ViewType::Time => TypeDto {
            assist_type: Some(AssistType::Time),
            ..TypeDto::new(DtoType::String)
        },
        ViewType::File(kind) => TypeDto {
            assist_type: Some(AssistType::File(*kind)),
            ..TypeDto::new(DtoType::String)
        },
        ViewType::List(item) => TypeDto {
            item: Some(Box::new(view_to_dto(item))),
            ..TypeDto::new(DtoType::List)
        },
    }
}

/// Editor-level description of a variable (a node output field, a loop local, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewVariableMeta {
    /// Stable identity, never shown to users
    pub key: String,
    /// Display and reference name, unique among siblings
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ViewType,
    #[serde(default = "default_true")]
    pub mutable: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Literal default as typed by the user; JSON text for object/list types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ViewVariableMeta>,
}

fn default_true() -> bool {
    true
}

impl ViewVariableMeta {
    /// Create a meta with a fresh key
    pub fn new(name: impl Into<String>, ty: ViewType) -> Self {
        Self {
            key: new_key(),
            name: name.into(),
            ty,
            mutable: true,
            required: false,
            description: None,
            default_value: None,
            children: Vec::new(),
        }
    }

    /// Set nested fields. Ignored for types that cannot carry children.
    pub fn with_children(mut self, children: Vec<ViewVariableMeta>) -> Self {
        if self.ty.has_children() {
            self.children = children;
        }
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<&ViewVariableMeta> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Nested schema of a wire meta: child fields for objects, an item meta for lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaDto {
    Fields(Vec<VariableMetaDto>),
    Item(Box<VariableMetaDto>),
}

/// Wire-level description of a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMetaDto {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub dto_type: DtoType,
    #[serde(default, with = "assist_code", skip_serializing_if = "Option::is_none")]
    pub assist_type: Option<AssistType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDto>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

impl VariableMetaDto {
    /// Extract the type descriptor carried by this meta
    pub fn type_dto(&self) -> Result<TypeDto> {
        let item = match (&self.dto_type, &self.schema) {
            (DtoType::List, Some(SchemaDto::Item(item))) => Some(Box::new(item.type_dto()?)),
            (DtoType::List, _) => {
                return Err(EngineError::UnknownTypeTag(format!(
                    "list '{}' without item schema",
                    self.name
                )))
            }
            _ => None,
        };
        Ok(TypeDto {
            dto_type: self.dto_type,
            assist_type: self.assist_type,
            item,
        })
    }

    /// Object fields, following list item schemas down to the innermost object
    fn element_fields(&self) -> &[VariableMetaDto] {
        match &self.schema {
            Some(SchemaDto::Fields(fields)) => fields,
            Some(SchemaDto::Item(item)) => item.element_fields(),
            None => &[],
        }
    }
}

/// Convert a wire meta tree to editor metas, generating fresh keys
pub fn dto_meta_to_view_meta(dto: &VariableMetaDto) -> Result<ViewVariableMeta> {
    let ty = dto_to_view(&dto.type_dto()?)?;
    if !matches!(dto.dto_type, DtoType::List | DtoType::Object) && dto.schema.is_some() {
        log::debug!("Ignoring schema on non-composite variable '{}'", dto.name);
    }

    let children = if ty.has_children() {
        dto.element_fields()
            .iter()
            .map(dto_meta_to_view_meta)
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let default_value = dto.default_value.as_ref().map(|value| match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    Ok(ViewVariableMeta {
        key: new_key(),
        name: dto.name.clone(),
        ty,
        mutable: !dto.read_only,
        required: dto.required,
        description: dto.description.clone(),
        default_value,
        children,
    })
}

/// Convert an editor meta tree to its wire form
pub fn view_meta_to_dto_meta(meta: &ViewVariableMeta) -> VariableMetaDto {
    let children: Vec<VariableMetaDto> = meta.children.iter().map(view_meta_to_dto_meta).collect();
    let dto = view_to_dto(&meta.ty);

    VariableMetaDto {
        name: meta.name.clone(),
        dto_type: dto.dto_type,
        assist_type: dto.assist_type,
        schema: schema_for(&dto, children),
        required: meta.required,
        description: meta.description.clone(),
        read_only: !meta.mutable,
        default_value: meta.default_value.clone().map(serde_json::Value::String),
    }
}

/// Build the nested schema for a descriptor; object fields land on the innermost object
fn schema_for(dto: &TypeDto, children: Vec<VariableMetaDto>) -> Option<SchemaDto> {
    match dto.dto_type {
        DtoType::Object => Some(SchemaDto::Fields(children)),
        DtoType::List => {
            let item = dto.item.as_deref()?;
            Some(SchemaDto::Item(Box::new(VariableMetaDto {
                name: String::new(),
                dto_type: item.dto_type,
                assist_type: item.assist_type,
                schema: schema_for(item, children),
                required: false,
                description: None,
                read_only: false,
                default_value: None,
            })))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_scalar_types() -> Vec<ViewType> {
        let mut types = vec![
            ViewType::String,
            ViewType::Integer,
            ViewType::Number,
            ViewType::Boolean,
            ViewType::Time,
            ViewType::Object,
        ];
        for kind in [
            FileKind::Default,
            FileKind::Image,
            FileKind::Doc,
            FileKind::Code,
            FileKind::Ppt,
            FileKind::Txt,
            FileKind::Excel,
            FileKind::Audio,
            FileKind::Zip,
            FileKind::Video,
            FileKind::Svg,
            FileKind::Voice,
        ] {
            types.push(ViewType::File(kind));
        }
        types
    }

    #[test]
    fn test_view_dto_round_trip() {
        for t in all_scalar_types() {
            assert_eq!(dto_to_view(&view_to_dto(&t)).unwrap(), t);
            let list = ViewType::list_of(t.clone());
            assert_eq!(dto_to_view(&view_to_dto(&list)).unwrap(), list);
            let nested = ViewType::list_of(list);
            assert_eq!(dto_to_view(&view_to_dto(&nested)).unwrap(), nested);
        }
    }

    #[test]
    fn test_dto_wire_shape() {
        let dto = view_to_dto(&ViewType::list_of(ViewType::File(FileKind::Image)));
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "list", "schema": {"type": "string", "assistType": 2}})
        );

        let back: TypeDto = serde_json::from_value(json).unwrap();
        assert_eq!(back, dto);
    }

    #[test]
    fn test_unknown_tags_rejected() {
        let list_without_item = TypeDto::new(DtoType::List);
        assert!(matches!(
            dto_to_view(&list_without_item),
            Err(EngineError::UnknownTypeTag(_))
        ));

        let bad: std::result::Result<TypeDto, _> =
            serde_json::from_value(serde_json::json!({"type": "string", "assistType": 77}));
        assert!(bad.is_err());

        let bad_type: std::result::Result<TypeDto, _> =
            serde_json::from_value(serde_json::json!({"type": "tuple"}));
        assert!(bad_type.is_err());
    }

    #[test]
    fn test_assist_zero_means_unset() {
        let dto: TypeDto =
            serde_json::from_value(serde_json::json!({"type": "string", "assistType": 0})).unwrap();
        assert_eq!(dto_to_view(&dto).unwrap(), ViewType::String);
    }

    #[test]
    fn test_is_json_input_type() {
        assert!(is_json_input_type(&ViewType::Object));
        assert!(is_json_input_type(&ViewType::list_of(ViewType::String)));
        assert!(!is_json_input_type(&ViewType::String));
        assert!(!is_json_input_type(&ViewType::File(FileKind::Image)));
    }

    #[test]
    fn test_meta_tree_conversion() {
        let meta = ViewVariableMeta::new("rows", ViewType::list_of(ViewType::Object))
            .with_children(vec![
                ViewVariableMeta::new("id", ViewType::Integer),
                ViewVariableMeta::new("tags", ViewType::list_of(ViewType::String)),
            ])
            .read_only();

        let dto = view_meta_to_dto_meta(&meta);
        assert!(dto.read_only);
        match &dto.schema {
            Some(SchemaDto::Item(item)) => match &item.schema {
                Some(SchemaDto::Fields(fields)) => assert_eq!(fields.len(), 2),
                other => panic!("expected object fields, got {:?}", other),
            },
            other => panic!("expected list item, got {:?}", other),
        }

        let json = serde_json::to_string(&dto).unwrap();
        let parsed: VariableMetaDto = serde_json::from_str(&json).unwrap();
        let back = dto_meta_to_view_meta(&parsed).unwrap();
        assert_eq!(back.name, "rows");
        assert_eq!(back.ty, meta.ty);
        assert!(!back.mutable);
        assert_eq!(back.children.len(), 2);
        assert_eq!(back.children[1].ty, ViewType::list_of(ViewType::String));
        assert_ne!(back.key, meta.key);
    }

    #[test]
    fn test_empty_object_keeps_empty_schema() {
        let dto = view_meta_to_dto_meta(&ViewVariableMeta::new("obj", ViewType::Object));
        assert_eq!(dto.schema, Some(SchemaDto::Fields(Vec::new())));
    }

    #[test]
    fn test_leaf_ignores_children() {
        let meta = ViewVariableMeta::new("s", ViewType::String)
            .with_children(vec![ViewVariableMeta::new("x", ViewType::String)]);
        assert!(meta.children.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(ViewType::list_of(ViewType::Object).to_string(), "Array<Object>");
        assert_eq!(ViewType::File(FileKind::Default).to_string(), "File");
    }
}
