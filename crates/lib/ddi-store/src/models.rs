use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field of a resource type schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_tag: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub read_only: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            required: false,
            searchable: false,
            read_only: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Schema of one remote resource type as captured by a discovery cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceTypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ResourceTypeDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| field.searchable)
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|field| !field.read_only)
    }
}

/// Complete capture of all resource-type schemas from one discovery cycle.
///
/// Types are keyed by name in a sorted map, so iteration order never depends
/// on the order in which the remote answered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaSnapshot {
    #[serde(default)]
    pub types: BTreeMap<String, ResourceTypeDescriptor>,
}

impl SchemaSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceTypeDescriptor>) -> Self {
        let mut snapshot = Self::new();
        for descriptor in descriptors {
            snapshot.insert(descriptor);
        }
        snapshot
    }

    /// Inserts a descriptor, replacing any previous descriptor of the same name.
    pub fn insert(&mut self, descriptor: ResourceTypeDescriptor) {
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceTypeDescriptor> {
        self.types.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceTypeDescriptor> {
        self.types.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

/// Stable content hash of a schema snapshot (lowercase hex SHA-256).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The six operations synthesized for every resource type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    List,
    Get,
    Create,
    Update,
    Delete,
    Search,
}

impl OperationKind {
    pub const ALL: [Self; 6] = [
        Self::List,
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Search,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "List",
            Self::Get => "Get",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Search => "Search",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown operation kind: {value}"))
    }
}

/// HTTP verbs the generic REST client understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RestMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RestMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the request only reads remote state and is safe to resend.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for RestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a handler in the catalog came from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandlerOrigin {
    Compiled,
    #[default]
    Custom,
}

/// How a handler is executed by the generic invoker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum HandlerBinding {
    /// One of the six standard operations against a resource type.
    Operation {
        kind: OperationKind,
        resource_type: String,
    },
    /// A raw REST call; `query` and `body` arguments are passed through.
    Rest { method: RestMethod, path: String },
}

/// A named, parameterized operation in the handler catalog.
///
/// Compiled and custom handlers share this shape; `origin` tells them apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(flatten)]
    pub binding: HandlerBinding,
    #[serde(default)]
    pub origin: HandlerOrigin,
}

impl HandlerDefinition {
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        match &self.binding {
            HandlerBinding::Operation { resource_type, .. } => Some(resource_type.as_str()),
            HandlerBinding::Rest { .. } => None,
        }
    }

    #[must_use]
    pub const fn operation_kind(&self) -> Option<OperationKind> {
        match &self.binding {
            HandlerBinding::Operation { kind, .. } => Some(*kind),
            HandlerBinding::Rest { .. } => None,
        }
    }
}

/// Definition of a dynamically-defined per-instance attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    pub value_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Category tag attached to each knowledge document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    ObjectOverview,
    Field,
    UsagePattern,
    Attribute,
    CuratedExample,
    QueryReference,
    ToolSelection,
    Composition,
    BestPractice,
    Troubleshooting,
}

impl DocumentCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectOverview => "object_overview",
            Self::Field => "field",
            Self::UsagePattern => "usage_pattern",
            Self::Attribute => "attribute",
            Self::CuratedExample => "curated_example",
            Self::QueryReference => "query_reference",
            Self::ToolSelection => "tool_selection",
            Self::Composition => "composition",
            Self::BestPractice => "best_practice",
            Self::Troubleshooting => "troubleshooting",
        }
    }
}

/// Retrievable, embedded text unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeDocument {
    pub id: String,
    pub body: String,
    pub category: DocumentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// Persisted form of a knowledge document, tagged with its build generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeRecord {
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub generation: i64,
    pub doc_id: String,
    pub body: String,
    pub category: DocumentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl KnowledgeRecord {
    #[must_use]
    pub fn from_document(generation: i64, document: KnowledgeDocument) -> Self {
        Self {
            id: None,
            generation,
            doc_id: document.id,
            body: document.body,
            category: document.category,
            resource_type: document.resource_type,
            attribute_name: document.attribute_name,
            embedding: document.embedding,
        }
    }

    #[must_use]
    pub fn into_document(self) -> KnowledgeDocument {
        KnowledgeDocument {
            id: self.doc_id,
            body: self.body,
            category: self.category,
            resource_type: self.resource_type,
            attribute_name: self.attribute_name,
            embedding: self.embedding,
        }
    }
}

/// Operator-curated example section fed into the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CuratedExample {
    pub title: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keys_are_sorted_regardless_of_insert_order() {
        let snapshot = SchemaSnapshot::from_descriptors([
            ResourceTypeDescriptor::new("record:a", Vec::new()),
            ResourceTypeDescriptor::new("network", Vec::new()),
        ]);
        let names: Vec<&str> = snapshot.names().collect();
        assert_eq!(names, vec!["network", "record:a"]);
    }

    #[test]
    fn operation_kind_parses_case_insensitively() {
        assert_eq!("search".parse::<OperationKind>(), Ok(OperationKind::Search));
        assert!("patch".parse::<OperationKind>().is_err());
    }

    #[test]
    fn custom_handler_json_defaults_to_custom_origin() {
        let json = serde_json::json!({
            "name": "Report:utilization",
            "description": "Network utilization report",
            "input_schema": {"type": "object"},
            "binding": "rest",
            "method": "GET",
            "path": "network"
        });
        let handler: HandlerDefinition =
            serde_json::from_value(json).expect("handler should deserialize");
        assert_eq!(handler.origin, HandlerOrigin::Custom);
        assert_eq!(
            handler.binding,
            HandlerBinding::Rest {
                method: RestMethod::Get,
                path: "network".to_string(),
            }
        );
    }
}
