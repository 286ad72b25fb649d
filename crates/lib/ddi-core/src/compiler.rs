//! Mechanical mapping from resource-type schemas to operation handlers.
//!
//! Every valid descriptor yields exactly six handlers. Output depends only on
//! the snapshot content, so compiling the same snapshot twice produces
//! byte-identical definitions.

use std::collections::BTreeSet;
use std::{error::Error, fmt};

use ddi_store::models::{
    FieldDescriptor,
    HandlerBinding,
    HandlerDefinition,
    HandlerOrigin,
    OperationKind,
    ResourceTypeDescriptor,
    SchemaSnapshot,
};
use ddi_store::schema::{
    ATTRIBUTE_PREFIX,
    ATTRIBUTE_PROJECTION_FIELD,
    DEFAULT_LIMIT,
    MAX_LIMIT,
    PARAM_FILTERS,
    PARAM_LIMIT,
    PARAM_PAYLOAD,
    PARAM_PROJECTION,
    PARAM_REF,
    make_handler_name,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::validation::validate_resource_type;

/// Fields listed by name in generated descriptions before truncating.
const DESCRIPTION_FIELD_SAMPLE: usize = 10;

/// A descriptor that could not be compiled; the type is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileIssue {
    pub resource_type: String,
    pub reason: String,
}

impl fmt::Display for CompileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped {}: {}", self.resource_type, self.reason)
    }
}

impl Error for CompileIssue {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompileOutput {
    /// Handlers sorted by name.
    pub handlers: Vec<HandlerDefinition>,
    pub issues: Vec<CompileIssue>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToolCompiler;

impl ToolCompiler {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Compiles every descriptor in the snapshot.
    #[must_use]
    pub fn compile(&self, snapshot: &SchemaSnapshot) -> CompileOutput {
        let mut output = CompileOutput::default();
        for descriptor in snapshot.descriptors() {
            match self.compile_descriptor(descriptor) {
                Ok(handlers) => output.handlers.extend(handlers),
                Err(issue) => {
                    warn!(resource_type = %issue.resource_type, reason = %issue.reason, "compilation skipped resource type");
                    output.issues.push(issue);
                }
            }
        }
        output.handlers.sort_by(|left, right| left.name.cmp(&right.name));
        output
    }

    /// Compiles one descriptor into its six handlers.
    ///
    /// # Errors
    /// Returns `CompileIssue` when the descriptor violates naming or field
    /// uniqueness rules.
    pub fn compile_descriptor(
        &self,
        descriptor: &ResourceTypeDescriptor,
    ) -> Result<Vec<HandlerDefinition>, CompileIssue> {
        check_descriptor(descriptor)?;
        Ok(OperationKind::ALL
            .into_iter()
            .map(|kind| build_handler(kind, descriptor))
            .collect())
    }
}

fn check_descriptor(descriptor: &ResourceTypeDescriptor) -> Result<(), CompileIssue> {
    let issue = |reason: String| CompileIssue {
        resource_type: descriptor.name.clone(),
        reason,
    };
    validate_resource_type(&descriptor.name).map_err(|err| issue(err.to_string()))?;
    let mut seen = BTreeSet::new();
    for field in &descriptor.fields {
        if field.name.trim().is_empty() {
            return Err(issue("field with empty name".to_string()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(issue(format!("duplicate field {}", field.name)));
        }
    }
    Ok(())
}

fn build_handler(kind: OperationKind, descriptor: &ResourceTypeDescriptor) -> HandlerDefinition {
    let input_schema = match kind {
        OperationKind::List => list_schema(descriptor),
        OperationKind::Get => get_schema(descriptor),
        OperationKind::Create => create_schema(descriptor),
        OperationKind::Update => update_schema(descriptor),
        OperationKind::Delete => delete_schema(),
        OperationKind::Search => search_schema(descriptor),
    };
    HandlerDefinition {
        name: make_handler_name(kind, &descriptor.name),
        description: describe(kind, descriptor),
        input_schema,
        binding: HandlerBinding::Operation {
            kind,
            resource_type: descriptor.name.clone(),
        },
        origin: HandlerOrigin::Compiled,
    }
}

fn describe(kind: OperationKind, descriptor: &ResourceTypeDescriptor) -> String {
    let name = &descriptor.name;
    match kind {
        OperationKind::List => format!("List {name} objects, optionally limiting results and returned fields."),
        OperationKind::Get => format!("Get one {name} object by its reference."),
        OperationKind::Create => {
            let fields = sample_names(descriptor.writable_fields());
            format!("Create a {name} object. Writable fields: {fields}.")
        }
        OperationKind::Update => format!("Update fields of an existing {name} object by reference."),
        OperationKind::Delete => format!("Delete a {name} object by reference."),
        OperationKind::Search => {
            let fields = sample_names(descriptor.searchable_fields());
            format!(
                "Search {name} objects by field filters or extensible attributes (keys prefixed with '{ATTRIBUTE_PREFIX}'). Searchable fields: {fields}."
            )
        }
    }
}

fn sample_names<'a>(fields: impl Iterator<Item = &'a FieldDescriptor>) -> String {
    let names: Vec<&str> = fields.map(|field| field.name.as_str()).collect();
    if names.is_empty() {
        return "none".to_string();
    }
    let mut text = names
        .iter()
        .take(DESCRIPTION_FIELD_SAMPLE)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > DESCRIPTION_FIELD_SAMPLE {
        text.push_str(", ...");
    }
    text
}

fn object_schema(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn limit_property() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": MAX_LIMIT,
        "default": DEFAULT_LIMIT,
        "description": format!("Maximum results to return (default {DEFAULT_LIMIT}, max {MAX_LIMIT})."),
    })
}

fn projection_property(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut names: Vec<&str> = descriptor.fields.iter().map(|field| field.name.as_str()).collect();
    names.sort_unstable();
    json!({
        "type": "array",
        "items": {"type": "string"},
        "description": format!(
            "Fields to return. Include '{ATTRIBUTE_PROJECTION_FIELD}' for extensible attributes. Known fields: {}.",
            if names.is_empty() { "none".to_string() } else { names.join(", ") }
        ),
    })
}

fn ref_property(descriptor_name: Option<&str>) -> Value {
    let description = descriptor_name.map_or_else(
        || "Object reference (_ref) returned by a previous call.".to_string(),
        |name| format!("Reference (_ref) of the {name} object."),
    );
    json!({"type": "string", "minLength": 1, "description": description})
}

fn field_property(field: &FieldDescriptor) -> Value {
    let mut property = Map::new();
    if let Some(json_type) = json_type_for(&field.type_tag) {
        property.insert("type".to_string(), Value::String(json_type.to_string()));
    }
    property.insert(
        "description".to_string(),
        Value::String(format!("{} ({})", field.name, field.type_tag)),
    );
    Value::Object(property)
}

fn json_type_for(type_tag: &str) -> Option<&'static str> {
    match type_tag {
        "string" | "enum" => Some("string"),
        "bool" | "boolean" => Some("boolean"),
        "uint" | "int" | "unsigned int" | "timestamp" => Some("integer"),
        _ => None,
    }
}

fn payload_property(descriptor: &ResourceTypeDescriptor, enforce_required: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in descriptor.writable_fields() {
        properties.insert(field.name.clone(), field_property(field));
        if enforce_required && field.required {
            required.push(field.name.clone());
        }
    }
    let mut payload = Map::new();
    payload.insert("type".to_string(), Value::String("object".to_string()));
    payload.insert("properties".to_string(), Value::Object(properties));
    if enforce_required {
        payload.insert("required".to_string(), json!(required));
    } else {
        payload.insert("minProperties".to_string(), json!(1));
    }
    Value::Object(payload)
}

fn list_schema(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut properties = Map::new();
    properties.insert(PARAM_LIMIT.to_string(), limit_property());
    properties.insert(PARAM_PROJECTION.to_string(), projection_property(descriptor));
    object_schema(properties, &[])
}

fn get_schema(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut properties = Map::new();
    properties.insert(PARAM_REF.to_string(), ref_property(Some(&descriptor.name)));
    properties.insert(PARAM_PROJECTION.to_string(), projection_property(descriptor));
    object_schema(properties, &[PARAM_REF])
}

fn create_schema(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut properties = Map::new();
    properties.insert(PARAM_PAYLOAD.to_string(), payload_property(descriptor, true));
    object_schema(properties, &[PARAM_PAYLOAD])
}

fn update_schema(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut properties = Map::new();
    properties.insert(PARAM_REF.to_string(), ref_property(Some(&descriptor.name)));
    properties.insert(PARAM_PAYLOAD.to_string(), payload_property(descriptor, false));
    object_schema(properties, &[PARAM_REF, PARAM_PAYLOAD])
}

fn delete_schema() -> Value {
    let mut properties = Map::new();
    properties.insert(PARAM_REF.to_string(), ref_property(None));
    object_schema(properties, &[PARAM_REF])
}

fn search_schema(descriptor: &ResourceTypeDescriptor) -> Value {
    let mut filter_properties = Map::new();
    for field in descriptor.searchable_fields() {
        filter_properties.insert(field.name.clone(), field_property(field));
    }
    let filters = json!({
        "type": "object",
        "properties": filter_properties,
        "additionalProperties": {"type": ["string", "number", "boolean"]},
        "description": format!(
            "Field filters combined with AND. Prefix a key with '{ATTRIBUTE_PREFIX}' to filter on an extensible attribute (for example '{ATTRIBUTE_PREFIX}Site'). Append a modifier to the key: '~' regex, '!' not equal, ':' case-insensitive, '<' or '>' ordering. Attribute filters always return '{ATTRIBUTE_PROJECTION_FIELD}'."
        ),
    });
    let mut properties = Map::new();
    properties.insert(PARAM_FILTERS.to_string(), filters);
    properties.insert(PARAM_LIMIT.to_string(), limit_property());
    properties.insert(PARAM_PROJECTION.to_string(), projection_property(descriptor));
    object_schema(properties, &[PARAM_FILTERS])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_snapshot() -> SchemaSnapshot {
        SchemaSnapshot::from_descriptors([
            ResourceTypeDescriptor::new(
                "network",
                vec![
                    FieldDescriptor::new("network", "string").required().searchable(),
                    FieldDescriptor::new("comment", "string").searchable(),
                ],
            ),
            ResourceTypeDescriptor::new(
                "record:a",
                vec![
                    FieldDescriptor::new("name", "string").required().searchable(),
                    FieldDescriptor::new("ipv4addr", "string").required().searchable(),
                ],
            ),
        ])
    }

    #[test]
    fn two_types_yield_twelve_handlers() {
        let output = ToolCompiler::new().compile(&scenario_snapshot());
        assert!(output.issues.is_empty());
        assert_eq!(output.handlers.len(), 12);
        let names: Vec<&str> = output.handlers.iter().map(|handler| handler.name.as_str()).collect();
        assert!(names.contains(&"List:network"));
        assert!(names.contains(&"Search:record:a"));
        assert!(output.handlers.iter().all(|handler| handler.origin == HandlerOrigin::Compiled));
    }

    #[test]
    fn compilation_is_byte_identical() {
        let compiler = ToolCompiler::new();
        let first = serde_json::to_string(&compiler.compile(&scenario_snapshot()).handlers)
            .expect("handlers serialize");
        let second = serde_json::to_string(&compiler.compile(&scenario_snapshot()).handlers)
            .expect("handlers serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_types_are_skipped_without_aborting() {
        let mut snapshot = scenario_snapshot();
        snapshot.insert(ResourceTypeDescriptor::new(
            "grid",
            vec![
                FieldDescriptor::new("name", "string"),
                FieldDescriptor::new("name", "string"),
            ],
        ));
        snapshot.insert(ResourceTypeDescriptor::new("Bad Type", Vec::new()));
        let output = ToolCompiler::new().compile(&snapshot);
        assert_eq!(output.handlers.len(), 12);
        let skipped: Vec<&str> = output.issues.iter().map(|issue| issue.resource_type.as_str()).collect();
        assert_eq!(skipped, vec!["Bad Type", "grid"]);
    }

    #[test]
    fn create_payload_excludes_read_only_fields() {
        let descriptor = ResourceTypeDescriptor::new(
            "network",
            vec![
                FieldDescriptor::new("network", "string").required(),
                FieldDescriptor::new("utilization", "uint").read_only(),
            ],
        );
        let handlers = ToolCompiler::new()
            .compile_descriptor(&descriptor)
            .expect("descriptor should compile");
        let create = handlers
            .iter()
            .find(|handler| handler.name == "Create:network")
            .expect("create handler exists");
        let payload = &create.input_schema["properties"]["payload"];
        assert!(payload["properties"].get("network").is_some());
        assert!(payload["properties"].get("utilization").is_none());
        assert_eq!(payload["required"], json!(["network"]));
    }
}
