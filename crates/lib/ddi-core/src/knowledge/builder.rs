use std::collections::BTreeMap;
use std::sync::Arc;

use ddi_store::models::{
    AttributeDefinition,
    CuratedExample,
    DocumentCategory,
    FieldDescriptor,
    KnowledgeDocument,
    OperationKind,
    ResourceTypeDescriptor,
    SchemaSnapshot,
};
use ddi_store::schema::{
    ATTRIBUTE_PREFIX,
    ATTRIBUTE_PROJECTION_FIELD,
    DEFAULT_FIELD_DOC_CAP,
    make_attribute_doc_id,
    make_example_doc_id,
    make_field_doc_id,
    make_handler_name,
    make_overview_doc_id,
    make_usage_doc_id,
    slugify,
};
use tracing::{info, warn};

use super::corpus::{
    FIXED_DOCUMENTS,
    ObjectCategory,
    describe_field_purpose,
    describe_resource_type,
    usage_pattern,
};
use super::embed::{Embedder, HashingEmbedder};

/// Resource type used in attribute worked examples when it was discovered.
const ATTRIBUTE_EXAMPLE_TYPE: &str = "network";

/// Converts schema, attribute definitions, and curated examples into the
/// full knowledge document set.
#[derive(Clone)]
pub struct KnowledgeBaseBuilder {
    field_doc_cap: usize,
    embedder: Arc<dyn Embedder>,
}

impl Default for KnowledgeBaseBuilder {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

impl KnowledgeBaseBuilder {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            field_doc_cap: DEFAULT_FIELD_DOC_CAP,
            embedder,
        }
    }

    #[must_use]
    pub const fn with_field_doc_cap(mut self, field_doc_cap: usize) -> Self {
        self.field_doc_cap = field_doc_cap;
        self
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Builds every document, embedded and sorted by id.
    ///
    /// The output depends only on the inputs; a later id collision is dropped
    /// with a warning rather than failing the build.
    #[must_use]
    pub fn build(
        &self,
        snapshot: &SchemaSnapshot,
        attributes: &[AttributeDefinition],
        curated: &[CuratedExample],
    ) -> Vec<KnowledgeDocument> {
        let mut documents: BTreeMap<String, KnowledgeDocument> = BTreeMap::new();
        let mut push = |document: KnowledgeDocument| {
            if documents.contains_key(&document.id) {
                warn!(id = %document.id, "duplicate knowledge document id; keeping the first");
                return;
            }
            documents.insert(document.id.clone(), document);
        };

        for descriptor in snapshot.descriptors() {
            push(self.overview_document(descriptor));
            for field in self.capped_fields(descriptor) {
                push(self.field_document(descriptor, field));
            }
            push(self.usage_document(descriptor));
        }

        let example_type = if snapshot.get(ATTRIBUTE_EXAMPLE_TYPE).is_some() {
            ATTRIBUTE_EXAMPLE_TYPE
        } else {
            snapshot.names().next().unwrap_or(ATTRIBUTE_EXAMPLE_TYPE)
        };
        for attribute in attributes {
            push(self.attribute_document(attribute, example_type));
        }

        for fixed in FIXED_DOCUMENTS {
            push(self.document(fixed.id.to_string(), fixed.body.to_string(), fixed.category));
        }

        for example in curated {
            let slug = slugify(&example.title);
            if slug.is_empty() {
                continue;
            }
            let body = format!("## {}\n\n{}", example.title, example.body);
            push(self.document(make_example_doc_id(&slug), body, DocumentCategory::CuratedExample));
        }

        info!(
            documents = documents.len(),
            types = snapshot.len(),
            attributes = attributes.len(),
            curated = curated.len(),
            "knowledge documents built"
        );
        documents.into_values().collect()
    }

    fn document(&self, id: String, body: String, category: DocumentCategory) -> KnowledgeDocument {
        let embedding = self.embedder.embed(&body);
        KnowledgeDocument {
            id,
            body,
            category,
            resource_type: None,
            attribute_name: None,
            embedding,
        }
    }

    /// Fields documented for a type: searchable first, then required, then
    /// by name, truncated to the cap.
    fn capped_fields<'a>(&self, descriptor: &'a ResourceTypeDescriptor) -> Vec<&'a FieldDescriptor> {
        let mut fields: Vec<&FieldDescriptor> = descriptor.fields.iter().collect();
        fields.sort_by(|left, right| {
            right
                .searchable
                .cmp(&left.searchable)
                .then_with(|| right.required.cmp(&left.required))
                .then_with(|| left.name.cmp(&right.name))
        });
        fields.truncate(self.field_doc_cap);
        fields
    }

    fn overview_document(&self, descriptor: &ResourceTypeDescriptor) -> KnowledgeDocument {
        let name = &descriptor.name;
        let searchable: Vec<&str> = descriptor
            .searchable_fields()
            .map(|field| field.name.as_str())
            .collect();
        let handlers: Vec<String> = OperationKind::ALL
            .into_iter()
            .map(|kind| make_handler_name(kind, name))
            .collect();
        let body = format!(
            "Resource type: {name}\n\
             Category: {category}\n\
             Represents {description}.\n\
             Handlers: {handlers}.\n\
             Searchable fields: {searchable}.\n\
             Fields: {count}.",
            category = ObjectCategory::of(name).as_str(),
            description = describe_resource_type(name),
            handlers = handlers.join(", "),
            searchable = if searchable.is_empty() { "none".to_string() } else { searchable.join(", ") },
            count = descriptor.fields.len(),
        );
        let mut document = self.document(make_overview_doc_id(name), body, DocumentCategory::ObjectOverview);
        document.resource_type = Some(name.clone());
        document
    }

    fn field_document(&self, descriptor: &ResourceTypeDescriptor, field: &FieldDescriptor) -> KnowledgeDocument {
        let name = &descriptor.name;
        let status = format!(
            "{}, {}, {}",
            if field.required { "required" } else { "optional" },
            if field.searchable { "searchable" } else { "not searchable" },
            if field.read_only { "read-only" } else { "writable" },
        );
        let mut usage = Vec::new();
        if field.searchable {
            usage.push(format!(
                "Filter with {search} {{\"filters\": {{\"{field}\": \"<value>\"}}}}.",
                search = make_handler_name(OperationKind::Search, name),
                field = field.name,
            ));
        }
        usage.push(format!(
            "Return it with {list} {{\"projection\": [\"{field}\"]}}.",
            list = make_handler_name(OperationKind::List, name),
            field = field.name,
        ));
        if !field.read_only {
            usage.push(format!(
                "Set it through {update} {{\"ref\": \"<_ref>\", \"payload\": {{\"{field}\": \"<value>\"}}}}.",
                update = make_handler_name(OperationKind::Update, name),
                field = field.name,
            ));
        }
        let body = format!(
            "Field {field} of {name}\n\
             Type: {type_tag}\n\
             Status: {status}\n\
             Holds {purpose}.\n\
             {usage}",
            field = field.name,
            type_tag = field.type_tag,
            purpose = describe_field_purpose(&field.name),
            usage = usage.join("\n"),
        );
        let mut document = self.document(make_field_doc_id(name, &field.name), body, DocumentCategory::Field);
        document.resource_type = Some(name.clone());
        document
    }

    fn usage_document(&self, descriptor: &ResourceTypeDescriptor) -> KnowledgeDocument {
        let name = &descriptor.name;
        let mut document = self.document(make_usage_doc_id(name), usage_pattern(name), DocumentCategory::UsagePattern);
        document.resource_type = Some(name.clone());
        document
    }

    fn attribute_document(&self, attribute: &AttributeDefinition, example_type: &str) -> KnowledgeDocument {
        let name = &attribute.name;
        let key = format!("{ATTRIBUTE_PREFIX}{name}");
        let search = make_handler_name(OperationKind::Search, example_type);
        let sample_value = attribute
            .allowed_values
            .first()
            .map_or("<value>", String::as_str);
        let description = attribute
            .comment
            .clone()
            .unwrap_or_else(|| format!("Operator-defined extensible attribute {name}"));
        let mut body = format!(
            "Extensible attribute: {name}\n\
             Value type: {value_type}\n\
             Description: {description}\n\
             Query pattern: filter key {key} (exact), {key}~ (regex), {key}! (not equal).\n\
             Any {key} filter forces {projection} into the returned fields, even when the projection omits it.\n\
             Worked example: \"list {example_type} where {name} is {sample_value}\" maps to \
             {search} {{\"filters\": {{\"{key}\": \"{sample_value}\"}}}}, which sends \
             {example_type}?{key}={sample_value}&_return_fields+={projection}.",
            value_type = attribute.value_type,
            projection = ATTRIBUTE_PROJECTION_FIELD,
        );
        if !attribute.allowed_values.is_empty() {
            body.push_str("\nAllowed values: ");
            body.push_str(&attribute.allowed_values.join(", "));
        }
        let mut document = self.document(make_attribute_doc_id(name), body, DocumentCategory::Attribute);
        document.attribute_name = Some(name.clone());
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SchemaSnapshot {
        let many_fields = (0..30)
            .map(|index| FieldDescriptor::new(format!("field_{index:02}"), "string"))
            .chain([FieldDescriptor::new("network", "string").searchable()])
            .collect();
        SchemaSnapshot::from_descriptors([
            ResourceTypeDescriptor::new("network", many_fields),
            ResourceTypeDescriptor::new(
                "record:a",
                vec![
                    FieldDescriptor::new("name", "string").searchable(),
                    FieldDescriptor::new("ipv4addr", "string").searchable(),
                ],
            ),
        ])
    }

    fn marsha() -> AttributeDefinition {
        AttributeDefinition {
            name: "MARSHA".to_string(),
            value_type: "STRING".to_string(),
            allowed_values: Vec::new(),
            comment: None,
        }
    }

    #[test]
    fn per_type_documents_respect_field_cap() {
        let documents = KnowledgeBaseBuilder::default().build(&snapshot(), &[], &[]);
        let network_fields = documents
            .iter()
            .filter(|doc| doc.category == DocumentCategory::Field && doc.resource_type.as_deref() == Some("network"))
            .count();
        assert_eq!(network_fields, DEFAULT_FIELD_DOC_CAP);
        assert!(documents.iter().any(|doc| doc.id == "obj_network_field_network"));
        assert!(documents.iter().any(|doc| doc.id == "obj_record:a_overview"));
        assert!(documents.iter().any(|doc| doc.id == "obj_record:a_usecases"));
        let expected = 2 + DEFAULT_FIELD_DOC_CAP + 2 + 2 + FIXED_DOCUMENTS.len();
        assert_eq!(documents.len(), expected);
    }

    #[test]
    fn attribute_document_encodes_prefix_and_projection_rule() {
        let documents = KnowledgeBaseBuilder::default().build(&snapshot(), &[marsha()], &[]);
        let document = documents
            .iter()
            .find(|doc| doc.id == "ea_MARSHA")
            .expect("attribute document exists");
        assert_eq!(document.category, DocumentCategory::Attribute);
        assert_eq!(document.attribute_name.as_deref(), Some("MARSHA"));
        assert!(document.body.contains("*MARSHA"));
        assert!(document.body.contains("forces extattrs"));
        assert!(document.body.contains("Search:network"));
    }

    #[test]
    fn build_is_deterministic_and_sorted() {
        let builder = KnowledgeBaseBuilder::default();
        let curated = vec![CuratedExample {
            title: "Networks by site".to_string(),
            body: "Search:network {\"filters\": {\"*Site\": \"HQ\"}}".to_string(),
        }];
        let first = builder.build(&snapshot(), &[marsha()], &curated);
        let second = builder.build(&snapshot(), &[marsha()], &curated);
        assert_eq!(first, second);
        let ids: Vec<&str> = first.iter().map(|doc| doc.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"example_networks_by_site"));
        assert!(first.iter().all(|doc| doc.embedding.len() == builder.embedder().dimension()));
    }
}
