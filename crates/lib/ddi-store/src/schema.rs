use crate::models::OperationKind;

pub const TABLE_KNOWLEDGE_DOC: &str = "knowledge_doc";
pub const TABLE_KNOWLEDGE_GENERATION: &str = "knowledge_generation";

pub const ATTRIBUTE_PREFIX: char = '*';
pub const ATTRIBUTE_PROJECTION_FIELD: &str = "extattrs";
pub const REGEX_MODIFIER: char = '~';

pub const PARAM_LIMIT: &str = "limit";
pub const PARAM_PROJECTION: &str = "projection";
pub const PARAM_REF: &str = "ref";
pub const PARAM_PAYLOAD: &str = "payload";
pub const PARAM_FILTERS: &str = "filters";
pub const PARAM_QUERY: &str = "query";
pub const PARAM_BODY: &str = "body";

pub const WAPI_MAX_RESULTS: &str = "_max_results";
pub const WAPI_RETURN_FIELDS: &str = "_return_fields";
pub const WAPI_RETURN_FIELDS_PLUS: &str = "_return_fields+";

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;
pub const DEFAULT_FIELD_DOC_CAP: usize = 20;

pub fn make_handler_name(kind: OperationKind, resource_type: &str) -> String {
    format!("{}:{resource_type}", kind.as_str())
}

pub fn make_overview_doc_id(resource_type: &str) -> String {
    format!("obj_{resource_type}_overview")
}

pub fn make_field_doc_id(resource_type: &str, field: &str) -> String {
    format!("obj_{resource_type}_field_{field}")
}

pub fn make_usage_doc_id(resource_type: &str) -> String {
    format!("obj_{resource_type}_usecases")
}

pub fn make_attribute_doc_id(attribute: &str) -> String {
    format!("ea_{attribute}")
}

pub fn make_example_doc_id(slug: &str) -> String {
    format!("example_{slug}")
}

/// Storage key for a knowledge record; generations never share keys.
pub fn make_record_key(generation: i64, doc_id: &str) -> String {
    format!("{generation}_{doc_id}")
}

/// Lowercases and collapses any run of non-alphanumeric characters to `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}
