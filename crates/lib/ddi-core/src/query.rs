//! Attribute-aware filter and projection handling for search handlers.
//!
//! Filter keys name either a literal field (`name`) or a dynamic attribute
//! (`*Site`). Trailing modifier characters select the match mode, so
//! `*Site~` is a regex match on the `Site` attribute. Any attribute filter
//! forces `extattrs` into the response projection.

use std::fmt;
use std::str::FromStr;

use ddi_store::schema::{ATTRIBUTE_PREFIX, ATTRIBUTE_PROJECTION_FIELD, REGEX_MODIFIER};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{
    ValidationError,
    validate_attribute_name,
    validate_filter_value,
    validate_regex_filter_value,
};

/// How regex filter values are anchored before they are sent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegexAnchoring {
    /// Values are passed through; the remote performs a substring match.
    #[default]
    Unanchored,
    /// Values are wrapped in `^...$` unless already anchored at either end.
    Anchored,
}

impl RegexAnchoring {
    #[must_use]
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Unanchored => value.to_string(),
            Self::Anchored => {
                let mut anchored = String::with_capacity(value.len() + 2);
                if !value.starts_with('^') {
                    anchored.push('^');
                }
                anchored.push_str(value);
                if !value.ends_with('$') {
                    anchored.push('$');
                }
                anchored
            }
        }
    }
}

impl FromStr for RegexAnchoring {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unanchored" | "none" | "substring" => Ok(Self::Unanchored),
            "anchored" | "full" | "whole" => Ok(Self::Anchored),
            other => Err(format!("unknown regex anchoring mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterModifier {
    Regex,
    NotEqual,
    CaseInsensitive,
    Less,
    Greater,
}

impl FilterModifier {
    const fn from_char(ch: char) -> Option<Self> {
        match ch {
            REGEX_MODIFIER => Some(Self::Regex),
            '!' => Some(Self::NotEqual),
            ':' => Some(Self::CaseInsensitive),
            '<' => Some(Self::Less),
            '>' => Some(Self::Greater),
            _ => None,
        }
    }

    const fn as_char(self) -> char {
        match self {
            Self::Regex => REGEX_MODIFIER,
            Self::NotEqual => '!',
            Self::CaseInsensitive => ':',
            Self::Less => '<',
            Self::Greater => '>',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FilterTarget {
    Field(String),
    Attribute(String),
}

/// A parsed filter key: its target plus trailing modifiers in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterKey {
    pub target: FilterTarget,
    pub modifiers: Vec<FilterModifier>,
}

impl FilterKey {
    /// Parses a raw key such as `name`, `comment~`, or `*Site:~`.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty target or an invalid attribute
    /// name.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let base = trimmed.trim_end_matches(|ch: char| FilterModifier::from_char(ch).is_some());
        let modifiers = trimmed[base.len()..]
            .chars()
            .filter_map(FilterModifier::from_char)
            .collect();
        let target = if base.starts_with(ATTRIBUTE_PREFIX) {
            FilterTarget::Attribute(validate_attribute_name(base)?.to_string())
        } else {
            if base.is_empty() {
                return Err(ValidationError {
                    field: "filter".to_string(),
                    message: format!("key {raw:?} has no field name"),
                });
            }
            validate_filter_value("key", base)?;
            FilterTarget::Field(base.to_string())
        };
        Ok(Self { target, modifiers })
    }

    #[must_use]
    pub const fn is_attribute(&self) -> bool {
        matches!(self.target, FilterTarget::Attribute(_))
    }

    #[must_use]
    pub fn is_regex(&self) -> bool {
        self.modifiers.contains(&FilterModifier::Regex)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            FilterTarget::Field(name) => f.write_str(name)?,
            FilterTarget::Attribute(name) => write!(f, "{ATTRIBUTE_PREFIX}{name}")?,
        }
        for modifier in &self.modifiers {
            write!(f, "{}", modifier.as_char())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub key: FilterKey,
    pub value: String,
}

/// Validated filter set; all filters combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    filters: Vec<SearchFilter>,
}

impl SearchFilters {
    /// Parses a JSON filter object.
    ///
    /// Scalar values are stringified; arrays of scalars repeat the key, which
    /// the remote treats as another AND term.
    ///
    /// # Errors
    /// Returns `ValidationError` for bad keys, nested objects, or rejected
    /// values.
    pub fn from_json(map: &Map<String, Value>, anchoring: RegexAnchoring) -> Result<Self, ValidationError> {
        let mut filters = Vec::new();
        for (raw_key, raw_value) in map {
            let key = FilterKey::parse(raw_key)?;
            let values = match raw_value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| scalar_to_string(raw_key, item))
                    .collect::<Result<Vec<_>, _>>()?,
                other => vec![scalar_to_string(raw_key, other)?],
            };
            for value in values {
                let value = if key.is_regex() {
                    validate_regex_filter_value(raw_key, &value)?;
                    anchoring.apply(&value)
                } else {
                    validate_filter_value(raw_key, &value)?;
                    value
                };
                filters.push(SearchFilter {
                    key: key.clone(),
                    value,
                });
            }
        }
        Ok(Self { filters })
    }

    #[must_use]
    pub fn has_attribute_filter(&self) -> bool {
        self.filters.iter().any(|filter| filter.key.is_attribute())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchFilter> {
        self.filters.iter()
    }

    /// Query pairs in `<key>=<value>` form.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|filter| (filter.key.to_string(), filter.value.clone()))
            .collect()
    }
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(ValidationError {
            field: format!("filter {key}"),
            message: "value must be a string, number, or boolean".to_string(),
        }),
    }
}

/// Requested response fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    /// Reads a projection argument given as an array of names or a
    /// comma-separated string. Returns `None` when absent or empty.
    ///
    /// # Errors
    /// Returns `ValidationError` when the argument has another shape.
    pub fn from_json(value: Option<&Value>) -> Result<Option<Self>, ValidationError> {
        let names: Vec<String> = match value {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(text)) => text.split(',').map(|name| name.trim().to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(|name| name.trim().to_string()).ok_or_else(|| ValidationError {
                        field: "projection".to_string(),
                        message: "entries must be strings".to_string(),
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ValidationError {
                    field: "projection".to_string(),
                    message: "must be a list of field names or a comma-separated string".to_string(),
                });
            }
        };
        let mut fields = Vec::new();
        for name in names.into_iter().filter(|name| !name.is_empty()) {
            validate_filter_value("projection", &name)?;
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
        Ok((!fields.is_empty()).then_some(Self { fields }))
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn includes_attributes(&self) -> bool {
        self.fields.iter().any(|field| field == ATTRIBUTE_PROJECTION_FIELD)
    }
}

/// Projection query parameter after the attribute rule is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionParam {
    /// No projection; the remote returns its default fields.
    Default,
    /// `_return_fields=<fields>` replacing the default set.
    Replace(Vec<String>),
    /// `_return_fields+=<fields>` adding to the default set.
    Extend(Vec<String>),
}

impl ProjectionParam {
    /// Combines an explicit projection with the attribute-filter rule.
    ///
    /// When `force_attributes` is set the result always carries `extattrs`,
    /// even if the caller's projection omitted it.
    #[must_use]
    pub fn resolve(explicit: Option<Projection>, force_attributes: bool) -> Self {
        match explicit {
            Some(projection) => {
                let mut fields = projection.fields;
                if force_attributes && !fields.iter().any(|field| field == ATTRIBUTE_PROJECTION_FIELD) {
                    fields.push(ATTRIBUTE_PROJECTION_FIELD.to_string());
                }
                Self::Replace(fields)
            }
            None if force_attributes => Self::Extend(vec![ATTRIBUTE_PROJECTION_FIELD.to_string()]),
            None => Self::Default,
        }
    }

    #[must_use]
    pub fn includes_attributes(&self) -> bool {
        match self {
            Self::Default => false,
            Self::Replace(fields) | Self::Extend(fields) => {
                fields.iter().any(|field| field == ATTRIBUTE_PROJECTION_FIELD)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn filters(value: &Value, anchoring: RegexAnchoring) -> Result<SearchFilters, ValidationError> {
        SearchFilters::from_json(value.as_object().expect("object"), anchoring)
    }

    #[test]
    fn keys_split_target_and_modifiers() {
        let key = FilterKey::parse("*Site:~").expect("key parses");
        assert_eq!(key.target, FilterTarget::Attribute("Site".to_string()));
        assert_eq!(key.modifiers, vec![FilterModifier::CaseInsensitive, FilterModifier::Regex]);
        assert_eq!(key.to_string(), "*Site:~");

        let key = FilterKey::parse("comment!").expect("key parses");
        assert_eq!(key.target, FilterTarget::Field("comment".to_string()));
        assert!(!key.is_attribute());
        assert!(FilterKey::parse("~").is_err());
        assert!(FilterKey::parse("*bad name").is_err());
    }

    #[test]
    fn attribute_filter_forces_extattrs_projection() {
        let parsed = filters(&json!({"*MARSHA": "NYCMQ", "name~": "web"}), RegexAnchoring::Unanchored)
            .expect("filters parse");
        assert!(parsed.has_attribute_filter());

        let explicit = Projection::from_json(Some(&json!(["name", "ipv4addr"]))).expect("projection");
        let param = ProjectionParam::resolve(explicit, parsed.has_attribute_filter());
        assert_eq!(
            param,
            ProjectionParam::Replace(vec!["name".into(), "ipv4addr".into(), "extattrs".into()])
        );

        let param = ProjectionParam::resolve(None, parsed.has_attribute_filter());
        assert_eq!(param, ProjectionParam::Extend(vec!["extattrs".into()]));
        assert!(param.includes_attributes());
    }

    #[test]
    fn field_only_filters_leave_projection_alone() {
        let parsed = filters(&json!({"name": "web01"}), RegexAnchoring::Unanchored).expect("filters parse");
        assert!(!parsed.has_attribute_filter());
        assert_eq!(ProjectionParam::resolve(None, false), ProjectionParam::Default);
    }

    #[test]
    fn regex_values_follow_anchoring_mode() {
        let value = json!({"*Site~": "HQ", "name": "HQ"});
        let anchored = filters(&value, RegexAnchoring::Anchored).expect("filters parse");
        assert_eq!(
            anchored.to_query_pairs(),
            vec![
                ("*Site~".to_string(), "^HQ$".to_string()),
                ("name".to_string(), "HQ".to_string()),
            ]
        );
        let unanchored = filters(&value, RegexAnchoring::Unanchored).expect("filters parse");
        assert_eq!(unanchored.to_query_pairs()[0].1, "HQ");
        assert_eq!(RegexAnchoring::Anchored.apply("^HQ"), "^HQ$");

        let value = json!({"name~": "^web$", "*Site~": "(HQ|Lab)"});
        let anchored = filters(&value, RegexAnchoring::Anchored).expect("regex syntax accepted");
        assert_eq!(
            anchored.to_query_pairs(),
            vec![
                ("*Site~".to_string(), "^(HQ|Lab)$".to_string()),
                ("name~".to_string(), "^web$".to_string()),
            ]
        );
        assert!(filters(&json!({"name": "(HQ|Lab)"}), RegexAnchoring::Anchored).is_err());
    }

    #[test]
    fn array_values_repeat_the_key() {
        let parsed = filters(&json!({"*Site": ["HQ", "Lab"]}), RegexAnchoring::Unanchored)
            .expect("filters parse");
        assert_eq!(parsed.iter().count(), 2);
        assert!(filters(&json!({"name": {"nested": true}}), RegexAnchoring::Unanchored).is_err());
        assert!(filters(&json!({"name": "$(id)"}), RegexAnchoring::Unanchored).is_err());
    }
}
