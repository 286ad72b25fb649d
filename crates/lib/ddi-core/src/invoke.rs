//! Translation of handler invocations into REST requests.

use std::{error::Error, fmt};

use ddi_store::models::{HandlerBinding, HandlerDefinition, OperationKind, RestMethod};
use ddi_store::schema::{
    DEFAULT_LIMIT,
    MAX_LIMIT,
    PARAM_BODY,
    PARAM_FILTERS,
    PARAM_LIMIT,
    PARAM_PAYLOAD,
    PARAM_PROJECTION,
    PARAM_QUERY,
    PARAM_REF,
    WAPI_MAX_RESULTS,
    WAPI_RETURN_FIELDS,
    WAPI_RETURN_FIELDS_PLUS,
};
use serde_json::{Map, Value};

use crate::query::{Projection, ProjectionParam, RegexAnchoring, SearchFilters};
use crate::remote::{RemoteError, RestRequest};
use crate::validation::{ValidationError, validate_filter_value, validate_reference, validate_resource_type};

const REF_PLACEHOLDER: &str = "{ref}";

#[derive(Debug)]
pub enum InvokeError {
    UnknownHandler(String),
    MissingArgument(&'static str),
    InvalidArgument { name: String, message: String },
    Validation(ValidationError),
    Remote(RemoteError),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandler(name) => write!(f, "unknown handler: {name}"),
            Self::MissingArgument(name) => write!(f, "missing required argument: {name}"),
            Self::InvalidArgument { name, message } => write!(f, "invalid argument {name}: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InvokeError {}

impl From<ValidationError> for InvokeError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<RemoteError> for InvokeError {
    fn from(err: RemoteError) -> Self {
        Self::Remote(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeOptions {
    pub anchoring: RegexAnchoring,
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            anchoring: RegexAnchoring::default(),
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl InvokeOptions {
    #[must_use]
    pub const fn with_anchoring(mut self, anchoring: RegexAnchoring) -> Self {
        self.anchoring = anchoring;
        self
    }
}

/// Builds the REST request for invoking `handler` with `args`.
///
/// # Errors
/// Returns `InvokeError` when required arguments are missing or any argument
/// fails validation.
pub fn build_request(
    handler: &HandlerDefinition,
    args: &Value,
    options: &InvokeOptions,
) -> Result<RestRequest, InvokeError> {
    let empty = Map::new();
    let args = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(InvokeError::InvalidArgument {
                name: "arguments".to_string(),
                message: "must be a JSON object".to_string(),
            });
        }
    };
    match &handler.binding {
        HandlerBinding::Operation {
            kind,
            resource_type,
        } => build_operation(*kind, resource_type, args, options),
        HandlerBinding::Rest { method, path } => build_rest(*method, path, args),
    }
}

fn build_operation(
    kind: OperationKind,
    resource_type: &str,
    args: &Map<String, Value>,
    options: &InvokeOptions,
) -> Result<RestRequest, InvokeError> {
    validate_resource_type(resource_type)?;
    let request = match kind {
        OperationKind::List => {
            let request = RestRequest::new(RestMethod::Get, resource_type)
                .with_query(WAPI_MAX_RESULTS, read_limit(args, options)?.to_string());
            let projection = Projection::from_json(args.get(PARAM_PROJECTION))?;
            apply_projection(request, ProjectionParam::resolve(projection, false))
        }
        OperationKind::Get => {
            let reference = read_reference(args)?;
            let projection = Projection::from_json(args.get(PARAM_PROJECTION))?;
            apply_projection(
                RestRequest::new(RestMethod::Get, reference),
                ProjectionParam::resolve(projection, false),
            )
        }
        OperationKind::Create => {
            RestRequest::new(RestMethod::Post, resource_type).with_body(read_payload(args)?)
        }
        OperationKind::Update => {
            let reference = read_reference(args)?;
            RestRequest::new(RestMethod::Put, reference).with_body(read_payload(args)?)
        }
        OperationKind::Delete => RestRequest::new(RestMethod::Delete, read_reference(args)?),
        OperationKind::Search => {
            let filters = match args.get(PARAM_FILTERS) {
                Some(Value::Object(map)) => SearchFilters::from_json(map, options.anchoring)?,
                Some(Value::Null) | None => return Err(InvokeError::MissingArgument(PARAM_FILTERS)),
                Some(_) => {
                    return Err(InvokeError::InvalidArgument {
                        name: PARAM_FILTERS.to_string(),
                        message: "must be an object".to_string(),
                    });
                }
            };
            let mut request = RestRequest::new(RestMethod::Get, resource_type);
            request.query.extend(filters.to_query_pairs());
            let request =
                request.with_query(WAPI_MAX_RESULTS, read_limit(args, options)?.to_string());
            let projection = Projection::from_json(args.get(PARAM_PROJECTION))?;
            apply_projection(
                request,
                ProjectionParam::resolve(projection, filters.has_attribute_filter()),
            )
        }
    };
    Ok(request)
}

fn build_rest(
    method: RestMethod,
    path: &str,
    args: &Map<String, Value>,
) -> Result<RestRequest, InvokeError> {
    let path = if path.contains(REF_PLACEHOLDER) {
        path.replace(REF_PLACEHOLDER, read_reference(args)?)
    } else {
        path.to_string()
    };
    validate_reference(&path)?;
    let mut request = RestRequest::new(method, path);
    match args.get(PARAM_QUERY) {
        Some(Value::Object(query)) => {
            for (key, value) in query {
                let value = match value {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    _ => {
                        return Err(InvokeError::InvalidArgument {
                            name: format!("{PARAM_QUERY}.{key}"),
                            message: "must be a string, number, or boolean".to_string(),
                        });
                    }
                };
                validate_filter_value(key, key)?;
                validate_filter_value(key, &value)?;
                request.query.push((key.clone(), value));
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(InvokeError::InvalidArgument {
                name: PARAM_QUERY.to_string(),
                message: "must be an object".to_string(),
            });
        }
    }
    if let Some(body) = args.get(PARAM_BODY).filter(|body| !body.is_null()) {
        request.body = Some(body.clone());
    }
    Ok(request)
}

fn apply_projection(request: RestRequest, projection: ProjectionParam) -> RestRequest {
    match projection {
        ProjectionParam::Default => request,
        ProjectionParam::Replace(fields) => request.with_query(WAPI_RETURN_FIELDS, fields.join(",")),
        ProjectionParam::Extend(fields) => {
            request.with_query(WAPI_RETURN_FIELDS_PLUS, fields.join(","))
        }
    }
}

fn read_limit(args: &Map<String, Value>, options: &InvokeOptions) -> Result<u32, InvokeError> {
    let limit = match args.get(PARAM_LIMIT) {
        None | Some(Value::Null) => return Ok(options.default_limit.min(options.max_limit)),
        Some(Value::Number(number)) => number.as_u64(),
        Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| InvokeError::InvalidArgument {
        name: PARAM_LIMIT.to_string(),
        message: "must be a positive integer".to_string(),
    })?;
    let capped = limit.clamp(1, u64::from(options.max_limit));
    Ok(u32::try_from(capped).unwrap_or(options.max_limit))
}

fn read_reference(args: &Map<String, Value>) -> Result<&str, InvokeError> {
    let reference = match args.get(PARAM_REF) {
        Some(Value::String(text)) => text.trim(),
        Some(Value::Null) | None => return Err(InvokeError::MissingArgument(PARAM_REF)),
        Some(_) => {
            return Err(InvokeError::InvalidArgument {
                name: PARAM_REF.to_string(),
                message: "must be a string".to_string(),
            });
        }
    };
    validate_reference(reference)?;
    Ok(reference)
}

fn read_payload(args: &Map<String, Value>) -> Result<Value, InvokeError> {
    match args.get(PARAM_PAYLOAD) {
        Some(Value::Object(payload)) if !payload.is_empty() => Ok(Value::Object(payload.clone())),
        Some(Value::Object(_)) => Err(InvokeError::InvalidArgument {
            name: PARAM_PAYLOAD.to_string(),
            message: "must not be empty".to_string(),
        }),
        Some(Value::Null) | None => Err(InvokeError::MissingArgument(PARAM_PAYLOAD)),
        Some(_) => Err(InvokeError::InvalidArgument {
            name: PARAM_PAYLOAD.to_string(),
            message: "must be an object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use ddi_store::models::HandlerOrigin;
    use serde_json::json;

    use super::*;

    fn operation(kind: OperationKind, resource_type: &str) -> HandlerDefinition {
        HandlerDefinition {
            name: ddi_store::schema::make_handler_name(kind, resource_type),
            description: String::new(),
            input_schema: json!({}),
            binding: HandlerBinding::Operation {
                kind,
                resource_type: resource_type.to_string(),
            },
            origin: HandlerOrigin::Compiled,
        }
    }

    fn build(handler: &HandlerDefinition, args: &Value) -> Result<RestRequest, InvokeError> {
        build_request(handler, args, &InvokeOptions::default())
    }

    #[test]
    fn list_defaults_and_caps_limit() {
        let handler = operation(OperationKind::List, "network");
        let request = build(&handler, &Value::Null).expect("list builds");
        assert_eq!(request.method, RestMethod::Get);
        assert_eq!(request.path, "network");
        assert_eq!(request.query_value("_max_results"), Some("100"));

        let request = build(&handler, &json!({"limit": 5000, "projection": "network,comment"}))
            .expect("list builds");
        assert_eq!(request.query_value("_max_results"), Some("1000"));
        assert_eq!(request.query_value("_return_fields"), Some("network,comment"));
    }

    #[test]
    fn search_with_attribute_filter_adds_extattrs() {
        let handler = operation(OperationKind::Search, "network");
        let request = build(&handler, &json!({"filters": {"*MARSHA": "NYCMQ"}})).expect("search builds");
        assert_eq!(request.query_value("*MARSHA"), Some("NYCMQ"));
        assert_eq!(request.query_value("_return_fields+"), Some("extattrs"));
        assert_eq!(request.query_value("_return_fields"), None);

        let request = build(
            &handler,
            &json!({"filters": {"*MARSHA": "NYCMQ"}, "projection": ["network"]}),
        )
        .expect("search builds");
        assert_eq!(request.query_value("_return_fields"), Some("network,extattrs"));
    }

    #[test]
    fn search_without_attribute_filter_keeps_projection() {
        let handler = operation(OperationKind::Search, "record:a");
        let request = build(&handler, &json!({"filters": {"name~": "web"}, "projection": ["name"]}))
            .expect("search builds");
        assert_eq!(request.query_value("name~"), Some("web"));
        assert_eq!(request.query_value("_return_fields"), Some("name"));
        assert!(matches!(
            build(&handler, &json!({})),
            Err(InvokeError::MissingArgument("filters"))
        ));
    }

    #[test]
    fn mutations_target_reference_or_type() {
        let reference = "network/ZG5zLm5ldHdvcmsk:10.0.0.0/24/default";
        let create = build(
            &operation(OperationKind::Create, "network"),
            &json!({"payload": {"network": "10.0.0.0/24"}}),
        )
        .expect("create builds");
        assert_eq!((create.method, create.path.as_str()), (RestMethod::Post, "network"));

        let update = build(
            &operation(OperationKind::Update, "network"),
            &json!({"ref": reference, "payload": {"comment": "core"}}),
        )
        .expect("update builds");
        assert_eq!((update.method, update.path.as_str()), (RestMethod::Put, reference));
        assert_eq!(update.body, Some(json!({"comment": "core"})));

        let delete = build(&operation(OperationKind::Delete, "network"), &json!({"ref": reference}))
            .expect("delete builds");
        assert_eq!(delete.method, RestMethod::Delete);
        assert!(build(&operation(OperationKind::Delete, "network"), &json!({"ref": "../grid"})).is_err());
        assert!(build(&operation(OperationKind::Create, "network"), &json!({"payload": {}})).is_err());
    }

    #[test]
    fn rest_bindings_pass_through_query_and_body() {
        let handler = HandlerDefinition {
            name: "Restart:services".to_string(),
            description: "Restart grid services".to_string(),
            input_schema: json!({}),
            binding: HandlerBinding::Rest {
                method: RestMethod::Post,
                path: "{ref}".to_string(),
            },
            origin: HandlerOrigin::Custom,
        };
        let request = build(
            &handler,
            &json!({"ref": "grid/b25lLmNsdXN0ZXIkMA:Infoblox", "query": {"_function": "restartservices"}, "body": {"member_order": "SIMULTANEOUSLY"}}),
        )
        .expect("rest builds");
        assert_eq!(request.path, "grid/b25lLmNsdXN0ZXIkMA:Infoblox");
        assert_eq!(request.query_value("_function"), Some("restartservices"));
        assert_eq!(request.body, Some(json!({"member_order": "SIMULTANEOUSLY"})));
    }
}
