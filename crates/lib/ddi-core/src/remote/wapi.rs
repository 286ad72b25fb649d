use std::path::PathBuf;
use std::time::Duration;

use ddi_store::models::{AttributeDefinition, FieldDescriptor, ResourceTypeDescriptor, RestMethod};
use futures::future::BoxFuture;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::debug;

use super::{CatalogSource, Invoker, RemoteError, RestRequest};
use crate::retry::{RetryPolicy, with_retry};

/// Resource types probed when the remote cannot enumerate its own objects.
pub const WELL_KNOWN_RESOURCE_TYPES: &[&str] = &[
    "network",
    "networkcontainer",
    "networkview",
    "ipv6network",
    "ipv6networkcontainer",
    "range",
    "ipv6range",
    "fixedaddress",
    "ipv6fixedaddress",
    "record:a",
    "record:aaaa",
    "record:ptr",
    "record:cname",
    "record:mx",
    "record:txt",
    "record:srv",
    "record:host",
    "record:ns",
    "zone_auth",
    "zone_forward",
    "zone_delegated",
    "zone_stub",
    "view",
    "member",
    "grid",
    "dhcpfailover",
    "adminuser",
    "admingroup",
    "permission",
    "lease",
    "roaminghost",
    "sharednetwork",
    "ipv6sharednetwork",
    "dhcpoptiondefinition",
    "ipv6dhcpoptiondefinition",
    "extensibleattributedef",
    "vlanview",
    "vlan",
    "discovery:device",
    "discovery:deviceinterface",
    "networkuser",
    "macfilteraddress",
    "threatprotection:profile",
    "threatprotection:rule",
];

const ATTRIBUTE_DEFINITION_TYPE: &str = "extensibleattributedef";
const ATTRIBUTE_DEFINITION_FIELDS: &str = "name,comment,type,list_values";

#[derive(Debug, Clone)]
pub struct WapiClientConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub version: String,
    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub fallback_types: Vec<String>,
}

impl WapiClientConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            version: "v2.13.1".to_string(),
            verify_tls: true,
            ca_bundle: None,
            retry: RetryPolicy::default(),
            fallback_types: WELL_KNOWN_RESOURCE_TYPES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub const fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    #[must_use]
    pub fn with_ca_bundle(mut self, ca_bundle: Option<PathBuf>) -> Self {
        self.ca_bundle = ca_bundle;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_fallback_types(mut self, fallback_types: Vec<String>) -> Self {
        if !fallback_types.is_empty() {
            self.fallback_types = fallback_types;
        }
        self
    }

    /// Base URL of the versioned WAPI endpoint.
    #[must_use]
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        format!("{host}/wapi/{}", self.version)
    }
}

/// HTTP client for the remote WAPI endpoint.
#[derive(Debug, Clone)]
pub struct WapiClient {
    http: Client,
    config: WapiClientConfig,
    base_url: String,
}

impl WapiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    /// Returns `RemoteError` if the CA bundle cannot be read or the HTTP
    /// client cannot be constructed.
    pub fn new(config: WapiClientConfig) -> Result<Self, RemoteError> {
        let mut builder = Client::builder()
            .timeout(config.retry.timeout)
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(!config.verify_tls);
        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|err| {
                RemoteError::Transport(format!("failed to read CA bundle {}: {err}", path.display()))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(certificate);
        }
        let http = builder.build()?;
        let base_url = config.base_url();
        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: &RestRequest) -> Result<Value, RemoteError> {
        let method = match request.method {
            RestMethod::Get => Method::GET,
            RestMethod::Post => Method::POST,
            RestMethod::Put => Method::PUT,
            RestMethod::Delete => Method::DELETE,
        };
        let url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));
        debug!(method = %request.method, path = %request.path, "wapi request");
        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(reqwest::header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(RemoteError::NotFound(request.path.clone()));
            }
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message: extract_error_text(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(json!({"success": true, "message": "Operation completed"}));
        }
        serde_json::from_str(&text).map_err(|err| RemoteError::Decode(err.to_string()))
    }

    async fn execute_with_retry(&self, request: RestRequest) -> Result<Value, RemoteError> {
        let label = format!("{} {}", request.method, request.path);
        let policy = retry_policy_for(self.config.retry, request.method);
        with_retry(&policy, &label, || self.send(&request)).await
    }

    async fn enumerate(&self) -> Result<Vec<String>, RemoteError> {
        let request = RestRequest::new(RestMethod::Get, "?_schema");
        match self.execute_with_retry(request).await {
            Ok(value) => {
                let mut types = parse_supported_objects(&value);
                if types.is_empty() {
                    debug!("remote did not list supported objects; using fallback types");
                    types.clone_from(&self.config.fallback_types);
                }
                Ok(types)
            }
            Err(RemoteError::NotFound(_) | RemoteError::Decode(_)) => {
                Ok(self.config.fallback_types.clone())
            }
            Err(err) => Err(err),
        }
    }

    async fn schema(&self, resource_type: &str) -> Result<ResourceTypeDescriptor, RemoteError> {
        let request = RestRequest::new(RestMethod::Get, format!("{resource_type}?_schema"));
        let value = self.execute_with_retry(request).await?;
        parse_schema(resource_type, &value)
    }

    async fn attribute_definitions(&self) -> Result<Vec<AttributeDefinition>, RemoteError> {
        let request = RestRequest::new(RestMethod::Get, ATTRIBUTE_DEFINITION_TYPE)
            .with_query("_return_fields", ATTRIBUTE_DEFINITION_FIELDS);
        let value = self.execute_with_retry(request).await?;
        parse_attribute_definitions(&value)
    }
}

impl CatalogSource for WapiClient {
    fn list_resource_types(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>> {
        Box::pin(self.enumerate())
    }

    fn fetch_schema<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> BoxFuture<'a, Result<ResourceTypeDescriptor, RemoteError>> {
        Box::pin(self.schema(resource_type))
    }

    fn fetch_attribute_definitions(
        &self,
    ) -> BoxFuture<'_, Result<Vec<AttributeDefinition>, RemoteError>> {
        Box::pin(self.attribute_definitions())
    }
}

impl Invoker for WapiClient {
    fn execute(&self, request: RestRequest) -> BoxFuture<'_, Result<Value, RemoteError>> {
        Box::pin(self.execute_with_retry(request))
    }
}

/// Reads retry transient failures. Writes get one attempt, since a write that
/// timed out may still have been applied remotely.
#[must_use]
pub const fn retry_policy_for(policy: RetryPolicy, method: RestMethod) -> RetryPolicy {
    if method.is_read() {
        policy
    } else {
        policy.single_attempt()
    }
}

fn extract_error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("text")
                .or_else(|| value.get("Error"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn parse_supported_objects(value: &Value) -> Vec<String> {
    let mut types: Vec<String> = value
        .get("supported_objects")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    types.sort();
    types.dedup();
    types
}

/// Parses a `<type>?_schema` response into a descriptor.
///
/// # Errors
/// Returns `RemoteError::Decode` when the response carries no field list.
pub fn parse_schema(resource_type: &str, value: &Value) -> Result<ResourceTypeDescriptor, RemoteError> {
    let fields = value
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::Decode(format!("schema for {resource_type} has no fields")))?;
    let fields = fields.iter().filter_map(parse_field).collect();
    Ok(ResourceTypeDescriptor::new(resource_type, fields))
}

fn parse_field(value: &Value) -> Option<FieldDescriptor> {
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let type_tag = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        Some(Value::Array(tags)) => tags
            .first()
            .and_then(Value::as_str)
            .unwrap_or("string")
            .to_string(),
        _ => "string".to_string(),
    };
    let searchable = match value.get("searchable_by") {
        Some(Value::String(modifiers)) => !modifiers.is_empty(),
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    };
    let read_only = value
        .get("supports")
        .and_then(Value::as_str)
        .is_some_and(|supports| !supports.contains('w'));
    let required = value
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Some(FieldDescriptor {
        name: name.to_string(),
        type_tag,
        required,
        searchable,
        read_only,
    })
}

/// Parses the attribute definition listing.
///
/// # Errors
/// Returns `RemoteError::Decode` when the response is not an array.
pub fn parse_attribute_definitions(value: &Value) -> Result<Vec<AttributeDefinition>, RemoteError> {
    let items = value
        .as_array()
        .ok_or_else(|| RemoteError::Decode("attribute definitions are not a list".to_string()))?;
    let mut definitions: Vec<AttributeDefinition> = items
        .iter()
        .filter_map(|item| {
            let name = item.get("name")?.as_str()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let value_type = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("STRING")
                .to_string();
            let allowed_values = item
                .get("list_values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|entry| match entry {
                            Value::String(text) => Some(text.clone()),
                            Value::Object(map) => map
                                .get("value")
                                .and_then(Value::as_str)
                                .map(ToString::to_string),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            let comment = item
                .get("comment")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(ToString::to_string);
            Some(AttributeDefinition {
                name,
                value_type,
                allowed_values,
                comment,
            })
        })
        .collect();
    definitions.sort_by(|left, right| left.name.cmp(&right.name));
    definitions.dedup_by(|left, right| left.name == right.name);
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_defaults_to_https() {
        let config = WapiClientConfig::new("gm.example.net/", "admin", "secret");
        assert_eq!(config.base_url(), "https://gm.example.net/wapi/v2.13.1");
        let config = WapiClientConfig::new("http://127.0.0.1:8080", "admin", "secret")
            .with_version("v2.12");
        assert_eq!(config.base_url(), "http://127.0.0.1:8080/wapi/v2.12");
    }

    #[test]
    fn schema_fields_map_flags() {
        let value = json!({
            "fields": [
                {"name": "network", "type": ["string"], "searchable_by": "=~<>", "supports": "rwus", "required": true},
                {"name": "network_view", "type": "string", "searchable_by": "", "supports": "r"},
                {"name": "", "type": "string"}
            ]
        });
        let descriptor = parse_schema("network", &value).expect("schema should parse");
        assert_eq!(descriptor.fields.len(), 2);
        let network = &descriptor.fields[0];
        assert!(network.required && network.searchable && !network.read_only);
        let view = &descriptor.fields[1];
        assert!(!view.searchable && view.read_only);
    }

    #[test]
    fn only_reads_are_retried() {
        let policy = RetryPolicy::default().with_max_attempts(4);
        assert_eq!(retry_policy_for(policy, RestMethod::Get).max_attempts, 4);
        for method in [RestMethod::Post, RestMethod::Put, RestMethod::Delete] {
            let effective = retry_policy_for(policy, method);
            assert_eq!(effective.max_attempts, 1, "{method} must not be resent");
            assert_eq!(effective.timeout, policy.timeout);
        }
    }

    #[test]
    fn schema_without_fields_is_rejected() {
        assert!(parse_schema("grid", &json!({"error": "nope"})).is_err());
    }

    #[test]
    fn attribute_definitions_accept_both_list_value_shapes() {
        let value = json!([
            {"name": "Site", "type": "ENUM", "list_values": [{"value": "HQ"}, "Lab"], "comment": " "},
            {"name": "MARSHA", "type": "STRING", "comment": "Property code"}
        ]);
        let definitions = parse_attribute_definitions(&value).expect("definitions should parse");
        assert_eq!(definitions[0].name, "MARSHA");
        assert_eq!(definitions[0].comment.as_deref(), Some("Property code"));
        assert_eq!(definitions[1].allowed_values, vec!["HQ", "Lab"]);
        assert!(definitions[1].comment.is_none());
    }
}
