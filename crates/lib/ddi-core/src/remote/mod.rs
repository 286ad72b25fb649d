//! Boundary to the remote management API.
//!
//! The core only talks to the remote through [`CatalogSource`] (read-only
//! schema and attribute discovery) and [`Invoker`] (generic REST execution).
//! [`WapiClient`] implements both over HTTP.

use std::{error::Error, fmt};

use ddi_store::models::{AttributeDefinition, ResourceTypeDescriptor, RestMethod};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod wapi;

pub use wapi::{WapiClient, WapiClientConfig};

#[derive(Debug)]
pub enum RemoteError {
    Timeout,
    Transport(String),
    Status { status: u16, message: String },
    Decode(String),
    NotFound(String),
}

impl RemoteError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "remote call timed out"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Status { status, message } => write!(f, "remote returned {status}: {message}"),
            Self::Decode(message) => write!(f, "failed to decode remote response: {message}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl Error for RemoteError {}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A fully translated REST call, ready for the generic client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestRequest {
    pub method: RestMethod,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(method: RestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the first query value for `key`.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Read-only discovery surface of the remote API.
pub trait CatalogSource: Send + Sync {
    /// Enumerates every resource type name the remote exposes.
    fn list_resource_types(&self) -> BoxFuture<'_, Result<Vec<String>, RemoteError>>;

    /// Fetches the field schema for one resource type.
    fn fetch_schema<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> BoxFuture<'a, Result<ResourceTypeDescriptor, RemoteError>>;

    /// Fetches all dynamic attribute definitions.
    fn fetch_attribute_definitions(
        &self,
    ) -> BoxFuture<'_, Result<Vec<AttributeDefinition>, RemoteError>>;
}

/// Generic executor for translated REST calls.
pub trait Invoker: Send + Sync {
    fn execute(&self, request: RestRequest) -> BoxFuture<'_, Result<Value, RemoteError>>;
}
