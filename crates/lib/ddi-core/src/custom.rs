//! Operator-authored handlers, loaded read-only from a JSON file.

use std::path::{Path, PathBuf};

use ddi_store::models::{HandlerDefinition, HandlerOrigin};
use tracing::{debug, warn};

/// Read-only view of the custom handler file.
///
/// The file holds a JSON array of handler definitions. Compilation never
/// writes to it.
#[derive(Debug, Clone)]
pub struct CustomHandlerStore {
    path: Option<PathBuf>,
}

impl CustomHandlerStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store with no backing file; always loads an empty set.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { path: None }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads the current custom handler set.
    ///
    /// A missing file yields an empty set. An unreadable or malformed file is
    /// logged and also yields an empty set so compiled handlers stay usable.
    pub async fn load(&self) -> Vec<HandlerDefinition> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no custom handler file");
                return Vec::new();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read custom handlers");
                return Vec::new();
            }
        };
        match parse_custom_handlers(&raw) {
            Ok(handlers) => handlers,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed custom handler file");
                Vec::new()
            }
        }
    }
}

/// Parses a JSON array of handler definitions and tags them as custom.
///
/// Entries with a blank name are dropped.
///
/// # Errors
/// Returns the JSON error when the document is not an array of handlers.
pub fn parse_custom_handlers(raw: &str) -> Result<Vec<HandlerDefinition>, serde_json::Error> {
    let handlers: Vec<HandlerDefinition> = serde_json::from_str(raw)?;
    Ok(handlers
        .into_iter()
        .filter(|handler| !handler.name.trim().is_empty())
        .map(|mut handler| {
            handler.origin = HandlerOrigin::Custom;
            handler
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use ddi_store::models::{HandlerBinding, OperationKind};

    use super::*;

    const CUSTOM_JSON: &str = r#"[
        {
            "name": "Search:network",
            "description": "Site-aware network search",
            "input_schema": {"type": "object"},
            "binding": "operation",
            "kind": "Search",
            "resource_type": "network",
            "origin": "compiled"
        },
        {
            "name": "  ",
            "description": "blank",
            "input_schema": {},
            "binding": "rest",
            "method": "GET",
            "path": "grid"
        }
    ]"#;

    #[test]
    fn parsed_handlers_are_forced_custom() {
        let handlers = parse_custom_handlers(CUSTOM_JSON).expect("custom json parses");
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].origin, HandlerOrigin::Custom);
        assert_eq!(
            handlers[0].binding,
            HandlerBinding::Operation {
                kind: OperationKind::Search,
                resource_type: "network".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_load_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = CustomHandlerStore::new(dir.path().join("absent.json"));
        assert!(missing.load().await.is_empty());

        let corrupt_path = dir.path().join("custom.json");
        std::fs::write(&corrupt_path, "{not json").expect("write corrupt file");
        assert!(CustomHandlerStore::new(&corrupt_path).load().await.is_empty());

        std::fs::write(&corrupt_path, CUSTOM_JSON).expect("write custom file");
        assert_eq!(CustomHandlerStore::new(&corrupt_path).load().await.len(), 1);
    }
}
