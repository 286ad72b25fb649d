//! MCP tool modules.
//!
//! Tools are grouped by domain: the live handler catalog and its
//! invocation, knowledge retrieval, and contextual help.

pub mod catalog;
pub mod knowledge;
mod context;
