//! Data model and naming helpers for ddi-mcp.
//!
//! This crate defines the canonical types shared by discovery, the tool
//! compiler, the knowledge builder, and the storage backends.

pub mod models;
pub mod schema;

pub use models::*;
