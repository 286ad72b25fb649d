//! Core pipeline for ddi-mcp.
//!
//! This crate discovers the remote management API's schema, compiles it into
//! a catalog of invokable handlers, keeps that catalog in sync with upstream
//! drift, and builds the knowledge index used to pick handlers for
//! attribute-qualified queries.

pub mod cache;
pub mod catalog;
pub mod compiler;
pub mod control;
pub mod custom;
pub mod discovery;
pub mod fingerprint;
pub mod invoke;
pub mod knowledge;
pub mod query;
pub mod remote;
pub mod retry;
pub mod store;
pub mod upgrade;
pub mod validation;
