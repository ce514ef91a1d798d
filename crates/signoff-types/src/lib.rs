//! Shared domain types for Signoff.
//!
//! Workflow definitions, request instances, the directory (users, roles,
//! permissions), audit entries, configuration and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod audit;
pub mod config;
pub mod definition;
pub mod directory;
pub mod error;
pub mod event;
pub mod id;
pub mod instance;
