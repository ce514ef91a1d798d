//! Infrastructure layer for Signoff.
//!
//! Contains implementations of the repository traits defined in
//! `signoff-core`: SQLite storage, configuration loading, data directory
//! resolution and SHA-256 token hashing.

pub mod config;
pub mod hash;
pub mod sqlite;
