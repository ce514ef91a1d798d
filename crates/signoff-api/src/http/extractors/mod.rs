//! Request extractors for authentication, query strings and path ids.

pub mod auth;
pub mod query;
