//! HTTP request handlers for the REST API.

pub mod admin;
pub mod audit;
pub mod directory;
pub mod request;
pub mod workflow;
