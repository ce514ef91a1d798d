//! Workflow engine, services and repository trait definitions for Signoff.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `signoff-types` -- never on
//! `signoff-infra` or any database/IO crate.

pub mod clock;
pub mod engine;
pub mod event;
pub mod repository;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
