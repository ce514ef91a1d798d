//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (signoff-infra) implements. Every write that must be audited takes the
//! audit entry as an argument so the implementation can persist both in one
//! transaction.

pub mod audit;
pub mod definition;
pub mod directory;
pub mod instance;
