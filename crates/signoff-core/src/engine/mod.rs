//! The decision engine: resolving outcomes against a frozen transition
//! table, applying them under a per-instance lock, and sweeping for SLA
//! breaches.

pub mod executor;
pub mod sla;
pub mod transition;

pub use executor::StepExecutor;
pub use sla::SlaSweeper;
pub use transition::{Decision, Resolution};
