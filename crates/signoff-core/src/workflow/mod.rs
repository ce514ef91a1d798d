//! Pure workflow rules: definition parsing and validation, transition
//! conditions and step authorization gates.
//!
//! Nothing in this module touches storage or the clock.

pub mod authorize;
pub mod condition;
pub mod definition;
