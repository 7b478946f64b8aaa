//! Domain layer types and invariants.

pub mod artifact;
pub mod content;
pub mod entry;
pub mod error;
pub mod site;
