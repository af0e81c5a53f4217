//! Core data models for patent-upload.
//!
//! These types are shared across all patent-upload crates: the filter
//! request and its provider form, the normalized relational entities produced
//! by extraction, and the queue job messages.

pub mod filters;
pub mod job;
pub mod patent;

pub use filters::*;
pub use job::*;
pub use patent::*;
