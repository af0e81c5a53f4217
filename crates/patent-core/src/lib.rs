//! # patent-core
//!
//! Core types, traits, and abstractions for the patent-upload service.
//!
//! This crate provides the data structures shared by every stage of the
//! ingestion pipeline, the provider/store trait seams, and the translation
//! from structured filter requests to the provider's filter DSL.

pub mod dates;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use dates::parse_date;
pub use error::{Error, Result};
pub use filter::{translate, FieldRule, FIELD_TABLE};
pub use models::*;
pub use traits::*;
