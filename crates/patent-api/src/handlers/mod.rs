//! HTTP handlers for patent-api.

pub mod filter;
pub mod health;

pub use filter::filter_patents;
pub use health::health_check;
