//! # patent-provider
//!
//! Gateway to the upstream patent search provider.
//!
//! # Example
//!
//! ```rust,no_run
//! use patent_core::{translate, Filters, PatentProvider, ReturnFields};
//! use patent_provider::{HttpPatentProvider, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> patent_core::Result<()> {
//!     let provider = HttpPatentProvider::new(ProviderConfig::from_env()?)?;
//!     let filters = translate(&Filters::default())?.filter_set(ReturnFields::All);
//!     let stats = provider.statistics(&filters).await?;
//!     println!("{} patents", stats.total_found);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod gateway;

pub use config::ProviderConfig;
pub use gateway::{parse_statistics, HttpPatentProvider};
