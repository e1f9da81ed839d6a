//! Tag catalog: hybrid tag / full-text search and weighted tag-set
//! similarity over a SQLite-backed media catalog.

pub mod cache;
pub mod catalog;
pub mod database;
pub mod error;
pub mod model;
pub mod search;
pub mod similarity;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use catalog::Catalog;
pub use error::{CatalogError, Result};
pub use search::{SearchPath, SearchResults};
pub use utils::CatalogConfig;
