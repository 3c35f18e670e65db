pub mod types;
pub mod filter;
pub mod filter_where;
pub mod error;

pub use types::*;
pub use error::FilterError;
pub use filter::Filter;

/// Table holding every document of every physical collection
pub const DOCUMENTS_TABLE: &str = "mws_documents";

/// Catalog of physical collection names
pub const COLLECTIONS_TABLE: &str = "mws_collections";
