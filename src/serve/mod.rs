//! Asset catalog server: discovers produced archives and publishes them over
//! HTTP with a generated index.

pub mod catalog;
mod error;
mod server;

pub use catalog::{format_size, CatalogEntry, RouteCache};
pub use error::ServeError;
pub use server::{catalog_router, CatalogServer, ServerConfig};
