//! Collaborators the coordinator depends on but does not own.

pub mod catalog;
pub mod shipping;

pub use catalog::{CatalogEntry, CatalogError, CatalogService, InMemoryCatalog};
pub use shipping::{InMemoryShippingService, ShippingError, ShippingService};
