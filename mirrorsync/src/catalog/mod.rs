//! Metadata catalog: dataset definitions, destination field types and export schedules.

mod base;
pub mod memory;
pub mod mysql;

pub use base::{ANY_SCHEMA, CatalogSnapshot, MetadataCatalog, ScheduledTask};
