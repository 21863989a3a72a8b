//! Satellite pass catalog.
//!
//! Watches the output tree of a satellite decoder (one directory per pass)
//! and keeps a SQLite catalog of passes and the images they produced.

pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod state;
pub mod sync;

pub use error::{CatalogError, Result};
pub use ingest::composite::{display_label, CompositeCatalog, CompositeEntry, COMPOSITE_TYPES};
pub use ingest::stability::{is_stable, StabilityPolicy};
pub use state::library::Library;
pub use sync::{SyncEngine, SyncMode, SyncReport, UpdateGate};
