/// State management module
///
/// This module handles the persisted catalog:
/// - Database connection, schema and writes (library.rs)
/// - Shared data structures (data.rs)
/// - Read-only image listing filters (query.rs)

pub mod data;
pub mod library;
pub mod query;
