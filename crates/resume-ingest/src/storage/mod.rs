//! Storage module for durable job state
//!
//! Provides SQLite-based persistence for jobs, per-file results and sink flush tracking.

mod database;

pub use database::JobStore;
