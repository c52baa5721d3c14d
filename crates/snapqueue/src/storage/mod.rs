//! Storage module for persistent data storage
//!
//! Provides SQLite-based persistence for the task history.

mod database;

pub use database::{HistoryDb, HistoryDbStats};
