//! Data ingestion and storage
//!
//! USCF page scraping and SQLite database management.

pub mod database;
pub mod scrapers;

pub use database::{Database, DatabaseStats};
