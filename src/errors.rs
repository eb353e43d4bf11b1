//! Error types for the DNS server.
//!
//! This module defines the error types used throughout the server.

use thiserror::Error;

/// Represents errors that can occur while running the server.
#[derive(Error, Debug)]
pub enum DnsError {
    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database errors from rusqlite.
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// Connection pool errors from r2d2.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),
}
