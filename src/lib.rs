//! ddns-server library
//!
//! An authoritative DNS responder for a single dynamic-DNS zone. It
//! answers A, AAAA, SOA and NS queries over UDP from a SQLite record
//! store fronted by a short-lived response cache, synthesizes answers
//! for backname and tunnel names, and carries an HTTP API for managing
//! records.

// Define modules
pub mod api;
pub mod authority;
pub mod cache;
pub mod codec;
pub mod config;
pub mod errors;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod store;
pub mod wire;

// Re-export commonly used items
pub use cache::ResponseCache;
pub use config::ServerConfig;
pub use errors::DnsError;
pub use resolver::Resolver;
pub use server::DnsServer;
pub use stats::QueryStats;
pub use store::RecordStore;
