//! Configuration for the DNS server.
//!
//! Settings come from `DDNS_*` environment variables with working
//! defaults, or wholesale from a JSON file named by `DDNS_CONFIG`.

use std::{
    env, fs,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use log::info;
use serde::Deserialize;

use crate::errors::DnsError;

/// Maximum size of DNS packets in bytes.
pub const MAX_PACKET_SIZE: usize = 4096;

/// Default port for the UDP DNS listener.
pub const DEFAULT_DNS_PORT: u16 = 5544;

/// Default port for the HTTP management API.
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the UDP DNS listener to.
    #[serde(default = "default_dns_bind")]
    pub dns_bind: SocketAddr,

    /// Address to bind the HTTP management API to.
    #[serde(default = "default_http_bind")]
    pub http_bind: SocketAddr,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// The zone this server answers for.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Primary nameserver name, used in SOA and NS answers.
    #[serde(default = "default_nameserver")]
    pub nameserver: String,

    /// Zone contact mailbox in DNS name form, used in SOA answers.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,

    /// Whether responses carry the AA flag.
    #[serde(default = "default_authoritative")]
    pub authoritative: bool,

    /// IPv4 address returned for tunnel names.
    #[serde(default = "default_tunnel_ipv4")]
    pub tunnel_ipv4: Ipv4Addr,

    /// IPv6 address returned for tunnel names.
    #[serde(default = "default_tunnel_ipv6")]
    pub tunnel_ipv6: Ipv6Addr,

    /// Base URL of the identity service used to verify API callers.
    /// Verification is skipped when unset.
    #[serde(default)]
    pub verify_url: Option<String>,
}

fn default_dns_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_DNS_PORT))
}

fn default_http_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT))
}

fn default_db_path() -> String {
    "./data/ddns.db".into()
}

fn default_zone() -> String {
    "example.com".into()
}

fn default_nameserver() -> String {
    "ns1.example.com".into()
}

fn default_mailbox() -> String {
    "hostmaster.example.com".into()
}

fn default_authoritative() -> bool {
    true
}

fn default_tunnel_ipv4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_tunnel_ipv6() -> Ipv6Addr {
    Ipv6Addr::UNSPECIFIED
}

impl ServerConfig {
    /// Load the server configuration.
    ///
    /// Reads the JSON file named by `DDNS_CONFIG` when that variable is
    /// set, otherwise assembles the configuration from individual
    /// `DDNS_*` environment variables.
    ///
    /// # Returns
    /// A `Result` containing either the loaded `ServerConfig` or a `DnsError`.
    pub fn load() -> Result<Self, DnsError> {
        if let Ok(path) = env::var("DDNS_CONFIG") {
            let raw = fs::read_to_string(&path)?;
            let mut config: ServerConfig = serde_json::from_str(&raw)
                .map_err(|e| DnsError::Config(format!("Invalid config file {}: {}", path, e)))?;
            config.normalize();
            info!("Loaded configuration from {}", path);
            return Ok(config);
        }
        Self::from_env()
    }

    /// Load server configuration from environment variables.
    ///
    /// # Returns
    /// A `Result` containing either the loaded `ServerConfig` or a `DnsError`.
    pub fn from_env() -> Result<Self, DnsError> {
        let dns_bind = match env::var("DDNS_BIND") {
            Ok(v) => v
                .parse()
                .map_err(|_| DnsError::Config("Invalid DDNS_BIND address".into()))?,
            Err(_) => default_dns_bind(),
        };
        let http_bind = match env::var("DDNS_HTTP_BIND") {
            Ok(v) => v
                .parse()
                .map_err(|_| DnsError::Config("Invalid DDNS_HTTP_BIND address".into()))?,
            Err(_) => default_http_bind(),
        };
        let tunnel_ipv4 = match env::var("DDNS_TUNNEL_IPV4") {
            Ok(v) => v
                .parse()
                .map_err(|_| DnsError::Config("Invalid DDNS_TUNNEL_IPV4 address".into()))?,
            Err(_) => default_tunnel_ipv4(),
        };
        let tunnel_ipv6 = match env::var("DDNS_TUNNEL_IPV6") {
            Ok(v) => v
                .parse()
                .map_err(|_| DnsError::Config("Invalid DDNS_TUNNEL_IPV6 address".into()))?,
            Err(_) => default_tunnel_ipv6(),
        };

        let mut config = Self {
            dns_bind,
            http_bind,
            db_path: env::var("DDNS_DB_PATH").unwrap_or_else(|_| default_db_path()),
            zone: env::var("DDNS_ZONE").unwrap_or_else(|_| default_zone()),
            nameserver: env::var("DDNS_NAMESERVER").unwrap_or_else(|_| default_nameserver()),
            mailbox: env::var("DDNS_MAILBOX").unwrap_or_else(|_| default_mailbox()),
            authoritative: env::var("DDNS_AUTHORITATIVE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or_else(|_| default_authoritative()),
            tunnel_ipv4,
            tunnel_ipv6,
            verify_url: env::var("DDNS_VERIFY_URL").ok(),
        };
        config.normalize();
        Ok(config)
    }

    /// Normalize the name-valued fields.
    ///
    /// The zone is compared case-insensitively without a trailing dot;
    /// nameserver and mailbox appear in answer RDATA and carry one.
    fn normalize(&mut self) {
        self.zone = self.zone.trim().trim_end_matches('.').to_ascii_lowercase();
        self.nameserver = self.nameserver.trim().to_ascii_lowercase();
        if !self.nameserver.ends_with('.') {
            self.nameserver.push('.');
        }
        self.mailbox = self.mailbox.trim().to_ascii_lowercase();
        if !self.mailbox.ends_with('.') {
            self.mailbox.push('.');
        }
        if self.verify_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.verify_url = None;
        }
    }
}
