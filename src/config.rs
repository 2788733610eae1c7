//! Server configuration
//!
//! Read from the process environment (after `.env` is loaded by the binary).
//! Database settings live in `database::DatabaseConfig`.

use std::net::SocketAddr;
use std::str::FromStr;

/// Page size used when `PETS_PAGE_SIZE` is not set
pub const DEFAULT_PAGE_SIZE: u64 = 2;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which Entity Store backend the server runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub page_size: u64,
    pub store: StoreBackend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            page_size: DEFAULT_PAGE_SIZE,
            store: StoreBackend::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `PETS_BIND_ADDR`, `PETS_PAGE_SIZE` and `PETS_STORE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = parse_var(&lookup, "PETS_BIND_ADDR", defaults.bind_addr, |v| {
            v.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;

        let page_size = parse_var(&lookup, "PETS_PAGE_SIZE", defaults.page_size, |v| {
            match v.parse::<u64>() {
                Ok(0) => Err("page size must be at least 1".to_string()),
                Ok(n) => Ok(n),
                Err(e) => Err(e.to_string()),
            }
        })?;

        let store = parse_var(&lookup, "PETS_STORE", defaults.store, StoreBackend::from_str)?;

        Ok(Self {
            bind_addr,
            page_size,
            store,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => parse(value.trim()).map_err(|reason| ConfigError::InvalidValue {
            key,
            value,
            reason,
        }),
    }
}
