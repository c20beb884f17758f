use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Vendor selection per §6.1: a file-backed engine (`sqlite`) or a
/// networked, server-based engine. The original supports Oracle for the
/// networked case; this implementation targets Postgres instead, since
/// that's the only networked `sqlx` driver available (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Sqlite,
    Postgres,
}

impl Vendor {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Vendor::Sqlite),
            "oracle" | "postgres" | "postgresql" => Some(Vendor::Postgres),
            _ => None,
        }
    }
}

/// Connection pool parameters, taken verbatim from the `DATABASE` section
/// of the configuration file (§6.1).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub vendor: Vendor,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub sid: Option<String>,
    pub service_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_identifier_length: usize,
    pub max_overflow: u32,
    pub pool_pre_ping: bool,
    pub pool_size: u32,
    pub pool_recycle: Option<Duration>,
    pub pool_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            vendor: Vendor::Postgres,
            host: None,
            port: None,
            path: None,
            sid: None,
            service_name: None,
            username: None,
            password: None,
            max_identifier_length: 128,
            max_overflow: 10,
            pool_pre_ping: true,
            pool_size: 5,
            pool_recycle: None,
            pool_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Build the connection URL this configuration describes.
    pub fn connect_url(&self) -> String {
        match self.vendor {
            Vendor::Sqlite => {
                let path = self.path.as_deref().unwrap_or("rapo.db");
                format!("sqlite://{path}")
            }
            Vendor::Postgres => {
                let host = self.host.as_deref().unwrap_or("127.0.0.1");
                let port = self.port.unwrap_or(5432);
                let user = self.username.as_deref().unwrap_or("rapo");
                let password = self.password.as_deref().unwrap_or("");
                let database = self
                    .service_name
                    .as_deref()
                    .or(self.sid.as_deref())
                    .unwrap_or("rapo");
                format!("postgres://{user}:{password}@{host}:{port}/{database}")
            }
        }
    }
}

/// Build a Postgres pool from the given configuration, applying pre-ping,
/// size, overflow and recycle settings the way `agent/src/main.rs` wires
/// its own `PgPoolOptions`.
pub async fn connect(config: &PoolConfig) -> Result<sqlx::PgPool> {
    let mut options = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.pool_size + config.max_overflow)
        .acquire_timeout(config.pool_timeout);

    if let Some(recycle) = config.pool_recycle {
        options = options.max_lifetime(recycle);
    }
    if config.pool_pre_ping {
        options = options.test_before_acquire(true);
    }

    options
        .connect(&config.connect_url())
        .await
        .map_err(GatewayError::Connect)
}
