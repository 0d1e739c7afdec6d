use std::{env, path::Path, time::Duration};

use anyhow::{Context, Result};
use tracing::{debug, info};

pub const PORT_ENV: &str = "PARLEY_RPC_PORT";
pub const HOST_ENV: &str = "PARLEY_RPC_HOST";
pub const CALL_TIMEOUT_ENV: &str = "PARLEY_CALL_TIMEOUT_MS";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 5_000;

/// Where the host listens and how long a single call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub call_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    /// The host exports the port into the plugin's environment when it
    /// launches it; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let port = env::var(PORT_ENV)
            .with_context(|| format!("{PORT_ENV} environment variable not set"))?;
        let port = port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("{PORT_ENV}={port} is not a valid port"))?;

        let mut cfg = Self::new(port);
        if let Ok(host) = env::var(HOST_ENV) {
            if !host.trim().is_empty() {
                cfg.host = host.trim().to_string();
            }
        }
        if let Ok(ms) = env::var(CALL_TIMEOUT_ENV) {
            let ms = ms
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{CALL_TIMEOUT_ENV}={ms} is not a number"))?;
            cfg.call_timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Best-effort `.env` loading; a missing file is not an error.
pub fn load_dotenv(path: Option<&Path>) {
    match path {
        Some(p) if p.exists() => {
            if dotenvy::from_path(p).is_ok() {
                info!("Loaded .env from {}", p.display());
            }
        }
        Some(p) => debug!("no .env at {}", p.display()),
        None => {
            if let Ok(p) = dotenvy::dotenv() {
                debug!("Loaded .env from {}", p.display());
            }
        }
    }
}
