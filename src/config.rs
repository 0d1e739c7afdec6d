use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use parley_plugin::config::{
    CALL_TIMEOUT_ENV, ConnectionConfig, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_HOST, HOST_ENV, PORT_ENV,
};

use crate::sync::{DEFAULT_FAILURE_LOG_EVERY, DEFAULT_PANEL_ID, DEFAULT_POLL_INTERVAL_MS, SyncConfig};

pub const POLL_INTERVAL_ENV: &str = "FLOWCHART_POLL_INTERVAL_MS";
pub const FAILURE_LOG_EVERY_ENV: &str = "FLOWCHART_FAILURE_LOG_EVERY";
pub const ASSETS_DIR_ENV: &str = "FLOWCHART_ASSETS_DIR";

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Port of the host's plugin RPC server (set by the host when it launches us)
    #[arg(long, env = PORT_ENV)]
    pub port: Option<u16>,

    #[arg(long, env = HOST_ENV, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Per-call timeout in milliseconds
    #[arg(long, env = CALL_TIMEOUT_ENV, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    pub call_timeout_ms: u64,

    #[arg(long, env = POLL_INTERVAL_ENV, default_value_t = DEFAULT_POLL_INTERVAL_MS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Log only every Nth consecutive structure fetch failure
    #[arg(long, env = FAILURE_LOG_EVERY_ENV, default_value_t = DEFAULT_FAILURE_LOG_EVERY)]
    pub failure_log_every: u32,

    /// Directory holding templates/, static/ and vendor/ (defaults to `assets/` next to the binary)
    #[arg(long, env = ASSETS_DIR_ENV)]
    pub assets_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_PANEL_ID)]
    pub panel_id: String,

    /// Log level (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Also write daily-rolling log files here
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FlowchartConfig {
    pub connection: ConnectionConfig,
    pub sync: SyncConfig,
    pub assets_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl FlowchartConfig {
    pub fn from_args(args: RunArgs) -> Result<Self> {
        let port = args
            .port
            .with_context(|| format!("{PORT_ENV} environment variable not set (is the plugin running inside Parley?)"))?;

        let connection = ConnectionConfig {
            host: args.host,
            port,
            call_timeout: Duration::from_millis(args.call_timeout_ms),
        };
        let sync = SyncConfig {
            panel_id: args.panel_id,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            failure_log_every: args.failure_log_every,
        };

        Ok(Self {
            connection,
            sync,
            assets_dir: args.assets_dir.or_else(default_assets_dir),
            log_level: args.log_level,
            log_dir: args.log_dir,
        })
    }
}

fn default_assets_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let dir = exe.parent()?.join("assets");
    dir.is_dir().then_some(dir)
}
