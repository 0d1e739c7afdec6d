//! Lifecycle runner for event-driven plugins.
//!
//! Implement [`PluginHandler`] and hand it to [`run`]:
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let code = parley_plugin::plugin_runtime::run(MyPlugin::default(), RuntimeOptions::from_env()?).await;
//!     std::process::exit(code);
//! }
//! ```
//! The runner connects, pings, calls `on_initialize`, dispatches host events
//! until the host says `shutdown`, hangs up, or the process gets Ctrl-C, then
//! always calls `on_shutdown` and closes the connection.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::client::{HostClient, RpcHostClient};
use crate::config::ConnectionConfig;
use crate::message::{DialogChangedEvent, HostEvent, PanelEvent};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[async_trait]
pub trait PluginHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Called once after the connection is up. `Ok(false)` or an error aborts
    /// the plugin with exit code 1.
    async fn on_initialize(&mut self, host: Arc<dyn HostClient>) -> Result<bool>;

    /// Called exactly once on the way out. The host may already be gone.
    async fn on_shutdown(&mut self, host: Arc<dyn HostClient>, reason: &str);

    async fn on_dialog_changed(&mut self, _host: Arc<dyn HostClient>, _event: DialogChangedEvent) {}

    async fn on_node_selected(&mut self, _host: Arc<dyn HostClient>, _node_id: String) {}

    async fn on_panel_event(&mut self, _host: Arc<dyn HostClient>, _event: PanelEvent) {}
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub connection: ConnectionConfig,
}

impl RuntimeOptions {
    pub fn from_env() -> Result<Self> {
        Ok(Self { connection: ConnectionConfig::from_env()? })
    }
}

/// Connect to the host and drive `plugin`. Returns the process exit code.
pub async fn run<P: PluginHandler>(plugin: P, opts: RuntimeOptions) -> i32 {
    let addr = opts.connection.address();
    info!(plugin = plugin.name(), %addr, "connecting to host");
    let (client, events) = match RpcHostClient::connect(&opts.connection).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(plugin = plugin.name(), "connection failed: {e}");
            return 1;
        }
    };
    let host: Arc<dyn HostClient> = Arc::new(client);
    run_with(plugin, host, events, shutdown_signal()).await
}

/// Same as [`run`] on an existing client; `stop` resolves when the process
/// should shut down on its own accord.
pub async fn run_with<P, F>(
    mut plugin: P,
    host: Arc<dyn HostClient>,
    mut events: UnboundedReceiver<HostEvent>,
    stop: F,
) -> i32
where
    P: PluginHandler,
    F: std::future::Future<Output = ()> + Send,
{
    match host.ping().await {
        Ok(p) if p.status == "ok" => {}
        Ok(p) => {
            error!(status = %p.status, "ping failed");
            host.close().await;
            return 1;
        }
        Err(e) => {
            error!("ping failed: {e}");
            host.close().await;
            return 1;
        }
    }

    match plugin.on_initialize(host.clone()).await {
        Ok(true) => info!(plugin = plugin.name(), "plugin initialized successfully"),
        Ok(false) => {
            error!(plugin = plugin.name(), "plugin initialization failed");
            host.close().await;
            return 1;
        }
        Err(e) => {
            error!(plugin = plugin.name(), "exception during initialization: {e:#}");
            host.close().await;
            return 1;
        }
    }

    let reason = dispatch(&mut plugin, &host, &mut events, stop).await;

    plugin.on_shutdown(host.clone(), &reason).await;
    host.close().await;
    info!(plugin = plugin.name(), %reason, "plugin stopped");
    0
}

async fn dispatch<P, F>(
    plugin: &mut P,
    host: &Arc<dyn HostClient>,
    events: &mut UnboundedReceiver<HostEvent>,
    stop: F,
) -> String
where
    P: PluginHandler,
    F: std::future::Future<Output = ()> + Send,
{
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => {
                info!("received shutdown signal");
                return "shutdown".to_string();
            }
            ev = events.recv() => match ev {
                Some(HostEvent::Shutdown(s)) => {
                    return if s.reason.is_empty() { "host request".to_string() } else { s.reason };
                }
                Some(HostEvent::DialogChanged(d)) => plugin.on_dialog_changed(host.clone(), d).await,
                Some(HostEvent::NodeSelected(n)) => plugin.on_node_selected(host.clone(), n.node_id).await,
                Some(HostEvent::Panel(p)) => plugin.on_panel_event(host.clone(), p).await,
                None => {
                    warn!("host connection closed");
                    return "host disconnected".to_string();
                }
            }
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed we never resolve
/// and rely on the host's shutdown notification instead.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::Method;
    use crate::message::{NodeSelectedEvent, ShutdownEvent};
    use crate::test_util::MockHost;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        init_ok: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PluginHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_initialize(&mut self, host: Arc<dyn HostClient>) -> Result<bool> {
            host.show_notification("hi", "there").await?;
            Ok(self.init_ok)
        }

        async fn on_shutdown(&mut self, _host: Arc<dyn HostClient>, reason: &str) {
            self.seen.lock().unwrap().push(format!("shutdown:{reason}"));
        }

        async fn on_node_selected(&mut self, _host: Arc<dyn HostClient>, node_id: String) {
            self.seen.lock().unwrap().push(format!("node:{node_id}"));
        }
    }

    #[tokio::test]
    async fn events_are_dispatched_until_host_shutdown() {
        let mock = MockHost::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let plugin = Recorder { init_ok: true, seen: seen.clone() };
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(HostEvent::NodeSelected(NodeSelectedEvent { node_id: "npc_1".into() })).unwrap();
        tx.send(HostEvent::Shutdown(ShutdownEvent { reason: "host exiting".into() })).unwrap();

        let code = run_with(plugin, Arc::new(mock.clone()), rx, std::future::pending()).await;

        assert_eq!(code, 0);
        assert_eq!(*seen.lock().unwrap(), vec!["node:npc_1", "shutdown:host exiting"]);
        assert_eq!(mock.count(Method::Ping), 1);
        assert_eq!(mock.count(Method::ShowNotification), 1);
    }

    #[tokio::test]
    async fn failed_initialize_exits_with_one_and_skips_shutdown_hook() {
        let mock = MockHost::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let plugin = Recorder { init_ok: false, seen: seen.clone() };
        let (_tx, rx) = mpsc::unbounded_channel();

        let code = run_with(plugin, Arc::new(mock), rx, std::future::pending()).await;

        assert_eq!(code, 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_future_triggers_shutdown() {
        let mock = MockHost::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let plugin = Recorder { init_ok: true, seen: seen.clone() };
        let (_tx, rx) = mpsc::unbounded_channel();

        let code = run_with(plugin, Arc::new(mock), rx, async {}).await;

        assert_eq!(code, 0);
        assert_eq!(*seen.lock().unwrap(), vec!["shutdown:shutdown"]);
    }

    #[tokio::test]
    async fn unreachable_host_fails_the_ping() {
        let mock = MockHost::new();
        mock.set_unreachable(true);
        let (_tx, rx) = mpsc::unbounded_channel();
        let code = run_with(Recorder::default(), Arc::new(mock), rx, std::future::pending()).await;
        assert_eq!(code, 1);
    }
}
