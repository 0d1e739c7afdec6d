use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use parley_plugin::{
    HostClient,
    config::load_dotenv,
    logger::init_tracing,
    plugin_runtime::{PluginHandler, RuntimeOptions, run},
};
use tracing::{info, warn};

/// Shows a welcome notification when activated and a goodbye when shut down.
#[derive(Debug, Default)]
struct HelloWorld;

#[async_trait]
impl PluginHandler for HelloWorld {
    fn name(&self) -> &str {
        "hello_world"
    }

    async fn on_initialize(&mut self, host: Arc<dyn HostClient>) -> Result<bool> {
        info!("hello world plugin activating");
        host.show_notification("Hello World! \u{1F44B}", "The Hello World plugin is now active and ready to use!")
            .await?;

        tokio::time::sleep(Duration::from_secs(2)).await;

        host.show_notification("Plugin Status", "Everything is working perfectly!").await?;
        info!("hello world plugin activated");
        Ok(true)
    }

    async fn on_shutdown(&mut self, host: Arc<dyn HostClient>, reason: &str) {
        info!(%reason, "hello world plugin deactivating");
        if let Err(e) = host.show_notification("Goodbye! \u{1F44B}", "Hello World plugin is shutting down.").await {
            warn!("goodbye notification failed: {e}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv(None);
    let _guard = init_tracing("info", None, "hello_world.log")?;
    let code = run(HelloWorld, RuntimeOptions::from_env()?).await;
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_plugin::jsonrpc::Method;
    use parley_plugin::message::{HostEvent, ShutdownEvent};
    use parley_plugin::plugin_runtime::run_with;
    use parley_plugin::test_util::MockHost;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn greets_then_says_goodbye() {
        let mock = MockHost::new();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(HostEvent::Shutdown(ShutdownEvent { reason: "closing".into() })).unwrap();

        let started = tokio::time::Instant::now();
        let code = run_with(HelloWorld, Arc::new(mock.clone()), rx, std::future::pending()).await;

        assert_eq!(code, 0);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            mock.args(Method::ShowNotification),
            vec!["Hello World! \u{1F44B}", "Plugin Status", "Goodbye! \u{1F44B}"]
        );
    }

    #[tokio::test]
    async fn denied_notifications_abort_activation() {
        let mock = MockHost::new();
        mock.deny(Method::ShowNotification);
        let (_tx, rx) = mpsc::unbounded_channel();

        let code = run_with(HelloWorld, Arc::new(mock), rx, std::future::pending()).await;
        assert_eq!(code, 1);
    }
}
