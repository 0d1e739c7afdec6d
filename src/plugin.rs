use std::sync::Arc;

use anyhow::{Context, Result, bail};
use parley_plugin::HostClient;
use parley_plugin::message::{HostEvent, PanelPosition, RegisterPanelParams, RenderMode};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::render::Renderer;
use crate::sync::{StopReason, SyncConfig, SyncLoop};

pub const PANEL_TITLE: &str = "Flowchart View";

/// The Flowchart View plugin: a [`SyncLoop`] plus its panel lifecycle.
pub struct FlowchartPlugin {
    sync: SyncLoop,
}

impl FlowchartPlugin {
    pub fn new(host: Arc<dyn HostClient>, renderer: Arc<Renderer>, config: SyncConfig) -> Self {
        Self { sync: SyncLoop::new(host, renderer, config) }
    }

    pub fn sync(&self) -> &SyncLoop {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncLoop {
        &mut self.sync
    }

    /// Check the host answers, register the panel and paint the first page.
    /// A refused panel registration is not fatal; the loop then only polls.
    pub async fn initialize(&mut self) -> Result<()> {
        let host = self.sync.host().clone();
        let pong = host.ping().await.context("host did not answer ping")?;
        if pong.status != "ok" {
            bail!("host ping returned status `{}`", pong.status);
        }

        let params = RegisterPanelParams {
            position: PanelPosition::Right,
            render_mode: RenderMode::Webview,
            initial_width: 600,
            initial_height: 400,
            can_float: true,
            can_close: true,
            ..RegisterPanelParams::new(self.sync.config().panel_id.clone(), PANEL_TITLE)
        };
        match host.register_panel(params).await {
            Ok(actual_id) => {
                info!(panel_id = %actual_id, "panel registered");
                self.sync.mark_registered(actual_id);
                if let Err(e) = self.sync.push_placeholder().await {
                    warn!("{e:#}");
                }
            }
            Err(e) => warn!("panel registration failed, continuing without a panel: {e}"),
        }

        let outcome = self.sync.refresh_document().await.context("initial refresh failed")?;
        debug!(?outcome, "initial refresh");
        Ok(())
    }

    pub async fn run(&mut self, events: UnboundedReceiver<HostEvent>, cancel: CancellationToken) -> StopReason {
        self.sync.run(events, cancel).await
    }

    pub async fn shutdown(&mut self, reason: &StopReason) {
        self.sync.shutdown(reason).await;
    }

    /// Initialize, run until stopped, and always shut down. Returns the
    /// process exit code.
    pub async fn run_to_completion(mut self, events: UnboundedReceiver<HostEvent>, cancel: CancellationToken) -> i32 {
        let (reason, code) = match self.initialize().await {
            Ok(()) => (self.run(events, cancel).await, 0),
            Err(e) => {
                error!("initialization failed: {e:#}");
                (StopReason::InitFailed, 1)
            }
        };
        self.shutdown(&reason).await;
        code
    }
}
