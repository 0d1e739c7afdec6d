//! Keeps the flowchart panel in step with the dialog open in the host.
//!
//! One task owns a [`SyncLoop`]. It polls the host on a fixed interval and
//! receives host notifications on the same `select!`, so every field of
//! [`SyncState`] has exactly one writer.
//!
//! Selection is synced asymmetrically. A selection made in the host is only
//! recorded, because regenerating the page would wipe the highlight the user
//! set inside the panel. A selection made in the panel is relayed to the host,
//! and recorded first so the next poll does not treat it as a foreign change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parley_plugin::HostClient;
use parley_plugin::message::{
    ContentType, DocumentHandle, HostEvent, PanelEvent, PanelEventKind, PanelPreferences, StructureSnapshot,
    non_empty,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::demo::demo_snapshot;
use crate::fingerprint::ContentFingerprint;
use crate::palette;
use crate::render::{RenderInput, Renderer, Theme};

pub const DEFAULT_PANEL_ID: &str = "flowchart-view";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_FAILURE_LOG_EVERY: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub panel_id: String,
    pub poll_interval: Duration,
    /// Structure fetch failures are logged on the 1st, (n+1)th, (2n+1)th...
    pub failure_log_every: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            panel_id: DEFAULT_PANEL_ID.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            failure_log_every: DEFAULT_FAILURE_LOG_EVERY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    NoDocument,
    Loaded,
}

#[derive(Debug, Default)]
pub struct SyncState {
    /// `None` until the first poll; an empty handle once the host reported
    /// that nothing is open.
    pub document: Option<DocumentHandle>,
    pub fingerprint: Option<ContentFingerprint>,
    /// Last selection seen in the host or relayed by us.
    pub acknowledged_selection: Option<String>,
    pub prefs: PanelPreferences,
    pub panel_registered: bool,
    pub panel_closed: bool,
    pub structure_failures: u64,
    /// How many of those failures were actually logged.
    pub failure_logs: u64,
    /// Times "no dialog loaded" was logged; once per stretch without one.
    pub no_document_logs: u64,
    /// The panel currently shows the placeholder page.
    pub showing_placeholder: bool,
    logged_no_document: bool,
}

impl SyncState {
    pub fn document_state(&self) -> DocumentState {
        match &self.document {
            Some(doc) if !doc.is_empty() => DocumentState::Loaded,
            _ => DocumentState::NoDocument,
        }
    }
}

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The host no longer shows our panel.
    PanelClosed,
    /// Auto-refresh is off; only the panel check ran.
    Paused,
    /// A different document (or none) is open; the panel was repainted.
    Switched(DocumentState),
    /// Same document, new content; the panel was repainted.
    Rerendered,
    Unchanged,
    /// The structure could not be fetched; the panel keeps its content.
    FetchFailed,
    /// The cycle hit a host error and will be retried next interval.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    PanelClosed,
    Interrupted,
    HostShutdown(String),
    HostDisconnected,
    InitFailed,
}

pub fn should_log_failure(failures: u64, every: u32) -> bool {
    every <= 1 || failures % u64::from(every) == 1
}

pub struct SyncLoop {
    host: Arc<dyn HostClient>,
    renderer: Arc<Renderer>,
    config: SyncConfig,
    state: SyncState,
}

impl SyncLoop {
    pub fn new(host: Arc<dyn HostClient>, renderer: Arc<Renderer>, config: SyncConfig) -> Self {
        Self { host, renderer, config, state: SyncState::default() }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn HostClient> {
        &self.host
    }

    /// Adopt the id the host actually registered the panel under.
    pub fn mark_registered(&mut self, panel_id: String) {
        self.config.panel_id = panel_id;
        self.state.panel_registered = true;
    }

    /// One poll cycle. Host errors are logged and swallowed.
    pub async fn tick(&mut self) -> TickOutcome {
        match self.poll().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(panel_id = %self.config.panel_id, "poll cycle failed: {e:#}");
                TickOutcome::Failed
            }
        }
    }

    async fn poll(&mut self) -> Result<TickOutcome> {
        if self.state.panel_registered && !self.host.is_panel_open(&self.config.panel_id).await? {
            info!(panel_id = %self.config.panel_id, "panel closed by user");
            self.state.panel_closed = true;
            return Ok(TickOutcome::PanelClosed);
        }
        if !self.state.prefs.auto_refresh_enabled {
            return Ok(TickOutcome::Paused);
        }

        let outcome = self.refresh_document().await?;
        if let Err(e) = self.track_selection().await {
            debug!("selection poll failed: {e}");
        }
        Ok(outcome)
    }

    /// Compare the host's document with the cached one and repaint if needed.
    pub async fn refresh_document(&mut self) -> Result<TickOutcome> {
        let current = self.host.get_current_dialog().await?;
        let switched = self
            .state
            .document
            .as_ref()
            .is_none_or(|cached| cached.dialog_id != current.dialog_id);

        if switched {
            self.state.fingerprint = None;
            self.state.document = Some(current.clone());
            return self.switch_to(&current).await;
        }
        if current.is_empty() {
            return Ok(TickOutcome::Unchanged);
        }

        let Some(snapshot) = self.fetch_structure().await else {
            return Ok(TickOutcome::FetchFailed);
        };
        let fingerprint = ContentFingerprint::of(&snapshot)?;
        if self.state.fingerprint.as_ref() == Some(&fingerprint) {
            return Ok(TickOutcome::Unchanged);
        }

        info!(dialog_id = %current.dialog_id, %fingerprint, "dialog content changed, re-rendering");
        self.push_graph(&current.dialog_name, &snapshot).await?;
        self.state.fingerprint = Some(fingerprint);
        Ok(TickOutcome::Rerendered)
    }

    async fn switch_to(&mut self, doc: &DocumentHandle) -> Result<TickOutcome> {
        if doc.is_empty() {
            if !self.state.logged_no_document {
                info!("no dialog loaded");
                self.state.logged_no_document = true;
                self.state.no_document_logs += 1;
            }
            if !self.state.showing_placeholder {
                self.push_placeholder().await?;
            }
            return Ok(TickOutcome::Switched(DocumentState::NoDocument));
        }

        self.state.logged_no_document = false;
        info!(dialog_id = %doc.dialog_id, dialog_name = %doc.dialog_name, "dialog loaded");
        self.render_document(doc).await?;
        Ok(TickOutcome::Switched(DocumentState::Loaded))
    }

    /// Fetch and paint `doc`. An unusable structure paints the demo graph and
    /// leaves the fingerprint empty so the next good fetch repaints.
    async fn render_document(&mut self, doc: &DocumentHandle) -> Result<()> {
        let fetched = match self.host.get_dialog_structure().await {
            Ok(result) if result.success => Some(result.into_snapshot()),
            Ok(result) => {
                warn!(dialog_id = %doc.dialog_id, "failed to get structure, showing demo graph: {}", result.error_message);
                None
            }
            Err(e) => {
                warn!(dialog_id = %doc.dialog_id, "failed to get structure, showing demo graph: {e}");
                None
            }
        };

        match fetched {
            Some(snapshot) => {
                let fingerprint = ContentFingerprint::of(&snapshot)?;
                self.push_graph(&doc.dialog_name, &snapshot).await?;
                self.state.fingerprint = Some(fingerprint);
            }
            None => self.push_graph(&doc.dialog_name, &demo_snapshot()).await?,
        }
        Ok(())
    }

    /// Steady-state fetch with rate-limited failure logging.
    async fn fetch_structure(&mut self) -> Option<StructureSnapshot> {
        let error = match self.host.get_dialog_structure().await {
            Ok(result) if result.success => return Some(result.into_snapshot()),
            Ok(result) if result.error_message.is_empty() => "unknown error".to_string(),
            Ok(result) => result.error_message,
            Err(e) => e.to_string(),
        };

        self.state.structure_failures += 1;
        if should_log_failure(self.state.structure_failures, self.config.failure_log_every) {
            self.state.failure_logs += 1;
            warn!(failures = self.state.structure_failures, "failed to get dialog structure: {error}");
        }
        None
    }

    async fn track_selection(&mut self) -> Result<()> {
        let selected = non_empty(self.host.get_selected_node().await?.node_id);
        if selected != self.state.acknowledged_selection {
            debug!(node_id = ?selected, "host selection changed");
            self.state.acknowledged_selection = selected;
        }
        Ok(())
    }

    async fn fetch_preferences(&self) -> PanelPreferences {
        let mut prefs = self.state.prefs;
        if let Some(v) = self.panel_setting(PanelPreferences::SYNC_SELECTION_KEY).await {
            prefs.sync_selection_enabled = v == "true";
        }
        if let Some(v) = self.panel_setting(PanelPreferences::AUTO_REFRESH_KEY).await {
            prefs.auto_refresh_enabled = v == "true";
        }
        prefs
    }

    async fn panel_setting(&self, key: &str) -> Option<String> {
        match self.host.get_panel_setting(&self.config.panel_id, key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(%key, "could not read panel setting: {e}");
                None
            }
        }
    }

    async fn push_graph(&mut self, dialog_name: &str, snapshot: &StructureSnapshot) -> Result<()> {
        if !self.state.panel_registered {
            debug!("no panel registered, skipping render");
            return Ok(());
        }

        let colors = palette::resolve(self.host.as_ref(), &snapshot.nodes).await;
        let theme = match self.host.get_theme().await {
            Ok(info) => Theme::from(&info),
            Err(e) => {
                debug!("theme unavailable, using dark: {e}");
                Theme::Dark
            }
        };
        if self.state.acknowledged_selection.is_none() {
            match self.host.get_selected_node().await {
                Ok(sel) => self.state.acknowledged_selection = non_empty(sel.node_id),
                Err(e) => debug!("selection unavailable: {e}"),
            }
        }
        self.state.prefs = self.fetch_preferences().await;

        let html = self.renderer.render(&RenderInput {
            panel_id: &self.config.panel_id,
            dialog_name,
            snapshot,
            colors: &colors,
            theme,
            selected: self.state.acknowledged_selection.as_deref(),
            prefs: self.state.prefs,
        })?;
        self.host
            .update_panel_content(&self.config.panel_id, ContentType::Html, &html)
            .await
            .context("failed to push flowchart")?;
        self.state.showing_placeholder = false;
        debug!(nodes = snapshot.nodes.len(), bytes = html.len(), "flowchart pushed");
        Ok(())
    }

    pub async fn push_placeholder(&mut self) -> Result<()> {
        if !self.state.panel_registered {
            return Ok(());
        }
        let html = self.renderer.placeholder()?;
        self.host
            .update_panel_content(&self.config.panel_id, ContentType::Html, &html)
            .await
            .context("failed to push placeholder")?;
        self.state.showing_placeholder = true;
        Ok(())
    }

    /// Repaint whatever the host has open now, regardless of the fingerprint.
    async fn rerender(&mut self) {
        if let Err(e) = self.force_render().await {
            warn!(panel_id = %self.config.panel_id, "re-render failed: {e:#}");
        }
    }

    async fn force_render(&mut self) -> Result<()> {
        let current = self.host.get_current_dialog().await?;
        let switched = self
            .state
            .document
            .as_ref()
            .is_none_or(|cached| cached.dialog_id != current.dialog_id);
        self.state.fingerprint = None;
        self.state.document = Some(current.clone());

        if switched {
            self.switch_to(&current).await?;
        } else if current.is_empty() {
            self.push_placeholder().await?;
        } else {
            self.render_document(&current).await?;
        }
        Ok(())
    }

    async fn relay_selection(&mut self, node_id: String) {
        if node_id.is_empty() {
            return;
        }
        if !self.state.prefs.sync_selection_enabled {
            debug!(%node_id, "selection sync disabled, not relaying");
            return;
        }
        self.state.acknowledged_selection = Some(node_id.clone());
        if let Err(e) = self.host.select_node(&node_id).await {
            warn!(%node_id, "failed to relay selection: {e}");
        }
    }

    /// Handle something the user did inside the panel.
    pub async fn on_panel_event(&mut self, event: PanelEvent) {
        if event.panel_id != self.config.panel_id {
            debug!(panel_id = %event.panel_id, "event for another panel, ignoring");
            return;
        }
        match event.kind {
            PanelEventKind::NodeSelected { node_id } => self.relay_selection(node_id).await,
            PanelEventKind::SettingChanged { key, value } => {
                debug!(%key, %value, "panel setting changed");
                let prefs = self.fetch_preferences().await;
                if prefs != self.state.prefs {
                    self.state.prefs = prefs;
                    self.rerender().await;
                }
            }
            PanelEventKind::RefreshRequested => self.rerender().await,
        }
    }

    /// Returns `Some` when the event ends the loop.
    pub async fn on_host_event(&mut self, event: HostEvent) -> Option<StopReason> {
        match event {
            HostEvent::Panel(p) => self.on_panel_event(p).await,
            HostEvent::NodeSelected(n) => {
                // tracking only, see module docs
                self.state.acknowledged_selection = non_empty(n.node_id);
            }
            HostEvent::DialogChanged(d) => {
                debug!(dialog_id = %d.dialog_id, change = %d.change_type, "dialog changed");
                if self.tick().await == TickOutcome::PanelClosed {
                    return Some(StopReason::PanelClosed);
                }
            }
            HostEvent::Shutdown(s) => return Some(StopReason::HostShutdown(s.reason)),
        }
        None
    }

    /// Poll until the panel closes, the host goes away or `cancel` fires.
    pub async fn run(&mut self, mut events: UnboundedReceiver<HostEvent>, cancel: CancellationToken) -> StopReason {
        let period = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(panel_id = %self.config.panel_id, interval_ms = period.as_millis() as u64, "sync loop running");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Interrupted,
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(stop) = self.on_host_event(event).await {
                            return stop;
                        }
                    }
                    None => {
                        warn!("host connection closed");
                        return StopReason::HostDisconnected;
                    }
                },
                _ = ticker.tick() => {
                    if self.tick().await == TickOutcome::PanelClosed {
                        return StopReason::PanelClosed;
                    }
                }
            }
        }
    }

    /// Best-effort goodbye, then hang up. The panel is left alone when the
    /// user closed it, and the host is left alone when it is already gone.
    pub async fn shutdown(&mut self, reason: &StopReason) {
        info!(?reason, "shutting down");
        let panel_gone = self.state.panel_closed || *reason == StopReason::PanelClosed;
        let host_gone = *reason == StopReason::HostDisconnected;

        if !panel_gone && !host_gone {
            if self.state.panel_registered {
                if let Err(e) = self.host.close_panel(&self.config.panel_id).await {
                    debug!("close_panel failed: {e}");
                }
                self.state.panel_registered = false;
            }
            if let Err(e) = self.host.show_notification("Flowchart View", "Plugin stopped.").await {
                debug!("farewell notification failed: {e}");
            }
        }

        self.host.close().await;
        info!("shutdown complete");
    }
}
