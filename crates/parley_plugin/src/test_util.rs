//! Scripted in-memory host for exercising plugins without a socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::client::HostClient;
use crate::error::{HostError, HostResult};
use crate::jsonrpc::Method;
use crate::message::*;

/// One recorded call: the method and its most interesting argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub method: Method,
    pub arg: Option<String>,
}

#[derive(Debug)]
struct MockState {
    document: DocumentHandle,
    structure: StructureResult,
    selected: SelectedNode,
    panel_open: bool,
    settings: HashMap<(String, String), String>,
    theme: Option<ThemeInfo>,
    speaker_colors: Option<SpeakerColors>,
    unreachable: bool,
    denied: Vec<Method>,
    reject_panel_registration: bool,
    calls: Vec<MockCall>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            document: DocumentHandle::default(),
            structure: StructureResult { success: false, error_message: "No dialog loaded".into(), ..Default::default() },
            selected: SelectedNode::default(),
            panel_open: true,
            settings: HashMap::new(),
            theme: Some(ThemeInfo::default()),
            speaker_colors: None,
            unreachable: false,
            denied: Vec::new(),
            reject_panel_registration: false,
            calls: Vec::new(),
        }
    }
}

/// Cheap to clone; clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // a panicking test poisons the lock; the data is still fine to read
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn record(&self, method: Method, arg: Option<&str>) -> HostResult<()> {
        let mut s = self.lock();
        s.calls.push(MockCall { method, arg: arg.map(str::to_string) });
        if s.unreachable {
            return Err(HostError::Transport("mock host unreachable".into()));
        }
        if s.denied.contains(&method) {
            return Err(HostError::PermissionDenied { permission: method.permission() });
        }
        Ok(())
    }

    // ── scripting ──────────────────────────────────────────────────────

    pub fn open_dialog(&self, id: &str, name: &str, snapshot: StructureSnapshot) {
        let mut s = self.lock();
        s.document = DocumentHandle::new(id, name);
        s.structure = StructureResult {
            success: true,
            error_message: String::new(),
            nodes: snapshot.nodes,
            links: snapshot.links,
        };
    }

    pub fn close_dialog(&self) {
        let mut s = self.lock();
        s.document = DocumentHandle::default();
        s.structure = StructureResult { success: false, error_message: "No dialog loaded".into(), ..Default::default() };
    }

    pub fn set_structure(&self, snapshot: StructureSnapshot) {
        let mut s = self.lock();
        s.structure = StructureResult { success: true, error_message: String::new(), nodes: snapshot.nodes, links: snapshot.links };
    }

    /// Make `getDialogStructure` answer `success: false`.
    pub fn fail_structure(&self, message: &str) {
        let mut s = self.lock();
        s.structure = StructureResult { success: false, error_message: message.into(), ..Default::default() };
    }

    pub fn select(&self, node_id: &str) {
        self.lock().selected = SelectedNode { node_id: node_id.into(), node_text: String::new() };
    }

    pub fn set_panel_open(&self, open: bool) {
        self.lock().panel_open = open;
    }

    pub fn set_setting(&self, panel_id: &str, key: &str, value: &str) {
        self.lock().settings.insert((panel_id.into(), key.into()), value.into());
    }

    pub fn set_theme(&self, theme: Option<ThemeInfo>) {
        self.lock().theme = theme;
    }

    pub fn set_speaker_colors(&self, colors: Option<SpeakerColors>) {
        self.lock().speaker_colors = colors;
    }

    /// Every call fails with a transport error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn deny(&self, method: Method) {
        self.lock().denied.push(method);
    }

    pub fn reject_panel_registration(&self) {
        self.lock().reject_panel_registration = true;
    }

    // ── inspection ─────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Arguments of every call to `method`, oldest first.
    pub fn args(&self, method: Method) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .filter_map(|c| c.arg.clone())
            .collect()
    }

    /// The content of the most recent panel push.
    pub fn last_content(&self) -> Option<String> {
        self.args(Method::UpdatePanelContent).pop()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl HostClient for MockHost {
    async fn ping(&self) -> HostResult<PingResult> {
        self.record(Method::Ping, None)?;
        Ok(PingResult { status: "ok".into() })
    }

    async fn show_notification(&self, title: &str, _message: &str) -> HostResult<()> {
        self.record(Method::ShowNotification, Some(title))
    }

    async fn show_dialog(&self, title: &str, _message: &str, _buttons: &[String]) -> HostResult<i32> {
        self.record(Method::ShowDialog, Some(title))?;
        Ok(0)
    }

    async fn register_panel(&self, params: RegisterPanelParams) -> HostResult<String> {
        self.record(Method::RegisterPanel, Some(&params.panel_id))?;
        if self.lock().reject_panel_registration {
            return Err(HostError::Rejected { message: "panel limit reached".into() });
        }
        Ok(params.panel_id)
    }

    async fn update_panel_content(&self, _panel_id: &str, _content_type: ContentType, content: &str) -> HostResult<()> {
        self.record(Method::UpdatePanelContent, Some(content))
    }

    async fn close_panel(&self, panel_id: &str) -> HostResult<()> {
        self.record(Method::ClosePanel, Some(panel_id))?;
        self.lock().panel_open = false;
        Ok(())
    }

    async fn is_panel_open(&self, panel_id: &str) -> HostResult<bool> {
        self.record(Method::IsPanelOpen, Some(panel_id))?;
        Ok(self.lock().panel_open)
    }

    async fn get_panel_setting(&self, panel_id: &str, key: &str) -> HostResult<Option<String>> {
        self.record(Method::GetPanelSetting, Some(key))?;
        Ok(self.lock().settings.get(&(panel_id.to_string(), key.to_string())).cloned())
    }

    async fn set_panel_setting(&self, panel_id: &str, key: &str, value: &str) -> HostResult<()> {
        self.record(Method::SetPanelSetting, Some(key))?;
        self.lock().settings.insert((panel_id.into(), key.into()), value.into());
        Ok(())
    }

    async fn get_theme(&self) -> HostResult<ThemeInfo> {
        self.record(Method::GetTheme, None)?;
        self.lock()
            .theme
            .clone()
            .ok_or_else(|| HostError::Rpc { code: -32000, message: "theme unavailable".into() })
    }

    async fn get_speaker_colors(&self) -> HostResult<SpeakerColors> {
        self.record(Method::GetSpeakerColors, None)?;
        self.lock()
            .speaker_colors
            .clone()
            .ok_or_else(|| HostError::Rpc { code: -32000, message: "colors unavailable".into() })
    }

    async fn play_audio(&self, file_path: &str) -> HostResult<()> {
        self.record(Method::PlayAudio, Some(file_path))
    }

    async fn stop_audio(&self) -> HostResult<()> {
        self.record(Method::StopAudio, None)
    }

    async fn get_current_dialog(&self) -> HostResult<DocumentHandle> {
        self.record(Method::GetCurrentDialog, None)?;
        Ok(self.lock().document.clone())
    }

    async fn get_selected_node(&self) -> HostResult<SelectedNode> {
        self.record(Method::GetSelectedNode, None)?;
        Ok(self.lock().selected.clone())
    }

    async fn select_node(&self, node_id: &str) -> HostResult<()> {
        self.record(Method::SelectNode, Some(node_id))?;
        self.select(node_id);
        Ok(())
    }

    async fn get_dialog_structure(&self) -> HostResult<StructureResult> {
        self.record(Method::GetDialogStructure, None)?;
        Ok(self.lock().structure.clone())
    }

    async fn open_file_dialog(&self, title: &str, _filter: &str) -> HostResult<Option<String>> {
        self.record(Method::OpenFileDialog, Some(title))?;
        Ok(None)
    }

    async fn save_file_dialog(&self, title: &str, _filter: &str, _default_name: &str) -> HostResult<Option<String>> {
        self.record(Method::SaveFileDialog, Some(title))?;
        Ok(None)
    }

    async fn read_file(&self, file_path: &str) -> HostResult<Vec<u8>> {
        self.record(Method::ReadFile, Some(file_path))?;
        Err(HostError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "File not found")))
    }

    async fn write_file(&self, file_path: &str, _content: &[u8]) -> HostResult<()> {
        self.record(Method::WriteFile, Some(file_path))
    }

    async fn close(&self) {}
}
