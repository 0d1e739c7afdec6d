use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Treats the host's empty-string "nothing here" convention as `None`.
pub fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// -----------------------------------------------------------------------------
// Dialog documents
// -----------------------------------------------------------------------------

/// Identity of the dialog currently open in the host. Both fields are empty
/// when nothing is open.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct DocumentHandle {
    #[serde(default)]
    pub dialog_id: String,
    #[serde(default)]
    pub dialog_name: String,
}

impl DocumentHandle {
    pub fn new(dialog_id: impl Into<String>, dialog_name: impl Into<String>) -> Self {
        Self { dialog_id: dialog_id.into(), dialog_name: dialog_name.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.dialog_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point of the dialog tree.
    #[default]
    Root,
    /// A line spoken by a non-player speaker.
    Npc,
    /// A player reply.
    Pc,
    /// An alias pointing at a node elsewhere in the tree.
    Link,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default)]
    pub is_link: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(default)]
    pub has_condition: bool,
    #[serde(default)]
    pub has_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_script: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, text: impl Into<String>) -> Self {
        Self { id: id.into(), kind, text: text.into(), ..Default::default() }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = non_empty(speaker.into());
        self
    }
}

/// Directed edge between two nodes of the same snapshot. Dangling ids are the
/// host's problem and are passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct Link {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub has_condition: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_script: Option<String>,
}

impl Link {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { source: source.into(), target: target.into(), ..Default::default() }
    }
}

/// The whole graph of a dialog as last fetched.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct StructureSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Raw answer of `getDialogStructure`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct StructureResult {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl StructureResult {
    pub fn into_snapshot(self) -> StructureSnapshot {
        StructureSnapshot { nodes: self.nodes, links: self.links }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct SelectedNode {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub node_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectNodeParams {
    pub node_id: String,
}

// -----------------------------------------------------------------------------
// Panels
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PanelPosition {
    Left,
    #[default]
    Right,
    Bottom,
    Float,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Webview,
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RegisterPanelParams {
    pub panel_id: String,
    pub title: String,
    pub position: PanelPosition,
    pub render_mode: RenderMode,
    /// 0 lets the host pick.
    pub initial_width: u32,
    pub initial_height: u32,
    pub can_float: bool,
    pub can_close: bool,
}

impl RegisterPanelParams {
    pub fn new(panel_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            panel_id: panel_id.into(),
            title: title.into(),
            position: PanelPosition::default(),
            render_mode: RenderMode::default(),
            initial_width: 0,
            initial_height: 0,
            can_float: true,
            can_close: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct RegisterPanelResult {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    /// The host may rename a panel to keep ids unique.
    #[serde(default)]
    pub actual_panel_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Html,
    Url,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdatePanelContentParams {
    pub panel_id: String,
    pub content_type: ContentType,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PanelIdParams {
    pub panel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct IsPanelOpenResult {
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PanelSettingParams {
    pub panel_id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct PanelSettingResult {
    pub found: bool,
    #[serde(default)]
    pub value: String,
}

/// UI toggles the host persists per panel. The plugin only reads them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PanelPreferences {
    pub auto_refresh_enabled: bool,
    pub sync_selection_enabled: bool,
}

impl PanelPreferences {
    pub const AUTO_REFRESH_KEY: &'static str = "auto_refresh";
    pub const SYNC_SELECTION_KEY: &'static str = "sync_selection";
}

impl Default for PanelPreferences {
    fn default() -> Self {
        Self { auto_refresh_enabled: true, sync_selection_enabled: true }
    }
}

// -----------------------------------------------------------------------------
// Host appearance
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ThemeInfo {
    pub is_dark: bool,
    #[serde(default)]
    pub theme_name: String,
}

impl Default for ThemeInfo {
    fn default() -> Self {
        Self { is_dark: true, theme_name: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct SpeakerColors {
    #[serde(default)]
    pub pc_color: String,
    #[serde(default)]
    pub owner_color: String,
    #[serde(default)]
    pub speaker_colors: BTreeMap<String, String>,
}

// -----------------------------------------------------------------------------
// Notifications, dialogs, audio, files
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShowNotificationParams {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShowDialogParams {
    pub title: String,
    pub message: String,
    pub buttons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ShowDialogResult {
    pub button_index: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlayAudioParams {
    pub file_path: String,
}

/// Generic `{success, error_message}` answer used by most mutating calls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct FileDialogParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct FileDialogResult {
    pub cancelled: bool,
    #[serde(default)]
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct ReadFileResult {
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    pub file_path: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct PingResult {
    pub status: String,
}

// -----------------------------------------------------------------------------
// Host → plugin events
// -----------------------------------------------------------------------------

/// What the user did inside a plugin's panel, as forwarded by the host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PanelEventKind {
    NodeSelected { node_id: String },
    SettingChanged { key: String, value: String },
    RefreshRequested,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PanelEvent {
    pub panel_id: String,
    #[serde(flatten)]
    pub kind: PanelEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DialogChangedEvent {
    pub dialog_id: String,
    /// e.g. "loaded", "saved", "modified", "closed"
    pub change_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NodeSelectedEvent {
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ShutdownEvent {
    #[serde(default)]
    pub reason: String,
}

/// Decoded host notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Panel(PanelEvent),
    DialogChanged(DialogChangedEvent),
    NodeSelected(NodeSelectedEvent),
    Shutdown(ShutdownEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_uses_host_field_names() {
        let v = json!({
            "id": "link_1",
            "type": "link",
            "text": "-> Quest Accepted",
            "is_link": true,
            "link_target": "npc_2",
            "has_condition": true,
        });
        let node: Node = serde_json::from_value(v).unwrap();
        assert_eq!(node.kind, NodeKind::Link);
        assert!(node.is_link);
        assert_eq!(node.link_target.as_deref(), Some("npc_2"));
        assert!(!node.has_action);
        assert_eq!(node.speaker, None);
    }

    #[test]
    fn failed_structure_result_tolerates_missing_lists() {
        let r: StructureResult =
            serde_json::from_value(json!({"success": false, "error_message": "no dialog"})).unwrap();
        assert!(!r.success);
        assert!(r.nodes.is_empty());
    }

    #[test]
    fn panel_event_is_flat_on_the_wire() {
        let ev: PanelEvent = serde_json::from_value(json!({
            "panel_id": "flowchart-view",
            "event_type": "node_selected",
            "node_id": "npc_1",
        }))
        .unwrap();
        assert_eq!(ev.kind, PanelEventKind::NodeSelected { node_id: "npc_1".into() });

        let ev: PanelEvent = serde_json::from_value(json!({
            "panel_id": "flowchart-view",
            "event_type": "refresh_requested",
        }))
        .unwrap();
        assert_eq!(ev.kind, PanelEventKind::RefreshRequested);
    }

    #[test]
    fn empty_strings_mean_absent() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty("x".into()), Some("x".to_string()));
        assert!(DocumentHandle::default().is_empty());
    }
}
