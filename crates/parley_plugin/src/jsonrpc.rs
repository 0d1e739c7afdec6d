use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// JSON‑RPC 2.0 core types for the plugin ↔ host channel.
///
/// Every frame is a single JSON object terminated by `\n`. The structs mirror
/// the [JSON‑RPC 2.0 spec](https://www.jsonrpc.org/specification) and are
/// transport‑agnostic.
///
/// ```ignore
/// use serde_json::json;
/// use parley_plugin::jsonrpc::{Id, Method, Request};
///
/// let req = Request::call(Id::Number(1), Method::GetCurrentDialog, None);
/// let s = serde_json::to_string(&req).unwrap();
/// ```
pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// Application error code the host uses when a plugin lacks a permission.
pub const PERMISSION_DENIED: i64 = -32003;

/// `id` MAY be a string, number or null. We support all forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
    Null,
}

/// JSON‑RPC 2.0 Request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Omitted for *notifications*.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_owned()
}

/// JSON‑RPC 2.0 Error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON‑RPC 2.0 Response object.
/// Exactly one of `result` or `error` **must** be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    pub id: Id,
}

/// Lets callers decode a line without inspecting it first.
/// `Request` is tried first since only requests carry `method`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
}

// -----------------------------------------------------------------------------
// Helper constructors
// -----------------------------------------------------------------------------
impl Request {
    /// Create a *notification* (no response expected).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Create a *call* expecting a response.
    pub fn call(id: Id, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

impl Response {
    /// Convenience helper for a successful result.
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Convenience helper for an error result.
    pub fn fail(id: Id, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: None,
            error: Some(Error {
                code,
                message: message.into(),
                data,
            }),
            id,
        }
    }
}

/// Host methods a plugin may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Method {
    Ping,

    // UI
    ShowNotification,
    ShowDialog,
    RegisterPanel,
    UpdatePanelContent,
    ClosePanel,
    IsPanelOpen,
    GetPanelSetting,
    SetPanelSetting,
    GetTheme,
    GetSpeakerColors,

    // Audio
    PlayAudio,
    StopAudio,

    // Dialog data
    GetCurrentDialog,
    GetSelectedNode,
    SelectNode,
    GetDialogStructure,

    // Sandboxed files
    OpenFileDialog,
    SaveFileDialog,
    ReadFile,
    WriteFile,
}

impl Method {
    /// The host permission gating this method, used to label permission errors.
    pub const fn permission(&self) -> &'static str {
        match self {
            Method::Ping => "plugin.ping",
            Method::ShowNotification => "ui.show_notification",
            Method::ShowDialog => "ui.show_dialog",
            Method::RegisterPanel
            | Method::UpdatePanelContent
            | Method::ClosePanel
            | Method::IsPanelOpen
            | Method::GetPanelSetting
            | Method::SetPanelSetting => "ui.panel",
            Method::GetTheme | Method::GetSpeakerColors => "ui.settings",
            Method::PlayAudio | Method::StopAudio => "audio.play",
            Method::GetCurrentDialog | Method::GetSelectedNode | Method::GetDialogStructure => {
                "dialog.read"
            }
            Method::SelectNode => "dialog.select",
            Method::OpenFileDialog | Method::SaveFileDialog => "file.dialog",
            Method::ReadFile => "file.read",
            Method::WriteFile => "file.write",
        }
    }
}

/// Notifications the host pushes to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "camelCase")]
pub enum HostNotification {
    PanelEvent,
    DialogChanged,
    NodeSelected,
    Shutdown,
}
