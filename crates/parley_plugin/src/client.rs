use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{HostError, HostResult};
use crate::jsonrpc::{Id, Method, Request};
use crate::message::*;
use crate::transport::HostConnection;

/// Everything a plugin can ask of the host.
///
/// Implemented over JSON-RPC by [`RpcHostClient`]; tests swap in a scripted
/// mock (`test_util::MockHost`).
#[async_trait]
pub trait HostClient: Send + Sync + 'static {
    async fn ping(&self) -> HostResult<PingResult>;

    // UI
    async fn show_notification(&self, title: &str, message: &str) -> HostResult<()>;
    /// Returns the index of the clicked button.
    async fn show_dialog(&self, title: &str, message: &str, buttons: &[String]) -> HostResult<i32>;
    /// Returns the id the host actually assigned to the panel.
    async fn register_panel(&self, params: RegisterPanelParams) -> HostResult<String>;
    async fn update_panel_content(&self, panel_id: &str, content_type: ContentType, content: &str) -> HostResult<()>;
    async fn close_panel(&self, panel_id: &str) -> HostResult<()>;
    async fn is_panel_open(&self, panel_id: &str) -> HostResult<bool>;
    async fn get_panel_setting(&self, panel_id: &str, key: &str) -> HostResult<Option<String>>;
    async fn set_panel_setting(&self, panel_id: &str, key: &str, value: &str) -> HostResult<()>;
    async fn get_theme(&self) -> HostResult<ThemeInfo>;
    async fn get_speaker_colors(&self) -> HostResult<SpeakerColors>;

    // Audio
    async fn play_audio(&self, file_path: &str) -> HostResult<()>;
    async fn stop_audio(&self) -> HostResult<()>;

    // Dialog data
    async fn get_current_dialog(&self) -> HostResult<DocumentHandle>;
    async fn get_selected_node(&self) -> HostResult<SelectedNode>;
    /// Tell the host the user picked `node_id` somewhere outside its tree view.
    async fn select_node(&self, node_id: &str) -> HostResult<()>;
    /// Returns the raw result; `success: false` is data, not an error.
    async fn get_dialog_structure(&self) -> HostResult<StructureResult>;

    // Sandboxed files
    /// `None` when the user cancelled.
    async fn open_file_dialog(&self, title: &str, filter: &str) -> HostResult<Option<String>>;
    async fn save_file_dialog(&self, title: &str, filter: &str, default_name: &str) -> HostResult<Option<String>>;
    async fn read_file(&self, file_path: &str) -> HostResult<Vec<u8>>;
    async fn write_file(&self, file_path: &str, content: &[u8]) -> HostResult<()>;

    /// Release the connection. Further calls fail with `Transport`.
    async fn close(&self);
}

pub struct RpcHostClient {
    conn: HostConnection,
    call_timeout: Duration,
}

impl RpcHostClient {
    pub fn new(conn: HostConnection, call_timeout: Duration) -> Self {
        Self { conn, call_timeout }
    }

    /// Connect to the host described by `cfg`; the receiver yields host events.
    pub async fn connect(cfg: &ConnectionConfig) -> HostResult<(Self, mpsc::UnboundedReceiver<HostEvent>)> {
        let (conn, events) = HostConnection::connect(&cfg.address()).await?;
        Ok((Self::new(conn, cfg.call_timeout), events))
    }

    /// Send `method` with `params` and decode the `.result` into `R`.
    async fn call<P, R>(&self, method: Method, params: Option<P>) -> HostResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = params.map(serde_json::to_value).transpose()?;
        let req = Request::call(Id::String(Uuid::new_v4().to_string()), method.to_string(), params);

        let rsp = tokio::time::timeout(self.call_timeout, self.conn.call(req))
            .await
            .map_err(|_| HostError::Timeout { method, after_ms: self.call_timeout.as_millis() as u64 })??;

        if let Some(err) = rsp.error {
            debug!(%method, code = err.code, "host returned an error");
            return Err(HostError::from_rpc(method, err));
        }
        let val = rsp.result.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(val)?)
    }

    /// Calls whose result is a plain `{success, error_message}`.
    async fn call_ack<P: Serialize>(&self, method: Method, params: Option<P>) -> HostResult<()> {
        let ack: Ack = self.call(method, params).await?;
        if ack.success {
            Ok(())
        } else {
            Err(HostError::Rejected { message: ack.error_message })
        }
    }
}

#[async_trait]
impl HostClient for RpcHostClient {
    async fn ping(&self) -> HostResult<PingResult> {
        self.call::<(), _>(Method::Ping, None).await
    }

    async fn show_notification(&self, title: &str, message: &str) -> HostResult<()> {
        let params = ShowNotificationParams { title: title.into(), message: message.into() };
        self.call_ack(Method::ShowNotification, Some(params)).await
    }

    async fn show_dialog(&self, title: &str, message: &str, buttons: &[String]) -> HostResult<i32> {
        let buttons = if buttons.is_empty() { vec!["OK".to_string()] } else { buttons.to_vec() };
        let params = ShowDialogParams { title: title.into(), message: message.into(), buttons };
        let res: ShowDialogResult = self.call(Method::ShowDialog, Some(params)).await?;
        Ok(res.button_index)
    }

    async fn register_panel(&self, params: RegisterPanelParams) -> HostResult<String> {
        let requested = params.panel_id.clone();
        let res: RegisterPanelResult = self.call(Method::RegisterPanel, Some(params)).await?;
        if !res.success {
            return Err(HostError::Rejected { message: res.error_message });
        }
        Ok(non_empty(res.actual_panel_id).unwrap_or(requested))
    }

    async fn update_panel_content(&self, panel_id: &str, content_type: ContentType, content: &str) -> HostResult<()> {
        let params = UpdatePanelContentParams {
            panel_id: panel_id.into(),
            content_type,
            content: content.into(),
        };
        self.call_ack(Method::UpdatePanelContent, Some(params)).await
    }

    async fn close_panel(&self, panel_id: &str) -> HostResult<()> {
        self.call_ack(Method::ClosePanel, Some(PanelIdParams { panel_id: panel_id.into() })).await
    }

    async fn is_panel_open(&self, panel_id: &str) -> HostResult<bool> {
        let res: IsPanelOpenResult =
            self.call(Method::IsPanelOpen, Some(PanelIdParams { panel_id: panel_id.into() })).await?;
        Ok(res.is_open)
    }

    async fn get_panel_setting(&self, panel_id: &str, key: &str) -> HostResult<Option<String>> {
        let params = PanelSettingParams { panel_id: panel_id.into(), key: key.into(), value: None };
        let res: PanelSettingResult = self.call(Method::GetPanelSetting, Some(params)).await?;
        Ok(res.found.then_some(res.value))
    }

    async fn set_panel_setting(&self, panel_id: &str, key: &str, value: &str) -> HostResult<()> {
        let params = PanelSettingParams {
            panel_id: panel_id.into(),
            key: key.into(),
            value: Some(value.into()),
        };
        self.call_ack(Method::SetPanelSetting, Some(params)).await
    }

    async fn get_theme(&self) -> HostResult<ThemeInfo> {
        self.call::<(), _>(Method::GetTheme, None).await
    }

    async fn get_speaker_colors(&self) -> HostResult<SpeakerColors> {
        self.call::<(), _>(Method::GetSpeakerColors, None).await
    }

    async fn play_audio(&self, file_path: &str) -> HostResult<()> {
        self.call_ack(Method::PlayAudio, Some(PlayAudioParams { file_path: file_path.into() })).await
    }

    async fn stop_audio(&self) -> HostResult<()> {
        self.call_ack::<()>(Method::StopAudio, None).await
    }

    async fn get_current_dialog(&self) -> HostResult<DocumentHandle> {
        self.call::<(), _>(Method::GetCurrentDialog, None).await
    }

    async fn get_selected_node(&self) -> HostResult<SelectedNode> {
        self.call::<(), _>(Method::GetSelectedNode, None).await
    }

    async fn select_node(&self, node_id: &str) -> HostResult<()> {
        self.call_ack(Method::SelectNode, Some(SelectNodeParams { node_id: node_id.into() })).await
    }

    async fn get_dialog_structure(&self) -> HostResult<StructureResult> {
        self.call::<(), _>(Method::GetDialogStructure, None).await
    }

    async fn open_file_dialog(&self, title: &str, filter: &str) -> HostResult<Option<String>> {
        let params = FileDialogParams { title: title.into(), filter: filter.into(), ..Default::default() };
        let res: FileDialogResult = self.call(Method::OpenFileDialog, Some(params)).await?;
        Ok(if res.cancelled { None } else { Some(res.file_path) })
    }

    async fn save_file_dialog(&self, title: &str, filter: &str, default_name: &str) -> HostResult<Option<String>> {
        let params = FileDialogParams {
            title: title.into(),
            filter: filter.into(),
            default_name: default_name.into(),
        };
        let res: FileDialogResult = self.call(Method::SaveFileDialog, Some(params)).await?;
        Ok(if res.cancelled { None } else { Some(res.file_path) })
    }

    async fn read_file(&self, file_path: &str) -> HostResult<Vec<u8>> {
        let res: ReadFileResult =
            self.call(Method::ReadFile, Some(ReadFileParams { file_path: file_path.into() })).await?;
        if res.success {
            return Ok(res.content);
        }
        if res.error_message.to_lowercase().contains("not found") {
            return Err(HostError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, res.error_message)));
        }
        Err(HostError::Rejected { message: res.error_message })
    }

    async fn write_file(&self, file_path: &str, content: &[u8]) -> HostResult<()> {
        let params = WriteFileParams { file_path: file_path.into(), content: content.to_vec() };
        self.call_ack(Method::WriteFile, Some(params)).await
    }

    async fn close(&self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::{self, Response};
    use serde_json::{Value, json};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    /// A one-shot fake host that answers every call with `answer(method, params)`.
    fn fake_host<F>(answer: F) -> RpcHostClient
    where
        F: Fn(&str, &Value) -> Response + Send + 'static,
    {
        let (plugin_side, host_side) = duplex(16 * 1024);
        let (conn, _events) = HostConnection::from_stream(plugin_side);
        tokio::spawn(async move {
            let (r, mut w) = tokio::io::split(host_side);
            let mut lines = BufReader::new(r).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Request = serde_json::from_str(&line).unwrap();
                let mut rsp = answer(&req.method, &req.params.clone().unwrap_or(Value::Null));
                rsp.id = req.id.clone().unwrap();
                let mut out = serde_json::to_string(&rsp).unwrap();
                out.push('\n');
                w.write_all(out.as_bytes()).await.unwrap();
            }
        });
        RpcHostClient::new(conn, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn current_dialog_is_decoded() {
        let client = fake_host(|method, _| {
            assert_eq!(method, "getCurrentDialog");
            Response::success(Id::Null, json!({"dialog_id": "d1", "dialog_name": "intro.dlg"}))
        });
        let doc = client.get_current_dialog().await.unwrap();
        assert_eq!(doc, DocumentHandle::new("d1", "intro.dlg"));
    }

    #[tokio::test]
    async fn permission_denied_is_a_distinct_error() {
        let client = fake_host(|_, _| {
            Response::fail(Id::Null, jsonrpc::PERMISSION_DENIED, "denied", None)
        });
        let err = client.play_audio("a.wav").await.unwrap_err();
        assert!(matches!(err, HostError::PermissionDenied { permission: "audio.play" }));
    }

    #[tokio::test]
    async fn unsuccessful_ack_is_rejected() {
        let client = fake_host(|_, params| {
            assert_eq!(params["content_type"], json!("html"));
            Response::success(Id::Null, json!({"success": false, "error_message": "no such panel"}))
        });
        let err = client
            .update_panel_content("flowchart-view", ContentType::Html, "<p/>")
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Rejected { ref message } if message == "no such panel"));
    }

    #[tokio::test]
    async fn missing_panel_setting_is_none() {
        let client = fake_host(|_, params| {
            if params["key"] == json!("auto_refresh") {
                Response::success(Id::Null, json!({"found": true, "value": "false"}))
            } else {
                Response::success(Id::Null, json!({"found": false}))
            }
        });
        assert_eq!(
            client.get_panel_setting("p", "auto_refresh").await.unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(client.get_panel_setting("p", "sync_selection").await.unwrap(), None);
    }

    #[tokio::test]
    async fn register_panel_falls_back_to_requested_id() {
        let client = fake_host(|_, _| Response::success(Id::Null, json!({"success": true})));
        let id = client
            .register_panel(RegisterPanelParams::new("flowchart-view", "Flowchart View"))
            .await
            .unwrap();
        assert_eq!(id, "flowchart-view");
    }

    #[tokio::test]
    async fn read_file_maps_not_found() {
        let client = fake_host(|_, _| {
            Response::success(Id::Null, json!({"success": false, "error_message": "File not found"}))
        });
        match client.read_file("missing.txt").await {
            Err(HostError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_host_times_out() {
        let (plugin_side, _host_side) = duplex(1024);
        let (conn, _events) = HostConnection::from_stream(plugin_side);
        let client = RpcHostClient::new(conn, Duration::from_millis(20));
        let err = client.get_theme().await.unwrap_err();
        assert!(matches!(err, HostError::Timeout { method: Method::GetTheme, .. }));
        client.get_theme().await.unwrap_err();
        assert_eq!(client.conn.pending_calls(), 0);
    }
}
