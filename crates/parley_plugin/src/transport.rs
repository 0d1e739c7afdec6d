//! Connection actor for the plugin ↔ host channel.
//!
//! Two tasks sit behind a [`HostConnection`]:
//! * a **writer** that drains the outbound `(Request, responder)` queue onto the
//!   socket, remembering the responder of every call by its encoded `id`;
//! * a **reader** that routes each `Response` back to its responder and turns
//!   host notifications into [`HostEvent`]s on an unbounded channel.
//!
//! When the host hangs up, every in-flight responder is dropped and the
//! outbound queue is closed, so callers get a [`HostError::Transport`] at once
//! instead of hanging. A frame that is not valid JSON (or not even UTF-8) is
//! logged and skipped; only EOF or an I/O error ends the reader.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{HostError, HostResult};
use crate::jsonrpc::{HostNotification, Message, Request, Response};
use crate::message::HostEvent;

/// A queued request together with the slot its response goes to.
pub type Outbound = (Request, oneshot::Sender<Response>);

type Inflight = Arc<DashMap<String, oneshot::Sender<Response>>>;

pub struct HostConnection {
    tx: mpsc::Sender<Outbound>,
    inflight: Inflight,
    closed: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Forgets a call's responder when the caller stops waiting for it.
struct PendingCall<'a> {
    inflight: &'a Inflight,
    key: Option<String>,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.inflight.remove(&key);
        }
    }
}

impl HostConnection {
    /// Connect to the host's local RPC port.
    pub async fn connect(addr: &str) -> HostResult<(Self, mpsc::UnboundedReceiver<HostEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected to host");
        Ok(Self::from_stream(stream))
    }

    /// Wire the actor onto any duplex byte stream.
    pub fn from_stream<S>(stream: S) -> (Self, mpsc::UnboundedReceiver<HostEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::channel::<Outbound>(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<HostEvent>();
        let closed = CancellationToken::new();

        // track in-flight calls by encoded `id`
        let inflight: Inflight = Arc::new(DashMap::new());

        // ── rx → socket ─────────────────────────────────────────────────
        let writer = {
            let inflight = Arc::clone(&inflight);
            let closed = closed.clone();
            tokio::spawn(async move {
                loop {
                    let (req, rsp_tx) = tokio::select! {
                        biased;
                        _ = closed.cancelled() => break,
                        next = rx.recv() => match next {
                            Some(next) => next,
                            None => break,
                        },
                    };
                    let key = match &req.id {
                        Some(id) => match serde_json::to_string(id) {
                            Ok(key) => {
                                inflight.insert(key.clone(), rsp_tx);
                                // the reader may have cleared the map just before
                                if closed.is_cancelled() {
                                    inflight.remove(&key);
                                    break;
                                }
                                // the caller gave up while the call was queued
                                if inflight.get(&key).is_some_and(|tx| tx.is_closed()) {
                                    inflight.remove(&key);
                                }
                                Some(key)
                            }
                            Err(_) => continue,
                        },
                        None => None,
                    };
                    let mut line = match serde_json::to_string(&req) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(method = %req.method, "could not encode request: {e}");
                            if let Some(key) = key {
                                inflight.remove(&key);
                            }
                            continue;
                        }
                    };
                    line.push('\n');
                    trace!(method = %req.method, "→ host");
                    if write_half.write_all(line.as_bytes()).await.is_err()
                        || write_half.flush().await.is_err()
                    {
                        warn!("host connection closed while writing");
                        if let Some(key) = key {
                            inflight.remove(&key);
                        }
                        closed.cancel();
                        break;
                    }
                }
                // queued calls lose their responders here
                rx.close();
            })
        };

        // ── socket → responders / events ────────────────────────────────
        let reader = {
            let inflight = Arc::clone(&inflight);
            let closed = closed.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(read_half);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf).await {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("reading from host failed: {e}");
                            break;
                        }
                    }
                    let frame = buf.trim_ascii();
                    if frame.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<Message>(frame) {
                        Ok(Message::Response(rsp)) => {
                            let Ok(key) = serde_json::to_string(&rsp.id) else { continue };
                            if let Some((_, tx_rsp)) = inflight.remove(&key) {
                                let _ = tx_rsp.send(rsp);
                            }
                        }
                        Ok(Message::Request(req)) => match decode_event(&req) {
                            Some(event) => {
                                let _ = event_tx.send(event);
                            }
                            None => debug!(method = %req.method, "ignoring unknown host notification"),
                        },
                        Err(e) => warn!(bytes = frame.len(), "skipping bad frame from host: {e}"),
                    }
                }
                debug!("host closed the connection");
                closed.cancel();
                // dropping the responders wakes every waiting caller
                inflight.clear();
            })
        };

        let conn = Self { tx, inflight, closed, tasks: Mutex::new(vec![writer, reader]) };
        (conn, event_rx)
    }

    /// Send a call and wait for the matching response. Dropping the future
    /// (e.g. on timeout) forgets the call.
    pub async fn call(&self, req: Request) -> HostResult<Response> {
        if self.closed.is_cancelled() {
            return Err(HostError::Transport("host connection is closed".into()));
        }
        let key = req.id.as_ref().and_then(|id| serde_json::to_string(id).ok());
        let _pending = PendingCall { inflight: &self.inflight, key };

        let (tx_rsp, rx_rsp) = oneshot::channel();
        self.tx
            .send((req, tx_rsp))
            .await
            .map_err(|_| HostError::Transport("connection actor is dead".into()))?;
        rx_rsp
            .await
            .map_err(|_| HostError::Transport("connection dropped the response".into()))
    }

    /// Fire and forget.
    pub async fn notify(&self, req: Request) -> HostResult<()> {
        if self.closed.is_cancelled() {
            return Err(HostError::Transport("host connection is closed".into()));
        }
        let (tx, _rx) = oneshot::channel();
        self.tx
            .send((req, tx))
            .await
            .map_err(|_| HostError::Transport("connection actor is dead".into()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Calls still waiting for an answer.
    pub fn pending_calls(&self) -> usize {
        self.inflight.len()
    }

    /// Stop both actor tasks. Safe to call more than once.
    pub fn close(&self) {
        self.closed.cancel();
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.inflight.clear();
    }
}

impl Drop for HostConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn params<T: DeserializeOwned>(req: &Request) -> Option<T> {
    serde_json::from_value(req.params.clone().unwrap_or_else(|| Value::Object(Default::default())))
        .map_err(|e| warn!(method = %req.method, "invalid notification params: {e}"))
        .ok()
}

/// Turn a host notification into a typed event.
pub fn decode_event(req: &Request) -> Option<HostEvent> {
    match req.method.parse::<HostNotification>().ok()? {
        HostNotification::PanelEvent => params(req).map(HostEvent::Panel),
        HostNotification::DialogChanged => params(req).map(HostEvent::DialogChanged),
        HostNotification::NodeSelected => params(req).map(HostEvent::NodeSelected),
        HostNotification::Shutdown => params(req).map(HostEvent::Shutdown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::Id;
    use crate::message::{PanelEvent, PanelEventKind};
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn call_is_routed_back_by_id() {
        let (plugin_side, host_side) = duplex(4096);
        let (conn, _events) = HostConnection::from_stream(plugin_side);

        let host = tokio::spawn(async move {
            let (r, mut w) = tokio::io::split(host_side);
            let mut lines = BufReader::new(r).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let req: Request = serde_json::from_str(&line).unwrap();
            assert_eq!(req.method, "getTheme");
            let rsp = Response::success(req.id.unwrap(), json!({"is_dark": false}));
            let mut out = serde_json::to_string(&rsp).unwrap();
            out.push('\n');
            w.write_all(out.as_bytes()).await.unwrap();
            // keep the pipe open until the test is done
            lines.next_line().await.ok();
        });

        let rsp = conn
            .call(Request::call(Id::Number(7), "getTheme", None))
            .await
            .unwrap();
        assert_eq!(rsp.id, Id::Number(7));
        assert_eq!(rsp.result.unwrap()["is_dark"], json!(false));
        conn.close();
        host.abort();
    }

    #[tokio::test]
    async fn notifications_become_events() {
        let (plugin_side, mut host_side) = duplex(4096);
        let (_conn, mut events) = HostConnection::from_stream(plugin_side);

        let note = Request::notification(
            "panelEvent",
            Some(json!({"panel_id": "flowchart-view", "event_type": "node_selected", "node_id": "pc_2"})),
        );
        let mut out = serde_json::to_string(&note).unwrap();
        out.push('\n');
        host_side.write_all(out.as_bytes()).await.unwrap();

        let ev = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(
            ev,
            HostEvent::Panel(PanelEvent {
                panel_id: "flowchart-view".into(),
                kind: PanelEventKind::NodeSelected { node_id: "pc_2".into() },
            })
        );
    }

    #[tokio::test]
    async fn pending_call_fails_when_host_hangs_up() {
        let (plugin_side, host_side) = duplex(4096);
        let (conn, _events) = HostConnection::from_stream(plugin_side);

        let host = tokio::spawn(async move {
            let (r, _w) = tokio::io::split(host_side);
            let mut lines = BufReader::new(r).lines();
            // read the call, then drop both halves without answering
            let _ = lines.next_line().await;
        });

        let res = timeout(
            Duration::from_secs(1),
            conn.call(Request::call(Id::Number(1), "ping", None)),
        )
        .await
        .unwrap();
        assert!(matches!(res, Err(HostError::Transport(_))));
        host.await.unwrap();
    }

    #[tokio::test]
    async fn bad_frames_are_skipped() {
        let (plugin_side, mut host_side) = duplex(4096);
        let (conn, mut events) = HostConnection::from_stream(plugin_side);

        host_side.write_all(b"\xff\xfe garbage\n").await.unwrap();
        host_side.write_all(b"{not json}\n").await.unwrap();
        let note = Request::notification("dialogChanged", Some(json!({"dialog_id": "d1", "change_type": "saved"})));
        let mut out = serde_json::to_string(&note).unwrap();
        out.push('\n');
        host_side.write_all(out.as_bytes()).await.unwrap();

        let ev = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
        assert!(matches!(ev, Some(HostEvent::DialogChanged(ref d)) if d.dialog_id == "d1"));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn abandoned_call_is_forgotten() {
        let (plugin_side, host_side) = duplex(4096);
        let (conn, _events) = HostConnection::from_stream(plugin_side);

        // a host that reads but never answers
        let host = tokio::spawn(async move {
            let mut lines = BufReader::new(host_side).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        for n in 0..3 {
            let res = timeout(Duration::from_millis(50), conn.call(Request::call(Id::Number(n), "ping", None))).await;
            assert!(res.is_err());
        }
        assert_eq!(conn.pending_calls(), 0);
        conn.close();
        host.abort();
    }

    #[tokio::test]
    async fn calls_fail_fast_once_host_is_gone() {
        let (plugin_side, host_side) = duplex(4096);
        let (conn, _events) = HostConnection::from_stream(plugin_side);
        drop(host_side);

        timeout(Duration::from_secs(1), async {
            while !conn.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let res = timeout(Duration::from_millis(100), conn.call(Request::call(Id::Number(1), "ping", None)))
            .await
            .unwrap();
        assert!(matches!(res, Err(HostError::Transport(_))));
        assert_eq!(conn.pending_calls(), 0);
    }

    #[test]
    fn unknown_notifications_are_skipped() {
        let req = Request::notification("somethingElse", None);
        assert_eq!(decode_event(&req), None);
    }
}
