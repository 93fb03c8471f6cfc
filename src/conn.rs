//! A single multiplexed WebSocket connection to one DevTools endpoint,
//! shared by many concurrent RPC callers.
//!
//! Two dedicated background tasks own the two halves of the socket: the
//! sender task is the sole writer, the receiver task is the sole reader.
//! Callers never touch the socket directly; they go through
//! [`Connection::rpc`] or [`Connection::fire_and_forget`], which
//! communicate with the background tasks over channels.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::error::{CdpError, CdpResult};
use crate::wire::{parse_inbound, InboundFrame, OutboundMessage, RawResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A one-shot completion holder keyed by call id, removed on response or on
/// timeout/cancellation — whichever happens first removes it, so a late
/// response after a local timeout is discarded silently.
type PendingMap = Arc<DashMap<u64, oneshot::Sender<RawResponse>>>;

/// A single logical RPC channel over one WebSocket.
///
/// `init` happens inside [`Connection::connect`], so by construction every
/// live `Connection` is already in the `CONNECTED` state; `dispose` moves it
/// to `CLOSED` and is safe to call more than once from any task.
#[derive(Debug)]
pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<WsMessage>,
    pending: PendingMap,
    next_id: AtomicU64,
    response_timeout: Duration,
    disposed: Arc<AtomicBool>,
    sender_task: JoinHandle<()>,
    receiver_task: JoinHandle<()>,
}

impl Connection {
    /// Connects to `ws_url` and spawns the sender/receiver background
    /// tasks. `response_timeout` is the default deadline used by
    /// [`Connection::rpc`].
    pub async fn connect(ws_url: &str, response_timeout: Duration) -> CdpResult<Self> {
        let (ws, _response) = tokio_tungstenite::connect_async(ws_url).await?;
        let (mut write, mut read) = ws.split();

        let pending: PendingMap = Arc::new(DashMap::new());
        let disposed = Arc::new(AtomicBool::new(false));

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();

        // Sender worker: single writer for the socket's send side. No
        // locking is needed because it is the only task that ever calls
        // `write.send`.
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });
        let sender_abort = sender_task.abort_handle();

        // Receiver worker: single reader for the socket's receive side.
        // Parses just enough JSON to extract `id`, hands the rest to the
        // waiting caller for typed decoding.
        let recv_pending = pending.clone();
        let recv_disposed = disposed.clone();
        let receiver_task = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                };
                match parse_inbound(&text) {
                    Ok(InboundFrame::Response { id, payload }) => {
                        if let Some((_, waiter)) = recv_pending.remove(&id) {
                            let _ = waiter.send(payload);
                        }
                        // no waiter: either fire-and-forget or a late
                        // response after local timeout — drop silently.
                    }
                    Ok(InboundFrame::Event) => {
                        // events carry no `id`; the core does not interpret
                        // them.
                    }
                    Err(_) => {
                        // tolerate malformed/unknown frames rather than
                        // tearing down the connection over one bad message.
                    }
                }
            }
            recv_disposed.store(true, Ordering::SeqCst);
            // Dropping every waiter fails its `rx.await` with a RecvError,
            // which `rpc` maps to `CdpError::Closed` — this is what makes a
            // transport failure fail every outstanding call exactly once.
            recv_pending.clear();
            // The read half is gone, so the socket is no longer usable even
            // if the write half is technically still open — stop the sender
            // task too instead of leaving it idling until `Connection` drops.
            sender_abort.abort();
        });

        Ok(Self {
            outbound_tx,
            pending,
            next_id: AtomicU64::new(1),
            response_timeout,
            disposed,
            sender_task,
            receiver_task,
        })
    }

    /// Issues one RPC call and awaits its response, honoring both the
    /// connection's default timeout and `cancel`.
    ///
    /// The `id` assigned here is the same `id` the caller will see echoed
    /// back in the response, and it is unique among all calls concurrently
    /// outstanding on this connection.
    pub async fn rpc(
        &self,
        method: &'static str,
        params: Value,
        cancel: &CancellationToken,
    ) -> CdpResult<RawResponse> {
        self.rpc_with_timeout(method, params, self.response_timeout, cancel)
            .await
    }

    /// Like [`Connection::rpc`] but with an explicit per-call deadline,
    /// used by the JS-readiness wait which has its own caller-controlled
    /// timeout distinct from the connection default.
    pub async fn rpc_with_timeout(
        &self,
        method: &'static str,
        params: Value,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CdpResult<RawResponse> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CdpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let msg = OutboundMessage { id, method, params };
        let text = match msg.to_wire_text() {
            Ok(t) => t,
            Err(e) => {
                self.pending.remove(&id);
                return Err(e);
            }
        };

        if self.outbound_tx.send(WsMessage::Text(text)).is_err() {
            self.pending.remove(&id);
            return Err(CdpError::Closed);
        }

        tokio::select! {
            resp = rx => {
                resp.map_err(|_| CdpError::Closed)
            }
            _ = tokio::time::sleep(timeout) => {
                self.pending.remove(&id);
                Err(CdpError::Timeout(timeout))
            }
            _ = cancel.cancelled() => {
                self.pending.remove(&id);
                Err(CdpError::Cancelled)
            }
        }
    }

    /// Enqueues a command without registering a waiter. The eventual
    /// response (if any) is discarded by the receiver worker since no
    /// pending entry exists for its id.
    pub fn fire_and_forget(&self, method: &'static str, params: Value) -> CdpResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(CdpError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = OutboundMessage { id, method, params };
        let text = msg.to_wire_text()?;
        self.outbound_tx
            .send(WsMessage::Text(text))
            .map_err(|_| CdpError::Closed)
    }

    /// Tears the connection down: stops the background tasks, closes the
    /// socket, and fails every outstanding call with [`CdpError::Closed`].
    /// Safe to call more than once, from any task.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sender_task.abort();
        self.receiver_task.abort();
        // Dropping every waiter fails its in-flight `rpc` with `Closed`.
        self.pending.clear();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.sender_task.abort();
        self.receiver_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt as _;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Spins up a minimal DevTools-shaped WebSocket echo/responder server
    /// for exercising the multiplexer without a real Chromium instance.
    async fn spawn_test_server(
        responder: impl Fn(u64, &str, &Value) -> Option<Value> + Send + Sync + 'static,
    ) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let responder = Arc::new(responder);
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut write, mut read) = ws.split();
                while let Some(Ok(WsMessage::Text(text))) = read.next().await {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    let id = value["id"].as_u64().unwrap();
                    let method = value["method"].as_str().unwrap().to_string();
                    let params = value["params"].clone();
                    if let Some(result) = responder(id, &method, &params) {
                        let resp = serde_json::json!({"id": id, "result": result});
                        if write.send(WsMessage::Text(resp.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn rpc_response_id_matches_request_id() {
        let addr = spawn_test_server(|id, _method, _params| Some(serde_json::json!({"echo": id})))
            .await;
        let conn = Connection::connect(&format!("ws://{addr}"), Duration::from_secs(1))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let resp = conn
            .rpc("Test.method", serde_json::json!({}), &cancel)
            .await
            .unwrap();
        let value: Value = resp.into_result("Test.method").unwrap();
        assert!(value["echo"].is_u64());
    }

    #[tokio::test]
    async fn concurrent_calls_get_distinct_ids_and_correct_responses() {
        let addr = spawn_test_server(|id, _m, _p| Some(serde_json::json!({"id_seen": id}))).await;
        let conn = Arc::new(
            Connection::connect(&format!("ws://{addr}"), Duration::from_secs(2))
                .await
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let conn = conn.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                conn.rpc("Test.method", serde_json::json!({}), &cancel)
                    .await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            let resp = h.await.unwrap().unwrap();
            let value: Value = resp.into_result("Test.method").unwrap();
            ids.push(value["id_seen"].as_u64().unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn call_times_out_when_server_never_responds() {
        let addr = spawn_test_server(|_id, _m, _p| None).await;
        let conn = Connection::connect(&format!("ws://{addr}"), Duration::from_millis(50))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let err = conn
            .rpc("Test.method", serde_json::json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CdpError::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_cancelled() {
        let addr = spawn_test_server(|_id, _m, _p| None).await;
        let conn = Connection::connect(&format!("ws://{addr}"), Duration::from_secs(5))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel2.cancel();
        });
        let err = conn
            .rpc("Test.method", serde_json::json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CdpError::Cancelled));
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let addr = spawn_test_server(|_id, _m, _p| None).await;
        let conn = Connection::connect(&format!("ws://{addr}"), Duration::from_secs(5))
            .await
            .unwrap();
        conn.dispose().await;
        conn.dispose().await;
    }
}
