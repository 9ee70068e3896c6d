//! In-process fake backend: workflow snapshot, logs, simulation trigger and
//! a websocket that answers correlated requests and forwards pushed frames.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dagsync::{Config, SessionBuilder, WorkflowSession};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};

/// How the websocket answers a frame carrying an `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Echo,
    Duplicate,
    Silent,
}

struct BackendState {
    snapshot: Mutex<Value>,
    snapshot_status: Mutex<StatusCode>,
    logs: Mutex<String>,
    hitl_pending: Mutex<Value>,
    actions: Mutex<Vec<String>>,
    reply_mode: Mutex<ReplyMode>,
    pushes: broadcast::Sender<String>,
    kicks: broadcast::Sender<()>,
    connections: watch::Sender<usize>,
    snapshot_fetches: AtomicUsize,
    simulations: AtomicUsize,
}

#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl Backend {
    pub async fn spawn() -> Backend {
        let (pushes, _) = broadcast::channel(64);
        let (kicks, _) = broadcast::channel(8);
        let state = Arc::new(BackendState {
            snapshot: Mutex::new(json!({
                "nodes": [
                    {"id": "start", "type": "start", "status": "completed"},
                    {"id": "plan", "type": "agent", "status": "pending"},
                    {"id": "end", "type": "end", "status": "pending"}
                ],
                "edges": [
                    {"id": "e1", "source": "start", "target": "plan"},
                    {"id": "e2", "source": "plan", "target": "end"}
                ]
            })),
            snapshot_status: Mutex::new(StatusCode::OK),
            logs: Mutex::new("run started\nplanner ready".to_string()),
            hitl_pending: Mutex::new(json!([])),
            actions: Mutex::new(Vec::new()),
            reply_mode: Mutex::new(ReplyMode::Echo),
            pushes,
            kicks,
            connections: watch::Sender::new(0),
            snapshot_fetches: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/workflow/:id", get(workflow))
            .route("/api/workflow/:id/simulate", post(simulate))
            .route("/logs/latest", get(logs))
            .route("/api/hitl/pending", get(hitl_pending))
            .route("/api/hitl/:id/:decision", post(hitl_decision))
            .route("/api/dead-ends/:id/retry", post(retry_dead_end))
            .route("/health", get(|| async { "ok" }))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Backend {
            addr,
            state,
        }
    }

    pub fn config(
        &self,
        session_id: &str,
    ) -> Config {
        let mut config = Config::default();
        config.session_id = session_id.to_string();
        config.endpoints.http_base_url = format!("http://{}", self.addr);
        config.endpoints.ws_url = format!("ws://{}/ws", self.addr);
        config.timeouts.connect_ms = 2_000;
        config.timeouts.request_ms = 2_000;
        config.timeouts.fetch_ms = 2_000;
        config.reconnect.initial_backoff_ms = 50;
        config.reconnect.max_backoff_ms = 200;
        config
    }

    pub fn session(
        &self,
        session_id: &str,
    ) -> WorkflowSession {
        SessionBuilder::new().config(self.config(session_id)).build().unwrap()
    }

    pub fn set_snapshot(
        &self,
        snapshot: Value,
    ) {
        *self.state.snapshot.lock().unwrap() = snapshot;
    }

    pub fn set_snapshot_status(
        &self,
        status: StatusCode,
    ) {
        *self.state.snapshot_status.lock().unwrap() = status;
    }

    pub fn set_logs(
        &self,
        logs: &str,
    ) {
        *self.state.logs.lock().unwrap() = logs.to_string();
    }

    pub fn set_hitl_pending(
        &self,
        pending: Value,
    ) {
        *self.state.hitl_pending.lock().unwrap() = pending;
    }

    /// One-shot actions received so far, as `<kind>:<id>`.
    pub fn actions(&self) -> Vec<String> {
        self.state.actions.lock().unwrap().clone()
    }

    pub fn set_reply_mode(
        &self,
        mode: ReplyMode,
    ) {
        *self.state.reply_mode.lock().unwrap() = mode;
    }

    /// Sends `frame` to every connected websocket.
    pub fn push(
        &self,
        frame: Value,
    ) {
        let _ = self.state.pushes.send(frame.to_string());
    }

    /// Closes every connected websocket from the server side.
    pub fn kick(&self) {
        let _ = self.state.kicks.send(());
    }

    /// Waits until `n` websockets have been accepted in total.
    pub async fn wait_connections(
        &self,
        n: usize,
    ) {
        let mut rx = self.state.connections.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|count| *count >= n)).await.unwrap().unwrap();
    }

    pub fn connections(&self) -> usize {
        *self.state.connections.borrow()
    }

    pub fn snapshot_fetches(&self) -> usize {
        self.state.snapshot_fetches.load(Ordering::SeqCst)
    }

    pub fn simulations(&self) -> usize {
        self.state.simulations.load(Ordering::SeqCst)
    }
}

async fn workflow(
    State(state): State<Arc<BackendState>>,
    Path(_id): Path<String>,
) -> Response {
    state.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
    let status = *state.snapshot_status.lock().unwrap();
    if status != StatusCode::OK {
        return status.into_response();
    }
    let body = state.snapshot.lock().unwrap().to_string();
    (StatusCode::OK, [("content-type", "application/json")], body).into_response()
}

async fn simulate(
    State(state): State<Arc<BackendState>>,
    Path(_id): Path<String>,
) -> StatusCode {
    state.simulations.fetch_add(1, Ordering::SeqCst);
    StatusCode::ACCEPTED
}

async fn logs(State(state): State<Arc<BackendState>>) -> String {
    state.logs.lock().unwrap().clone()
}

async fn hitl_pending(State(state): State<Arc<BackendState>>) -> Response {
    let body = state.hitl_pending.lock().unwrap().to_string();
    (StatusCode::OK, [("content-type", "application/json")], body).into_response()
}

async fn hitl_decision(
    State(state): State<Arc<BackendState>>,
    Path((id, decision)): Path<(String, String)>,
) -> StatusCode {
    if decision != "approve" && decision != "deny" {
        return StatusCode::NOT_FOUND;
    }
    state.actions.lock().unwrap().push(format!("{}:{}", decision, id));
    StatusCode::OK
}

async fn retry_dead_end(
    State(state): State<Arc<BackendState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.actions.lock().unwrap().push(format!("retry:{}", id));
    StatusCode::OK
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(
    socket: WebSocket,
    state: Arc<BackendState>,
) {
    let mut pushes = state.pushes.subscribe();
    let mut kicks = state.kicks.subscribe();
    state.connections.send_modify(|count| *count += 1);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            _ = kicks.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            Ok(frame) = pushes.recv() => {
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let Some(id) = request.get("id").cloned() else {
                        continue;
                    };
                    let reply = json!({"id": id, "ok": true, "echo": request}).to_string();
                    let mode = *state.reply_mode.lock().unwrap();
                    let copies = match mode {
                        ReplyMode::Echo => 1,
                        ReplyMode::Duplicate => 2,
                        ReplyMode::Silent => 0,
                    };
                    for _ in 0..copies {
                        if sink.send(Message::Text(reply.clone())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }
}
