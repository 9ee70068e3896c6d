//! Persistent WebSocket transport.
//!
//! A `Transport` owns one connection. It is single-use: after `close()` (or a
//! remote close) a new `Transport` has to be created. Inbound text frames are
//! handed to the registered listeners from a single reader task, so listeners
//! observe frames in network arrival order.

use std::{
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio_stream::{Stream, wrappers::BroadcastStream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use crate::{
    DagsyncError, Result, ShareLock,
    common::{BroadcastQueue, Queue, Shutdown},
    runtime::guarded,
};

const STATE_QUEUE_SIZE: usize = 64;

pub type FrameHandle = Arc<dyn Fn(&str) + Send + Sync>;
pub type StateHandle = Arc<dyn Fn(ConnectionState) + Send + Sync>;
pub type CloseHook = Arc<dyn Fn() + Send + Sync>;

/// Connection state, owned by the transport.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    #[default]
    Closed,
    Error,
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// deadline for the websocket handshake
    pub connect_timeout: Duration,
    /// max frames waiting for the writer task
    pub outbound_capacity: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            outbound_capacity: 1024,
        }
    }
}

pub struct Transport {
    url: String,
    options: TransportOptions,

    state: ShareLock<ConnectionState>,
    state_queue: Arc<BroadcastQueue<ConnectionState>>,
    outbound: Arc<Queue<Message>>,

    listeners: ShareLock<Vec<FrameHandle>>,
    state_listeners: ShareLock<Vec<StateHandle>>,
    close_hooks: ShareLock<Vec<CloseHook>>,

    torn_down: AtomicBool,
    shutdown: Arc<Shutdown>,
}

impl Transport {
    pub fn new(
        url: impl Into<String>,
        options: TransportOptions,
    ) -> Arc<Self> {
        let outbound = Queue::new(options.outbound_capacity);
        Arc::new(Self {
            url: url.into(),
            options,
            state: Arc::new(RwLock::new(ConnectionState::Closed)),
            state_queue: BroadcastQueue::new(STATE_QUEUE_SIZE),
            outbound,
            listeners: Arc::new(RwLock::new(Vec::new())),
            state_listeners: Arc::new(RwLock::new(Vec::new())),
            close_hooks: Arc::new(RwLock::new(Vec::new())),
            torn_down: AtomicBool::new(false),
            shutdown: Arc::new(Shutdown::new()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Opens the connection.
    ///
    /// Fails with `Connection` if the handshake fails or times out, and with
    /// `ConnectionClosed` if the transport is closed before or during the attempt.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(DagsyncError::ConnectionClosed);
        }
        if self.state() != ConnectionState::Closed || !self.transition(ConnectionState::Connecting) {
            return Err(DagsyncError::Connection(format!("transport is already {}", self.state())));
        }
        debug!(url = %self.url, "connecting");

        let attempt = tokio::time::timeout(self.options.connect_timeout, connect_async(self.url.as_str()));
        let ws = tokio::select! {
            _ = self.shutdown.wait() => return Err(DagsyncError::ConnectionClosed),
            res = attempt => match res {
                Ok(Ok((ws, _))) => ws,
                Ok(Err(e)) => {
                    self.teardown(ConnectionState::Error);
                    return Err(DagsyncError::from(e));
                }
                Err(_) => {
                    self.teardown(ConnectionState::Error);
                    return Err(DagsyncError::Connection(format!("connect to {} timed out after {:?}", self.url, self.options.connect_timeout)));
                }
            }
        };

        // close() may have won the race after the handshake completed
        if !self.transition(ConnectionState::Open) {
            return Err(DagsyncError::ConnectionClosed);
        }

        let (sink, stream) = ws.split();
        self.spawn_writer(sink);
        self.spawn_reader(stream);
        debug!(url = %self.url, "connected");

        Ok(())
    }

    /// Enqueues a text frame. No buffering happens while the transport is not open.
    pub fn send(
        &self,
        frame: impl Into<String>,
    ) -> Result<()> {
        if !self.is_open() {
            return Err(DagsyncError::NotConnected);
        }
        self.outbound.try_send(Message::Text(frame.into()))
    }

    pub fn send_json(
        &self,
        value: &Value,
    ) -> Result<()> {
        self.send(serde_json::to_string(value)?)
    }

    /// Registers a listener for inbound text frames.
    pub fn on_message(
        &self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) {
        self.listeners.write().unwrap().push(Arc::new(f));
    }

    /// Registers a listener for state transitions.
    pub fn on_state(
        &self,
        f: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) {
        self.state_listeners.write().unwrap().push(Arc::new(f));
    }

    /// Registers a hook run once when the transport tears down.
    pub fn on_close(
        &self,
        f: impl Fn() + Send + Sync + 'static,
    ) {
        self.close_hooks.write().unwrap().push(Arc::new(f));
    }

    /// Stream of state transitions from now on.
    pub fn state_stream(&self) -> impl Stream<Item = ConnectionState> + use<> {
        tokio_stream::StreamExt::filter_map(BroadcastStream::new(self.state_queue.subscribe()), |s| s.ok())
    }

    /// Resolves once the transport has torn down.
    pub async fn closed(&self) {
        self.shutdown.wait().await
    }

    /// Tears the connection down. Safe to call at any time, including during `connect()`.
    pub fn close(&self) {
        self.teardown(ConnectionState::Closed);
    }

    fn transition(
        &self,
        next: ConnectionState,
    ) -> bool {
        {
            let mut state = self.state.write().unwrap();
            if self.torn_down.load(Ordering::Acquire) || *state == next {
                return false;
            }
            *state = next;
        }
        self.publish(next);
        true
    }

    fn teardown(
        &self,
        last: ConnectionState,
    ) {
        {
            let mut state = self.state.write().unwrap();
            if self.torn_down.swap(true, Ordering::AcqRel) {
                return;
            }
            *state = last;
        }
        debug!(url = %self.url, state = %last, "transport torn down");

        self.shutdown.shutdown();
        self.publish(last);

        let hooks = self.close_hooks.read().unwrap().clone();
        for hook in hooks.iter() {
            guarded("close hook", || {
                (hook)();
                Ok(())
            });
        }
    }

    fn publish(
        &self,
        state: ConnectionState,
    ) {
        self.state_queue.send(state);
        let listeners = self.state_listeners.read().unwrap().clone();
        for listener in listeners.iter() {
            guarded("state listener", || {
                (listener)(state);
                Ok(())
            });
        }
    }

    fn spawn_writer<S>(
        self: &Arc<Self>,
        mut sink: S,
    ) where
        S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
    {
        let outbound = self.outbound.clone();
        let shutdown = self.shutdown.clone();
        let transport = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    Some(msg) = outbound.next_async() => {
                        if let Err(e) = sink.send(msg).await {
                            warn!("websocket write failed: {}", e);
                            teardown(&transport, ConnectionState::Error);
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_reader<S>(
        self: &Arc<Self>,
        mut stream: S,
    ) where
        S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin + Send + 'static,
    {
        let listeners = self.listeners.clone();
        let shutdown = self.shutdown.clone();
        let transport = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "frame received");
                            let handles = listeners.read().unwrap().clone();
                            for handle in handles.iter() {
                                guarded("frame listener", || {
                                    (handle)(&text);
                                    Ok(())
                                });
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("websocket closed by peer");
                            teardown(&transport, ConnectionState::Closed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("websocket read failed: {}", e);
                            teardown(&transport, ConnectionState::Error);
                            break;
                        }
                    }
                }
            }
        });
    }
}

fn teardown(
    transport: &Weak<Transport>,
    last: ConnectionState,
) {
    if let Some(transport) = transport.upgrade() {
        transport.teardown(last);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}
