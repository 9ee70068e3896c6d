//! Workflow session - the main entry point for Dagsync.
//!
//! A session owns one subscription registry, one reducer and one log buffer,
//! and wires them to a snapshot source and to a live connection:
//! - the snapshot is always fetched before the connection is opened
//! - push events arriving afterwards are applied as authoritative patches
//! - a reconnect always starts again from a fresh snapshot

mod link;
mod logs;

pub use logs::LogBuffer;

use std::{
    sync::{
        Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    Config, DagsyncError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::EventKind,
    fetcher::SnapshotSource,
    runtime::{ConnectionState, RequestHandle, Subscription, SubscriptionRegistry, guarded, handler},
    workflow::{WorkflowAction, WorkflowGraph, WorkflowReducer, WorkflowStats},
};

use link::Link;

/// Size of the graph update broadcast.
const GRAPH_UPDATE_QUEUE_SIZE: usize = 256;

/// Kinds that feed the reducer.
const GRAPH_EVENT_KINDS: [EventKind; 6] = [
    EventKind::WorkflowUpdated,
    EventKind::TaskProgress,
    EventKind::HitlRequest,
    EventKind::DeadEndAdded,
    EventKind::NodeAdded,
    EventKind::EdgeAdded,
];

/// Callback receiving every rejected event and dropped edge.
pub type RejectHandle = Arc<dyn Fn(&DagsyncError) + Send + Sync>;

/// A synchronized view of one remote workflow session.
///
/// # Example
///
/// ```rust,ignore
/// let session = SessionBuilder::new().session_id("s-1").build()?;
/// session.start().await?;
///
/// let mut updates = session.graph_updates();
/// while let Ok(graph) = updates.recv().await {
///     println!("{:?}", session.stats());
/// }
/// ```
pub struct WorkflowSession {
    config: Config,
    /// Source of full snapshots.
    source: Arc<dyn SnapshotSource>,
    /// Event dispatch, one per session.
    registry: Arc<SubscriptionRegistry>,
    /// Authoritative graph.
    reducer: ShareLock<WorkflowReducer>,
    /// Side-channel for rejected events, never called under another session lock.
    rejects: ShareLock<Vec<RejectHandle>>,
    /// Run log transcript.
    logs: ShareLock<LogBuffer>,
    /// Number of pending human-in-the-loop requests.
    hitl_pending: Arc<AtomicUsize>,
    /// Every accepted graph, in order.
    graph_updates: Arc<BroadcastQueue<Arc<WorkflowGraph>>>,
    /// Current connection, if any.
    link: ShareLock<Option<Link>>,
    /// Built-in handlers, released with the session.
    builtin: Mutex<Vec<Subscription>>,
    shutdown: Arc<Shutdown>,
}

impl WorkflowSession {
    pub fn new(
        config: Config,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let session = Self {
            logs: Arc::new(RwLock::new(LogBuffer::new(config.max_log_lines))),
            config,
            source,
            registry: SubscriptionRegistry::new(),
            reducer: Arc::new(RwLock::new(WorkflowReducer::new())),
            rejects: Arc::new(RwLock::new(Vec::new())),
            hitl_pending: Arc::new(AtomicUsize::new(0)),
            graph_updates: BroadcastQueue::new(GRAPH_UPDATE_QUEUE_SIZE),
            link: Arc::new(RwLock::new(None)),
            builtin: Mutex::new(Vec::new()),
            shutdown: Arc::new(Shutdown::new()),
        };
        session.register_builtin();
        session
    }

    fn register_builtin(&self) {
        let mut subs = Vec::new();

        let reducer = self.reducer.clone();
        let rejects = self.rejects.clone();
        let graph_updates = self.graph_updates.clone();
        let graph_handler = handler(move |event| {
            let applied = match event.to_action() {
                Ok(Some(action)) => {
                    let mut reducer = write_lock(&reducer);
                    reducer.apply(action)
                }
                Ok(None) => return Ok(()),
                Err(e) => Err(e),
            };

            match applied {
                Ok(applied) => {
                    graph_updates.send(applied.graph);
                    for dropped in applied.dropped_edges.iter() {
                        report(&rejects, &dropped.error);
                    }
                    Ok(())
                }
                Err(e) => {
                    report(&rejects, &e);
                    Err(e)
                }
            }
        });
        for kind in GRAPH_EVENT_KINDS {
            subs.push(self.registry.subscribe(kind, graph_handler.clone()));
        }

        let logs = self.logs.clone();
        let rejects = self.rejects.clone();
        subs.push(self.registry.subscribe(
            EventKind::LogUpdate,
            handler(move |event| {
                let line = event.log_line().inspect_err(|e| report(&rejects, e))?;
                write_lock(&logs).push(line);
                Ok(())
            }),
        ));

        let hitl_pending = self.hitl_pending.clone();
        let rejects = self.rejects.clone();
        subs.push(self.registry.subscribe(
            EventKind::HitlUpdate,
            handler(move |event| {
                let pending = event.hitl_pending().inspect_err(|e| report(&rejects, e))?;
                hitl_pending.store(pending, Ordering::Release);
                Ok(())
            }),
        ));

        self.builtin.lock().unwrap_or_else(PoisonError::into_inner).extend(subs);
    }

    /// Fetches a fresh snapshot, then opens a new connection.
    ///
    /// Any previous connection is closed first and its pending requests are
    /// rejected with `ConnectionClosed`.
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.is_shutdown() {
            return Err(DagsyncError::ConnectionClosed);
        }
        self.close_link();

        self.refresh().await?;
        self.refresh_hitl().await?;

        let link = Link::open(&self.config, self.registry.clone()).await?;
        if self.shutdown.is_shutdown() {
            link.close();
            return Err(DagsyncError::ConnectionClosed);
        }
        *write_lock(&self.link) = Some(link);
        info!(session = %self.config.session_id, "session started");

        Ok(())
    }

    /// Drops the current connection and starts again from a fresh snapshot.
    pub async fn reconnect(&self) -> Result<()> {
        debug!(session = %self.config.session_id, "reconnecting");
        self.start().await
    }

    /// Replaces the graph with a freshly fetched snapshot.
    pub async fn refresh(&self) -> Result<Arc<WorkflowGraph>> {
        let graph = self.source.fetch_workflow(&self.config.session_id).await?;
        let applied = write_lock(&self.reducer).apply(WorkflowAction::ReplaceGraph(graph))?;
        self.graph_updates.send(applied.graph.clone());
        Ok(applied.graph)
    }

    /// Replaces the log transcript with a freshly fetched one.
    pub async fn refresh_logs(&self) -> Result<()> {
        let text = self.source.fetch_logs().await?;
        write_lock(&self.logs).replace(&text);
        Ok(())
    }

    /// Resets the human-in-the-loop counter from the backend's pending list.
    pub async fn refresh_hitl(&self) -> Result<usize> {
        let pending = self.source.fetch_hitl_pending().await?.len();
        self.hitl_pending.store(pending, Ordering::Release);
        Ok(pending)
    }

    /// Keeps the session connected until `shutdown()`.
    ///
    /// Every (re)connect starts from a fresh snapshot; failed attempts back
    /// off exponentially up to the configured maximum.
    pub async fn supervise(&self) {
        let initial = Duration::from_millis(self.config.reconnect.initial_backoff_ms);
        let max = Duration::from_millis(self.config.reconnect.max_backoff_ms);
        let mut backoff = initial;

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }

            match self.start().await {
                Ok(()) => {
                    backoff = initial;
                    let transport = read_lock(&self.link).as_ref().map(|l| l.transport());
                    let Some(transport) = transport else {
                        continue;
                    };
                    tokio::select! {
                        _ = self.shutdown.wait() => break,
                        _ = transport.closed() => warn!(session = %self.config.session_id, "connection lost"),
                    }
                }
                Err(e) => warn!(session = %self.config.session_id, "session start failed: {}", e),
            }

            tokio::select! {
                _ = self.shutdown.wait() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff, max);
        }
    }

    /// Sends a correlated request on the current connection.
    pub fn request(
        &self,
        payload: Value,
    ) -> Result<RequestHandle> {
        let correlator = read_lock(&self.link).as_ref().map(|l| l.correlator()).ok_or(DagsyncError::NotConnected)?;
        correlator.request(payload)
    }

    /// Closes the connection and stops supervision.
    pub fn shutdown(&self) {
        if self.shutdown.shutdown() {
            info!(session = %self.config.session_id, "session shutting down");
        }
        self.close_link();
    }

    fn close_link(&self) {
        let link = write_lock(&self.link).take();
        if let Some(link) = link {
            link.close();
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// current graph
    pub fn graph(&self) -> Arc<WorkflowGraph> {
        read_lock(&self.reducer).graph()
    }

    pub fn stats(&self) -> WorkflowStats {
        read_lock(&self.reducer).stats()
    }

    pub fn connection_state(&self) -> ConnectionState {
        read_lock(&self.link).as_ref().map(|l| l.transport().state()).unwrap_or_default()
    }

    pub fn logs(&self) -> LogBuffer {
        read_lock(&self.logs).clone()
    }

    /// Log lines containing `filter`, case-insensitive.
    pub fn filtered_logs(
        &self,
        filter: &str,
    ) -> String {
        read_lock(&self.logs).filtered(filter)
    }

    pub fn hitl_pending(&self) -> usize {
        self.hitl_pending.load(Ordering::Acquire)
    }

    /// Receives every graph accepted from now on.
    pub fn graph_updates(&self) -> broadcast::Receiver<Arc<WorkflowGraph>> {
        self.graph_updates.subscribe()
    }

    /// Registry for external collaborators.
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn source(&self) -> Arc<dyn SnapshotSource> {
        self.source.clone()
    }

    /// Registers a side-channel for rejected events and dropped edges.
    ///
    /// Hooks run after the reducer has released the graph, so they may read the session.
    pub fn on_rejected(
        &self,
        f: impl Fn(&DagsyncError) + Send + Sync + 'static,
    ) {
        write_lock(&self.rejects).push(Arc::new(f));
    }
}

impl Drop for WorkflowSession {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

fn report(
    rejects: &RwLock<Vec<RejectHandle>>,
    error: &DagsyncError,
) {
    let hooks = read_lock(rejects).clone();
    for hook in hooks.iter() {
        guarded("rejection hook", || {
            (hook)(error);
            Ok(())
        });
    }
}

// recovers locks poisoned by a panicking callback
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn next_backoff(
    current: Duration,
    max: Duration,
) -> Duration {
    let next = current + current;
    if next > max { max } else { next }
}
