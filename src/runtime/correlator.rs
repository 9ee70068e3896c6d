//! Request/reply correlation over a transport.
//!
//! Every request gets an id made of a per-connection random salt and a
//! strictly increasing counter. The reply that echoes the id fulfills the
//! request exactly once; later replies with the same id are ignored.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{DagsyncError, Result, ShareLock, runtime::Transport, utils};

/// request id
pub type RequestId = String;

/// An outstanding request waiting for its reply.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: RequestId,
    /// Timestamp in milliseconds when the request was sent.
    pub created_at: i64,
    sender: oneshot::Sender<Result<Value>>,
}

pub struct RequestCorrelator {
    transport: Arc<Transport>,
    pending: ShareLock<HashMap<RequestId, PendingRequest>>,
    counter: AtomicU64,
    salt: String,
    timeout: Duration,
}

impl RequestCorrelator {
    /// Creates a correlator bound to `transport`; its pending requests are
    /// rejected with `ConnectionClosed` when the transport tears down.
    pub fn new(
        transport: Arc<Transport>,
        timeout: Duration,
    ) -> Arc<Self> {
        let correlator = Arc::new(Self {
            transport: transport.clone(),
            pending: Arc::new(RwLock::new(HashMap::new())),
            counter: AtomicU64::new(0),
            salt: utils::shortid(),
            timeout,
        });

        let weak = Arc::downgrade(&correlator);
        transport.on_close(move || {
            if let Some(correlator) = weak.upgrade() {
                correlator.reject_all();
            }
        });

        correlator
    }

    fn next_id(&self) -> RequestId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.salt, seq)
    }

    /// Stamps a fresh id onto `payload` and sends it.
    pub fn request(
        self: &Arc<Self>,
        payload: Value,
    ) -> Result<RequestHandle> {
        let Value::Object(mut frame) = payload else {
            return Err(DagsyncError::Convert("request payload must be a JSON object".to_string()));
        };

        let id = self.next_id();
        frame.insert("id".to_string(), Value::String(id.clone()));

        let (sender, receiver) = oneshot::channel();
        self.pending.write().unwrap().insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                created_at: utils::time::time_millis(),
                sender,
            },
        );

        if let Err(e) = self.transport.send_json(&Value::Object(frame)) {
            self.release(&id);
            return Err(e);
        }
        debug!(id = %id, "request sent");

        Ok(RequestHandle {
            id,
            receiver,
            timeout: self.timeout,
            correlator: Arc::downgrade(self),
        })
    }

    /// Fulfills the pending request `id` with `reply`.
    ///
    /// Returns false when no request is waiting for this id (duplicate, stale or unknown reply).
    pub fn resolve(
        &self,
        id: &str,
        reply: Value,
    ) -> bool {
        let pending = self.pending.write().unwrap().remove(id);
        match pending {
            Some(pending) => {
                let _ = pending.sender.send(Ok(reply));
                true
            }
            None => {
                warn!(id, "unexpected reply, no pending request");
                false
            }
        }
    }

    /// Rejects every pending request with `ConnectionClosed`.
    pub fn reject_all(&self) {
        let drained: Vec<PendingRequest> = self.pending.write().unwrap().drain().map(|(_, p)| p).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "rejecting pending requests");
        }
        for pending in drained {
            let _ = pending.sender.send(Err(DagsyncError::ConnectionClosed));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().unwrap().len()
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    fn release(
        &self,
        id: &str,
    ) -> bool {
        self.pending.write().unwrap().remove(id).is_some()
    }
}

/// Handle to one outstanding request.
///
/// Dropping the handle cancels the request: the pending entry is released and
/// a late reply is dropped. The frame itself cannot be un-sent.
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    receiver: oneshot::Receiver<Result<Value>>,
    timeout: Duration,
    correlator: Weak<RequestCorrelator>,
}

impl RequestHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits for the reply, at most until the request deadline.
    pub async fn wait(mut self) -> Result<Value> {
        match tokio::time::timeout(self.timeout, &mut self.receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(DagsyncError::ConnectionClosed),
            Err(_) => {
                debug!(id = %self.id, "request timed out");
                Err(DagsyncError::Timeout(self.id.clone()))
            }
        }
    }

    /// Gives up on the reply.
    pub fn cancel(self) {}
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        if let Some(correlator) = self.correlator.upgrade() {
            correlator.release(&self.id);
        }
    }
}
