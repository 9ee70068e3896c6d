//! # Dagsync
//!
//! Dagsync keeps a local, consistent view of a workflow graph that is being
//! executed by a remote backend.
//!
//! ## Core Features
//!
//! - **Snapshot then patches**: a full snapshot is fetched over HTTP before the live connection opens
//! - **Request correlation**: replies on the shared WebSocket are routed back to the request that caused them
//! - **Event reduction**: push events are folded into an immutable graph, malformed ones are reported and skipped
//! - **Reconnect policy**: every reconnect starts again from a fresh snapshot, with capped exponential backoff
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dagsync::SessionBuilder;
//!
//! let session = SessionBuilder::new().session_id("s-1").build()?;
//! session.start().await?;
//!
//! let graph = session.graph();
//! println!("{} nodes, {:?}", graph.node_count(), session.stats());
//! ```

mod builder;
mod common;
mod config;
mod error;
mod events;
mod fetcher;
mod model;
mod runtime;
mod session;
mod utils;
mod workflow;

use std::sync::{Arc, RwLock};

pub use builder::SessionBuilder;
pub use common::{BroadcastQueue, Queue, Shutdown};
pub use config::{Config, EndpointConfig, ReconnectConfig, TimeoutConfig};
pub use error::DagsyncError;
pub use events::{EventKind, Frame, PushEvent};
pub use fetcher::{HttpFetcher, SnapshotSource};
pub use model::*;
pub use runtime::{ConnectionState, EventHandle, PendingRequest, RequestCorrelator, RequestHandle, RequestId, Subscription, SubscriptionRegistry, Transport, TransportOptions, handler};
pub use session::{LogBuffer, RejectHandle, WorkflowSession};
pub use workflow::{Applied, DroppedEdge, Edge, EdgeId, Node, NodeId, NodeKind, NodePatch, NodeStatus, NodeView, Position, WorkflowAction, WorkflowGraph, WorkflowReducer, WorkflowStats};

/// Result type alias for Dagsync operations.
pub type Result<T> = std::result::Result<T, DagsyncError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
