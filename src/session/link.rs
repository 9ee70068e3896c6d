use std::sync::{Arc, Weak};

use serde_json::json;
use tracing::trace;

use crate::{
    Config, Result,
    events::{EventKind, Frame, PushEvent},
    runtime::{ConnectionState, RequestCorrelator, SubscriptionRegistry, Transport, TransportOptions},
};

/// One live connection: a transport and the correlator bound to it.
///
/// Frames are routed from the transport's reader task: replies go to the
/// correlator, push events to the session's registry.
pub(crate) struct Link {
    transport: Arc<Transport>,
    correlator: Arc<RequestCorrelator>,
}

impl Link {
    pub(crate) async fn open(
        config: &Config,
        registry: Arc<SubscriptionRegistry>,
    ) -> Result<Self> {
        let transport = Transport::new(
            config.endpoints.ws_url.clone(),
            TransportOptions {
                connect_timeout: config.timeouts.connect(),
                ..Default::default()
            },
        );
        let correlator = RequestCorrelator::new(transport.clone(), config.timeouts.request());

        // listeners go in before connect so no frame is missed
        {
            let registry = registry.clone();
            let correlator = Arc::downgrade(&correlator);
            transport.on_message(move |text| route(text, &registry, &correlator));
        }
        transport.on_state(move |state| {
            let kind = match state {
                ConnectionState::Open => EventKind::Connect,
                ConnectionState::Closed | ConnectionState::Error => EventKind::Disconnect,
                ConnectionState::Connecting => return,
            };
            registry.dispatch(&PushEvent::new(kind, json!({ "state": state.as_ref() })));
        });

        transport.connect().await?;

        Ok(Self {
            transport,
            correlator,
        })
    }

    pub(crate) fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    pub(crate) fn correlator(&self) -> Arc<RequestCorrelator> {
        self.correlator.clone()
    }

    pub(crate) fn close(&self) {
        self.transport.close();
    }
}

fn route(
    text: &str,
    registry: &SubscriptionRegistry,
    correlator: &Weak<RequestCorrelator>,
) {
    match Frame::parse(text) {
        Some(Frame::Push(event)) => {
            registry.dispatch(&event);
        }
        Some(Frame::Reply {
            id,
            body,
        }) => {
            if let Some(correlator) = correlator.upgrade() {
                correlator.resolve(&id, body);
            }
        }
        None => trace!("frame dropped"),
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.transport.close();
    }
}
