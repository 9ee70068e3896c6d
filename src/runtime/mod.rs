mod correlator;
mod registry;
mod transport;

pub use correlator::{PendingRequest, RequestCorrelator, RequestHandle, RequestId};
pub use registry::{EventHandle, Subscription, SubscriptionRegistry, handler};
pub use transport::{ConnectionState, Transport, TransportOptions};

use std::panic::AssertUnwindSafe;

use tracing::error;

use crate::Result;

/// Runs one callback so that its error or panic is logged instead of propagated.
pub(crate) fn guarded(
    label: &str,
    f: impl FnOnce() -> Result<()>,
) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{} handler failed: {}", label, e);
            false
        }
        Err(_) => {
            error!("{} handler panicked", label);
            false
        }
    }
}
