//! The error sink collaborator (spec §6): `handle(PublicationError)`.

use crate::error::PublicationError;
use std::sync::Arc;
use tracing::warn;

/// Consumes [`PublicationError`]s produced by handler failures, async
/// enqueue interruptions, and worker interruptions.
pub trait ErrorSink: Send + Sync {
    fn handle(&self, error: PublicationError);
}

/// Default sink installed on every new bus: logs at `warn` via `tracing`
/// and drops the error. Mirrors the teacher's habit of routing failures
/// through `tracing::warn!`/`tracing::error!` rather than panicking.
#[derive(Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn handle(&self, error: PublicationError) {
        warn!(message = error.message(), "publication error");
    }
}

pub(crate) type SinkList = Arc<parking_lot::RwLock<Vec<Arc<dyn ErrorSink>>>>;

pub(crate) fn dispatch_to_sinks(sinks: &SinkList, error: PublicationError) {
    let guard = sinks.read();
    if guard.is_empty() {
        warn!(message = error.message(), "publication error (no sinks registered)");
        return;
    }
    for sink in guard.iter() {
        sink.handle(error.clone());
    }
}
