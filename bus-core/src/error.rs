//! Error types surfaced out-of-band from the bus (see spec §7).
//!
//! Nothing here ever propagates past `publish*`; handler failures and
//! async-dispatch hiccups are packaged as [`PublicationError`] and handed
//! to every registered [`crate::sink::ErrorSink`] instead.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::types::Message;

/// A message value shared between the dispatch core, every matched
/// subscription, and any [`PublicationError`]/`DeadMessage` built along
/// the way. Wrapping at the publish boundary lets the core hand out the
/// same allocation to N handlers and to error reporting without
/// requiring `Message: Clone`.
///
/// This is `Arc<dyn Message>` rather than `Arc<dyn Any + Send + Sync>`:
/// handlers that `acceptsSubtypes` need [`Message::as_any`] to recover a
/// concrete type, and `dyn Message` (unlike a bare `dyn Any`) carries
/// that capability on the trait object itself — see `SPEC_FULL.md` §0.
pub type SharedMessage = Arc<dyn Message>;

/// The uniform runtime representation of every `T[]`/varargs publish,
/// regardless of the logical element type `T`. Because this is always
/// the *same* concrete Rust type no matter what `T` is, it downcasts
/// successfully even when the handler that receives it declared a
/// supertype of the published element type — see `metadata::handler_vararg`
/// and `SPEC_FULL.md` §0.
impl Message for Vec<SharedMessage> {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
pub struct PublicationError {
    message: Arc<str>,
    cause: Option<Arc<dyn Any + Send>>,
    published: Arc<Vec<SharedMessage>>,
}

impl PublicationError {
    pub fn new(message: impl Into<String>, published: Vec<SharedMessage>) -> Self {
        Self { message: message.into().into(), cause: None, published: Arc::new(published) }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: Arc<dyn Any + Send>,
        published: Vec<SharedMessage>,
    ) -> Self {
        Self { message: message.into().into(), cause: Some(cause), published: Arc::new(published) }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The tuple of values that were being published when the failure occurred.
    pub fn published_objects(&self) -> &[SharedMessage] {
        &self.published
    }

    /// The panic payload, if this error was produced by catching a handler panic.
    pub fn cause(&self) -> Option<&(dyn Any + Send)> {
        self.cause.as_deref()
    }
}

impl fmt::Debug for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicationError")
            .field("message", &self.message)
            .field("published_count", &self.published.len())
            .field("has_cause", &self.cause.is_some())
            .finish()
    }
}

impl fmt::Display for PublicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PublicationError {}

/// Failures returned directly to a caller by a fallible bus operation
/// (everything else is reported via [`PublicationError`] to the error
/// sinks instead of being returned).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish interrupted while waiting for a free message slot")]
    EnqueueInterrupted,
    #[error("publish timed out waiting for a free message slot or queue capacity")]
    EnqueueTimeout,
    #[error("bus is shutting down or has shut down; publication rejected")]
    ShuttingDown,
}
