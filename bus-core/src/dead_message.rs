//! The `DeadMessage` envelope (spec §6): delivered when a publication
//! matched no exact-type handler. No subtype expansion applies to
//! `DeadMessage` itself — only exact subscriptions on it ever fire.

use crate::error::SharedMessage;
use crate::message_type;

/// Wraps a publication that matched no exact-type subscription.
pub struct DeadMessage {
    published: Vec<SharedMessage>,
}

impl DeadMessage {
    pub(crate) fn new(published: Vec<SharedMessage>) -> Self {
        Self { published }
    }

    /// The originally-published tuple, in publish order.
    pub fn published_objects(&self) -> &[SharedMessage] {
        &self.published
    }
}

message_type!(DeadMessage);
