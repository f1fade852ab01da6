//! In-process publish/subscribe message bus with type-hierarchy dispatch.
//!
//! Listener objects register handler methods; publishers post one, two,
//! three, or variadic message values, and the bus invokes every handler
//! whose declared parameter type is compatible with the published
//! runtime type — including supertype and variadic-array ("varargs")
//! matching. Delivery is synchronous (caller thread) or asynchronous
//! (fixed worker pool), and publications that match no exact-type handler
//! are routed to `DeadMessage` subscribers.
//!
//! Rust has no runtime class hierarchy or annotation scanning, so the two
//! external collaborators a reflective implementation would consult —
//! "what are this type's supertypes" and "what handlers does this
//! listener class declare" — are modeled here as the [`Message`] and
//! [`Listener`] traits. See the crate's `SPEC_FULL.md` for the full
//! rationale.
//!
//! ```
//! use bus_core::{message_type, metadata::handler1, Bus, HandlerMetadata, Listener};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Greeting(String);
//! message_type!(Greeting);
//!
//! struct Logger(AtomicUsize);
//! impl Listener for Logger {
//!     fn handlers() -> Vec<HandlerMetadata> {
//!         vec![handler1::<Logger, Greeting, _>(|l: &Logger, g: &Greeting| {
//!             l.0.fetch_add(1, Ordering::SeqCst);
//!             println!("{}", g.0);
//!         })]
//!     }
//! }
//!
//! let bus = Bus::new();
//! let logger = Arc::new(Logger(AtomicUsize::new(0)));
//! bus.subscribe(logger.clone());
//! bus.publish(Greeting("hello".into()));
//! assert_eq!(logger.0.load(Ordering::SeqCst), 1);
//! ```

mod async_dispatch;
mod bus;
mod cache;
mod config;
mod dead_message;
mod dispatch;
pub mod metadata;
mod oracle;
mod registry;
mod sink;
mod subscription;
mod types;

pub mod error;

pub use bus::Bus;
pub use config::{BusConfig, BusConfigBuilder};
pub use dead_message::DeadMessage;
pub use error::{BusError, PublicationError};
pub use metadata::HandlerMetadata;
pub use sink::{ErrorSink, TracingErrorSink};
pub use types::{Listener, Message, SuperEdge};
