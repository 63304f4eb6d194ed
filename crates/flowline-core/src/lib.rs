//! Capability layer for the flowline dataflow runtime.
//!
//! This crate defines everything a worker function touches while a graph is
//! running: the [`Message`] envelope that travels along edges, the [`Sender`]
//! and [`Consumer`] handles bound to a node's channels, the consumer
//! [`middleware`] combinators, and the unified [`Error`] type shared by all
//! of them.
//!
//! The graph model and the materializer live in the `flowline` crate; this
//! crate knows nothing about nodes beyond the lightweight [`Origin`] identity
//! stamped on each message for diagnostics.

mod consumer;
mod error;
mod message;
pub mod middleware;
mod sender;

pub use consumer::Consumer;
pub use error::Error;
pub use message::{Message, Origin, Payload};
pub use middleware::{HandlerFn, MiddlewareFn};
pub use sender::Sender;
