//! Write capability for one output port of a node.

use std::any::Any;

use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::message::{Message, Origin};

/// Write handle addressing every downstream input channel linked to one
/// output port of one node.
///
/// A single [`send`](Sender::send) delivers the same envelope to every bound
/// channel in declared order, blocking on each until the channel accepts the
/// message or the run is cancelled. A slow downstream therefore exerts
/// backpressure on the producer and on every sibling downstream.
///
/// Senders are immutable after construction and shared across a node's
/// workers; the channels they write to are multi-producer by design.
#[derive(Clone)]
pub struct Sender {
  cancel: CancellationToken,
  origin: Option<Origin>,
  outputs: Vec<flume::Sender<Message>>,
}

impl Sender {
  pub fn new(
    cancel: CancellationToken,
    origin: Option<Origin>,
    outputs: Vec<flume::Sender<Message>>,
  ) -> Self {
    Self {
      cancel,
      origin,
      outputs,
    }
  }

  /// Send a value to every linked downstream.
  ///
  /// Returns [`Error::Cancelled`] when the run token fires while a write is
  /// still waiting for buffer space; some downstreams may already have
  /// accepted the message at that point. A port with no links accepts every
  /// value as a no-op.
  pub async fn send<T: Any + Send + Sync>(&self, value: T) -> Result<(), Error> {
    self.send_message(Message::new(value, self.origin.clone())).await
  }

  /// Send an already-wrapped envelope. Used by forwarding nodes that want to
  /// preserve the original provenance.
  pub async fn send_message(&self, msg: Message) -> Result<(), Error> {
    for output in &self.outputs {
      tokio::select! {
        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        sent = output.send_async(msg.clone()) => {
          // A fully disconnected downstream only happens during teardown.
          if sent.is_err() {
            return Err(Error::Cancelled);
          }
        }
      }
    }
    Ok(())
  }
}
