//! Errors shared by workers, senders and consumers.

use thiserror::Error;

/// Unified error type for a running graph.
///
/// Worker functions return this from their bodies and from consume handlers;
/// the runtime returns the first worker error from `run`. User code can carry
/// plain text through [`Error::message`] or wrap any error type through
/// [`Error::other`].
#[derive(Debug, Error)]
pub enum Error {
  /// The run was cancelled while a send was waiting for buffer space.
  #[error("send cancelled")]
  Cancelled,

  /// Marker wrapper honored by the retry and backoff middleware: the inner
  /// error is returned unchanged, bypassing further attempts.
  #[error(transparent)]
  Fatal(Box<Error>),

  /// A typed consume handler received a payload of a different type.
  #[error("payload type mismatch: expected {expected}, got {actual}")]
  TypeMismatch {
    expected: &'static str,
    actual: &'static str,
  },

  /// A consume handler failed; annotated with the producing node.
  #[error("{source}, origin: {origin}")]
  Origin {
    origin: String,
    #[source]
    source: Box<Error>,
  },

  /// The retry middleware exhausted its attempts.
  #[error("{source} (retries: {tries}) {payload_type}")]
  Retries {
    tries: u32,
    payload_type: String,
    #[source]
    source: Box<Error>,
  },

  /// Plain-text error from user code.
  #[error("{0}")]
  Message(String),

  /// Arbitrary error carried through from user code.
  #[error(transparent)]
  Other(Box<dyn std::error::Error + Send + Sync>),

  /// A worker task panicked or was aborted before returning.
  #[error("worker task failed: {0}")]
  Worker(String),
}

impl Error {
  /// Plain-text user error. Displays verbatim.
  pub fn message(msg: impl Into<String>) -> Self {
    Self::Message(msg.into())
  }

  /// Wrap any error type into [`Error::Other`].
  pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Other(Box::new(err))
  }

  /// Mark an error fatal so retry and backoff middleware return it as-is.
  pub fn fatal(err: Error) -> Self {
    Self::Fatal(Box::new(err))
  }

  /// A fatal [`Error::TypeMismatch`], as produced by the typed consume
  /// helper.
  pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
    Self::fatal(Self::TypeMismatch { expected, actual })
  }

  pub fn is_fatal(&self) -> bool {
    matches!(self, Self::Fatal(_))
  }
}
