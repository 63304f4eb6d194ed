//! The envelope that travels along graph edges.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Dynamically typed message payload.
///
/// Edges of one graph may carry different value types, so payloads are
/// type-erased here and recovered at the consuming end, either manually via
/// [`Message::value`] or through the typed consume helper.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Identity of the node that produced a message.
///
/// Carried for diagnostics only: error annotations and log fields. The `id`
/// is the producing node's process-unique id, the label its display form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
  id: u64,
  label: Arc<str>,
}

impl Origin {
  pub fn new(id: u64, label: impl Into<Arc<str>>) -> Self {
    Self {
      id,
      label: label.into(),
    }
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn label(&self) -> &str {
    &self.label
  }
}

impl fmt::Display for Origin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.label)
  }
}

/// A value flowing along an edge, together with its provenance.
///
/// Messages are cheap to clone: fan-out delivers one clone of the same
/// envelope (sharing the payload allocation) to every downstream channel.
#[derive(Clone)]
pub struct Message {
  payload: Payload,
  payload_type: &'static str,
  origin: Option<Origin>,
}

impl Message {
  /// Wrap a value into an envelope. The concrete type name is captured here
  /// so mismatch and retry diagnostics can name it after erasure.
  pub fn new<T: Any + Send + Sync>(value: T, origin: Option<Origin>) -> Self {
    Self {
      payload: Arc::new(value),
      payload_type: std::any::type_name::<T>(),
      origin,
    }
  }

  pub fn payload(&self) -> &Payload {
    &self.payload
  }

  /// Name of the concrete payload type, as captured at send time.
  pub fn payload_type(&self) -> &'static str {
    self.payload_type
  }

  pub fn origin(&self) -> Option<&Origin> {
    self.origin.as_ref()
  }

  /// Borrow the payload as `T`, or `None` when the payload is of a
  /// different type.
  pub fn value<T: Any>(&self) -> Option<&T> {
    self.payload.downcast_ref()
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
      .field("payload_type", &self.payload_type)
      .field("origin", &self.origin)
      .finish()
  }
}
