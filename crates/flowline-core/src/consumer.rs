//! Read capability over a node's input channel.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::message::Message;
use crate::middleware::{HandlerFn, MiddlewareFn};

/// Read handle over one node's input channel.
///
/// All workers of a node share clones of the same consumer; every message is
/// delivered to exactly one of them. Reads end when the input channel closes
/// (all producers released it) or when the run is cancelled, whichever comes
/// first.
#[derive(Clone)]
pub struct Consumer {
  cancel: CancellationToken,
  input: flume::Receiver<Message>,
  middleware: Option<MiddlewareFn>,
}

impl Consumer {
  pub fn new(
    cancel: CancellationToken,
    input: flume::Receiver<Message>,
    middleware: Option<MiddlewareFn>,
  ) -> Self {
    Self {
      cancel,
      input,
      middleware,
    }
  }

  /// Pull the next message.
  ///
  /// Blocks until a message is available, and returns `None` once the input
  /// channel closes or the run is cancelled.
  ///
  /// ```ignore
  /// while let Some(msg) = consumer.next().await {
  ///   let v = msg.value::<i64>().unwrap();
  /// }
  /// ```
  pub async fn next(&self) -> Option<Message> {
    tokio::select! {
      _ = self.cancel.cancelled() => None,
      msg = self.input.recv_async() => msg.ok(),
    }
  }

  /// The run's cancellation token, for workers that block on their own
  /// suspension points.
  pub fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Completes once the run is cancelled.
  pub async fn cancelled(&self) {
    self.cancel.cancelled().await;
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Call `handler` for every message until the input closes.
  ///
  /// The effective handler is the configured middleware stack composed over
  /// `handler`. A handler error terminates the loop and is returned annotated
  /// with the message's origin; input close and cancellation return `Ok`.
  pub async fn consume<F, Fut>(&self, handler: F) -> Result<(), Error>
  where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
  {
    let handler: HandlerFn = Arc::new(move |msg: Message| -> BoxFuture<'static, Result<(), Error>> {
      Box::pin(handler(msg))
    });
    self.consume_handler(handler).await
  }

  /// Typed variant of [`consume`](Consumer::consume): the payload of every
  /// message is presented to `handler` as a `T`.
  ///
  /// A payload of any other type produces a fatal
  /// [`Error::TypeMismatch`], which bypasses retry middleware and terminates
  /// the consume loop.
  pub async fn consume_typed<T, F, Fut>(&self, handler: F) -> Result<(), Error>
  where
    T: Any + Clone + Send + Sync,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
  {
    let handler: HandlerFn = Arc::new(
      move |msg: Message| -> BoxFuture<'static, Result<(), Error>> {
        match msg.value::<T>() {
          Some(value) => Box::pin(handler(value.clone())),
          None => {
            let err = Error::type_mismatch(std::any::type_name::<T>(), msg.payload_type());
            Box::pin(async move { Err(err) })
          }
        }
      },
    );
    self.consume_handler(handler).await
  }

  async fn consume_handler(&self, handler: HandlerFn) -> Result<(), Error> {
    let handler = match &self.middleware {
      Some(middleware) => middleware(handler),
      None => handler,
    };
    loop {
      let Some(msg) = self.next().await else {
        return Ok(());
      };
      let origin = msg.origin().cloned();
      if let Err(err) = handler(msg).await {
        let origin = match origin {
          Some(origin) => origin.to_string(),
          None => "<unknown>".to_string(),
        };
        return Err(Error::Origin {
          origin,
          source: Box::new(err),
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::Origin;
  use std::sync::Mutex;

  fn consumer_over(messages: Vec<Message>, middleware: Option<MiddlewareFn>) -> Consumer {
    let (tx, rx) = flume::bounded(messages.len().max(1));
    for msg in messages {
      tx.send(msg).unwrap();
    }
    drop(tx);
    Consumer::new(CancellationToken::new(), rx, middleware)
  }

  #[tokio::test]
  async fn consume_delivers_every_message() {
    let consumer = consumer_over((0..10i64).map(|i| Message::new(i, None)).collect(), None);
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    consumer
      .consume_typed::<i64, _, _>(move |v| {
        let sink = sink.clone();
        async move {
          sink.lock().unwrap().push(v);
          Ok(())
        }
      })
      .await
      .unwrap();

    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
  }

  #[tokio::test]
  async fn handler_errors_are_annotated_with_the_origin() {
    let origin = Origin::new(1, "<gen>");
    let consumer = consumer_over(vec![Message::new(0i64, Some(origin))], None);

    let err = consumer
      .consume(|_msg| async { Err(Error::message("test")) })
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "test, origin: <gen>");
  }

  #[tokio::test]
  async fn a_partial_failure_stops_the_loop() {
    let consumer = consumer_over((0..10i64).map(|i| Message::new(i, None)).collect(), None);
    let seen: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let err = consumer
      .consume_typed::<i64, _, _>(move |v| {
        let sink = sink.clone();
        async move {
          if v > 5 {
            return Err(Error::message("test"));
          }
          sink.lock().unwrap().push(v);
          Ok(())
        }
      })
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "test, origin: <unknown>");
    assert_eq!(*seen.lock().unwrap(), (0..6).collect::<Vec<_>>());
  }

  #[tokio::test]
  async fn cancellation_ends_the_loop_without_error() {
    let (_tx, rx) = flume::bounded::<Message>(1);
    let cancel = CancellationToken::new();
    let consumer = Consumer::new(cancel.clone(), rx, None);

    cancel.cancel();
    assert!(consumer.next().await.is_none());
    consumer.consume(|_msg| async { Ok(()) }).await.unwrap();
  }

  #[tokio::test]
  async fn typed_consume_rejects_foreign_payloads() {
    let consumer = consumer_over(vec![Message::new("nope".to_string(), None)], None);

    let err = consumer
      .consume_typed::<i64, _, _>(|_v| async { Ok(()) })
      .await
      .unwrap_err();
    let Error::Origin { source, .. } = err else {
      panic!("expected origin annotation, got: {err}");
    };
    assert!(source.is_fatal());
  }

  #[tokio::test]
  async fn middleware_wraps_the_typed_handler() {
    let attempts = Arc::new(Mutex::new(0u32));
    let counting = attempts.clone();
    let consumer = consumer_over(
      vec![Message::new(1i64, None)],
      Some(crate::middleware::retry(2)),
    );

    consumer
      .consume_typed::<i64, _, _>(move |_v| {
        let counting = counting.clone();
        async move {
          let mut attempts = counting.lock().unwrap();
          *attempts += 1;
          if *attempts < 3 {
            Err(Error::message("transient"))
          } else {
            Ok(())
          }
        }
      })
      .await
      .unwrap();

    assert_eq!(*attempts.lock().unwrap(), 3);
  }
}
