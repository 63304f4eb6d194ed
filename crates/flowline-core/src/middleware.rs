//! Consumer middleware: handler-to-handler transformers.
//!
//! A middleware wraps the per-message handler a consumer runs, and may retry,
//! delay, log or abort. Middleware compose in declared order, first entry
//! outermost; a [fatal](crate::Error::fatal) error bypasses both canonical
//! middleware and is returned unchanged.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use crate::error::Error;
use crate::message::Message;

/// The per-message handler shape middleware operates on.
pub type HandlerFn = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// A unary transformer over the per-message handler.
pub type MiddlewareFn = Arc<dyn Fn(HandlerFn) -> HandlerFn + Send + Sync>;

/// Compose middleware so the first entry in the list is outermost, i.e. the
/// last entry is nearest the handler.
pub fn compose(middleware: Vec<MiddlewareFn>) -> MiddlewareFn {
  Arc::new(move |handler: HandlerFn| {
    let mut handler = handler;
    for mw in middleware.iter().rev() {
      handler = mw(handler);
    }
    handler
  })
}

/// Retry a failing handler up to `tries` additional times.
///
/// The final error is wrapped with the attempt count and the payload type
/// label. Fatal errors are returned unchanged without further attempts.
pub fn retry(tries: u32) -> MiddlewareFn {
  Arc::new(move |next: HandlerFn| -> HandlerFn {
    Arc::new(move |msg: Message| -> BoxFuture<'static, Result<(), Error>> {
      let next = next.clone();
      Box::pin(async move {
        let mut attempt = 0u32;
        let mut last = None;
        while attempt <= tries {
          if attempt > 0 {
            warn!(attempt, payload = msg.payload_type(), "retrying message");
          }
          match next(msg.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => last = Some(err),
          }
          attempt += 1;
        }
        match last {
          Some(err) => Err(Error::Retries {
            tries: attempt,
            payload_type: msg.payload_type().to_string(),
            source: Box::new(err),
          }),
          None => Ok(()),
        }
      })
    })
  })
}

const BACKOFF_MIN: Duration = Duration::from_millis(100);
const BACKOFF_MAX_DEFAULT: Duration = Duration::from_secs(10);

/// Retry a failing handler with exponential delays.
///
/// After the first failure the handler is retried after
/// `100ms * factor^attempt`, growing until the next delay would reach `max`,
/// at which point the last error is returned. A zero `max` defaults to 10 s,
/// a non-positive `factor` to 2. Fatal errors bypass the delay loop.
pub fn backoff(max: Duration, factor: f64) -> MiddlewareFn {
  let max = if max.is_zero() { BACKOFF_MAX_DEFAULT } else { max };
  let factor = if factor <= 0.0 { 2.0 } else { factor };
  Arc::new(move |next: HandlerFn| -> HandlerFn {
    Arc::new(move |msg: Message| -> BoxFuture<'static, Result<(), Error>> {
      let next = next.clone();
      Box::pin(async move {
        let mut last = match next(msg.clone()).await {
          Ok(()) => return Ok(()),
          Err(err) if err.is_fatal() => return Err(err),
          Err(err) => err,
        };
        let mut attempt = 1i32;
        loop {
          let delay = delay_for_attempt(attempt, factor, max);
          if delay >= max {
            return Err(last);
          }
          warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            payload = msg.payload_type(),
            "backing off before retry"
          );
          tokio::time::sleep(delay).await;
          match next(msg.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => last = err,
          }
          attempt += 1;
        }
      })
    })
  })
}

fn delay_for_attempt(attempt: i32, factor: f64, max: Duration) -> Duration {
  if BACKOFF_MIN >= max {
    return max;
  }
  let duration = BACKOFF_MIN.as_secs_f64() * factor.powi(attempt);
  if !duration.is_finite() || duration >= max.as_secs_f64() {
    return max;
  }
  Duration::from_secs_f64(duration).max(BACKOFF_MIN)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  fn failing_handler(fail_first: u32, calls: Arc<AtomicU32>) -> HandlerFn {
    Arc::new(move |_msg| -> BoxFuture<'static, Result<(), Error>> {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      Box::pin(async move {
        if n < fail_first {
          Err(Error::message("transient"))
        } else {
          Ok(())
        }
      })
    })
  }

  #[tokio::test]
  async fn compose_keeps_the_first_entry_outermost() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let tag = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| -> MiddlewareFn {
      Arc::new(move |next: HandlerFn| -> HandlerFn {
        let order = order.clone();
        Arc::new(move |msg| {
          order.lock().unwrap().push(name);
          next(msg)
        })
      })
    };

    let merged = compose(vec![tag("outer", order.clone()), tag("inner", order.clone())]);
    let handler = merged(Arc::new(|_msg| -> BoxFuture<'static, Result<(), Error>> {
      Box::pin(async { Ok(()) })
    }));
    handler(Message::new(1i64, None)).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["outer", "inner"]);
  }

  #[tokio::test]
  async fn compose_is_associative() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let tag = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| -> MiddlewareFn {
      Arc::new(move |next: HandlerFn| -> HandlerFn {
        let order = order.clone();
        Arc::new(move |msg| {
          order.lock().unwrap().push(name);
          next(msg)
        })
      })
    };

    let nested = compose(vec![
      tag("a", order.clone()),
      compose(vec![tag("b", order.clone()), tag("c", order.clone())]),
    ]);
    let handler = nested(Arc::new(|_msg| -> BoxFuture<'static, Result<(), Error>> {
      Box::pin(async { Ok(()) })
    }));
    handler(Message::new(1i64, None)).await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
  }

  #[tokio::test]
  async fn retry_recovers_from_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler = retry(2)(failing_handler(2, calls.clone()));

    handler(Message::new(1i64, None)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn retry_wraps_the_exhausted_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler = retry(1)(failing_handler(u32::MAX, calls.clone()));

    let err = handler(Message::new(1i64, None)).await.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(err.to_string(), "transient (retries: 2) i64");
  }

  #[tokio::test]
  async fn retry_returns_fatal_errors_unchanged() {
    let calls = Arc::new(AtomicU32::new(0));
    let counting = calls.clone();
    let handler = retry(5)(Arc::new(move |_msg| -> BoxFuture<'static, Result<(), Error>> {
      counting.fetch_add(1, Ordering::SeqCst);
      Box::pin(async { Err(Error::fatal(Error::message("broken payload"))) })
    }));

    let err = handler(Message::new(1i64, None)).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn backoff_stops_once_the_delay_reaches_max() {
    let calls = Arc::new(AtomicU32::new(0));
    // factor 2 from 100ms: first delay 200ms, next would be 400ms >= max.
    let handler = backoff(Duration::from_millis(350), 2.0)(failing_handler(
      u32::MAX,
      calls.clone(),
    ));

    let err = handler(Message::new(1i64, None)).await.unwrap_err();
    assert_eq!(err.to_string(), "transient");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn backoff_recovers_without_reaching_max() {
    let calls = Arc::new(AtomicU32::new(0));
    let handler = backoff(Duration::from_secs(10), 2.0)(failing_handler(3, calls.clone()));

    handler(Message::new(1i64, None)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn backoff_returns_fatal_errors_without_delay() {
    let handler = backoff(Duration::from_secs(10), 2.0)(Arc::new(
      |_msg| -> BoxFuture<'static, Result<(), Error>> {
        Box::pin(async { Err(Error::fatal(Error::message("broken payload"))) })
      },
    ));

    let err = handler(Message::new(1i64, None)).await.unwrap_err();
    assert!(err.is_fatal());
  }
}
