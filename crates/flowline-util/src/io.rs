use std::any::Any;
use std::fmt;
use std::sync::Arc;

use flowline::{Error, Node};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// A source node reading `reader` and emitting `Vec<u8>` chunks on port 0
/// until end of stream.
pub fn io_reader<R>(reader: R) -> Node
where
  R: AsyncRead + Unpin + Send + 'static,
{
  let reader = Arc::new(Mutex::new(reader));
  Node::builder()
    .workers(1)
    .func(move |w| {
      let reader = Arc::clone(&reader);
      async move {
        let out = w.sender(0);
        let mut reader = reader.lock().await;
        let mut buf = vec![0u8; 4096];
        loop {
          let n = reader.read(&mut buf).await.map_err(Error::other)?;
          if n == 0 {
            break;
          }
          out.send(buf[..n].to_vec()).await?;
        }
        Ok(())
      }
    })
    .build()
}

/// A sink node writing every received `Vec<u8>` into `writer`.
pub fn io_writer<W>(writer: W) -> Node
where
  W: AsyncWrite + Unpin + Send + 'static,
{
  let writer = Arc::new(Mutex::new(writer));
  Node::builder()
    .func(move |w| {
      let writer = Arc::clone(&writer);
      async move {
        w.consumer()
          .consume_typed::<Vec<u8>, _, _>(move |bytes| {
            let writer = Arc::clone(&writer);
            async move { writer.lock().await.write_all(&bytes).await.map_err(Error::other) }
          })
          .await
      }
    })
    .build()
}

/// A sink node writing every received `T`, one display line each, into
/// `writer`.
pub fn display_writer<T, W>(writer: W) -> Node
where
  T: Any + Clone + Send + Sync + fmt::Display,
  W: AsyncWrite + Unpin + Send + 'static,
{
  let writer = Arc::new(Mutex::new(writer));
  Node::builder()
    .func(move |w| {
      let writer = Arc::clone(&writer);
      async move {
        w.consumer()
          .consume_typed::<T, _, _>(move |v| {
            let writer = Arc::clone(&writer);
            async move {
              let line = format!("{v}\n");
              writer
                .lock()
                .await
                .write_all(line.as_bytes())
                .await
                .map_err(Error::other)
            }
          })
          .await
      }
    })
    .build()
}
