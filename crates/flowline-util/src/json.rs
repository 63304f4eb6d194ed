use std::any::Any;

use flowline::{Error, Node};
use serde::de::DeserializeOwned;

/// A node decoding newline-delimited JSON from `Vec<u8>` chunks into typed
/// values on port 0.
///
/// Chunk boundaries need not align with lines; a trailing document without a
/// newline is decoded when the input closes. Runs a single worker so the
/// reassembly buffer sees the chunks in order.
pub fn json_lines<T>() -> Node
where
  T: DeserializeOwned + Any + Send + Sync,
{
  Node::builder()
    .workers(1)
    .func(|w| async move {
      let out = w.sender(0);
      let consumer = w.consumer();
      let mut buf: Vec<u8> = Vec::new();
      while let Some(msg) = consumer.next().await {
        let Some(chunk) = msg.value::<Vec<u8>>() else {
          return Err(Error::type_mismatch(
            std::any::type_name::<Vec<u8>>(),
            msg.payload_type(),
          ));
        };
        buf.extend_from_slice(chunk);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
          let line: Vec<u8> = buf.drain(..=pos).collect();
          let line = &line[..line.len() - 1];
          if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
          }
          let value: T = serde_json::from_slice(line).map_err(Error::other)?;
          out.send(value).await?;
        }
      }
      if !buf.iter().all(|b| b.is_ascii_whitespace()) {
        let value: T = serde_json::from_slice(&buf).map_err(Error::other)?;
        out.send(value).await?;
      }
      Ok(())
    })
    .build()
}
