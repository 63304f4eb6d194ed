//! End-to-end tests for the helper node constructors.

use std::sync::{Arc, Mutex};

use flowline::{Error, Node};
use flowline_util::{chain, display_writer, io_reader, io_writer, json_lines, transform, unslice, value};
use tokio::io::AsyncReadExt;

fn collecting_sink<T: std::any::Any + Clone + Send + Sync>(collected: &Arc<Mutex<Vec<T>>>) -> Node {
  let collected = Arc::clone(collected);
  Node::builder()
    .func(move |w| {
      let collected = collected.clone();
      async move {
        w.consumer()
          .consume_typed::<T, _, _>(move |v| {
            let collected = collected.clone();
            async move {
              collected.lock().unwrap().push(v);
              Ok(())
            }
          })
          .await
      }
    })
    .build()
}

#[tokio::test]
async fn value_emits_once() {
  let collected: Arc<Mutex<Vec<i64>>> = Arc::default();
  let origin = value(7i64);
  origin.link(0, &[&collecting_sink(&collected)]);

  origin.run().await.expect("run failed");
  assert_eq!(*collected.lock().unwrap(), vec![7]);
}

#[tokio::test]
async fn chain_links_by_port_zero() {
  let collected: Arc<Mutex<Vec<i64>>> = Arc::default();
  let head = chain(&[
    &value(21i64),
    &transform(|v: i64| Ok(v * 2)),
    &collecting_sink(&collected),
  ]);

  head.run().await.expect("run failed");
  assert_eq!(*collected.lock().unwrap(), vec![42]);
}

#[tokio::test]
async fn transform_errors_fail_the_run() {
  let head = chain(&[
    &value(1i64),
    &transform(|_v: i64| -> Result<i64, Error> { Err(Error::message("bad input")) }),
  ]);

  let err = head.run().await.expect_err("run should fail");
  assert!(err.to_string().contains("bad input"));
}

#[tokio::test]
async fn inverse_transforms_compose_to_identity() {
  let collected: Arc<Mutex<Vec<i64>>> = Arc::default();
  let head = chain(&[
    &value(9i64),
    &transform(|v: i64| Ok(v + 5)),
    &transform(|v: i64| Ok(v - 5)),
    &collecting_sink(&collected),
  ]);

  head.run().await.expect("run failed");
  assert_eq!(*collected.lock().unwrap(), vec![9]);
}

#[tokio::test]
async fn unslice_expands_vectors() {
  let collected: Arc<Mutex<Vec<i64>>> = Arc::default();
  let head = chain(&[
    &value(vec![1i64, 2, 3]),
    &unslice::<i64>(),
    &collecting_sink(&collected),
  ]);

  head.run().await.expect("run failed");
  assert_eq!(*collected.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn json_lines_reassembles_split_chunks() {
  #[derive(serde::Deserialize, Clone)]
  struct Record {
    a: i64,
  }

  let origin = Node::builder()
    .func(|w| async move {
      let out = w.sender(0);
      // A chunk boundary in the middle of the second document.
      out.send(b"{\"a\":1}\n{\"a\"".to_vec()).await?;
      out.send(b":2}\n{\"a\":3}".to_vec()).await?;
      Ok(())
    })
    .build();

  let collected: Arc<Mutex<Vec<Record>>> = Arc::default();
  let head = chain(&[&origin, &json_lines::<Record>(), &collecting_sink(&collected)]);

  head.run().await.expect("run failed");

  let got: Vec<i64> = collected.lock().unwrap().iter().map(|r| r.a).collect();
  assert_eq!(got, vec![1, 2, 3]);
}

#[tokio::test]
async fn json_lines_rejects_invalid_documents() {
  let origin = Node::builder()
    .func(|w| async move { w.sender(0).send(b"not json\n".to_vec()).await })
    .build();
  let head = chain(&[&origin, &json_lines::<serde_json::Value>()]);

  head.run().await.expect_err("run should fail");
}

#[tokio::test]
async fn io_reader_streams_the_whole_input() {
  let data = b"hello, flowline".to_vec();
  let origin = io_reader(std::io::Cursor::new(data.clone()));

  let collected: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
  origin.link(0, &[&collecting_sink(&collected)]);

  origin.run().await.expect("run failed");

  let got: Vec<u8> = collected.lock().unwrap().concat();
  assert_eq!(got, data);
}

#[tokio::test]
async fn io_writer_writes_raw_bytes() {
  let (client, mut server) = tokio::io::duplex(64);
  let head = chain(&[&value(b"hello".to_vec()), &io_writer(client)]);

  head.run().await.expect("run failed");

  let mut buf = [0u8; 5];
  server.read_exact(&mut buf).await.expect("read failed");
  assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn display_writer_writes_one_line_per_value() {
  let (client, mut server) = tokio::io::duplex(64);
  let origin = Node::builder()
    .func(|w| async move {
      let out = w.sender(0);
      for i in 1..=3i64 {
        out.send(i).await?;
      }
      Ok(())
    })
    .build();
  origin.link(0, &[&display_writer::<i64, _>(client)]);

  origin.run().await.expect("run failed");

  let mut buf = [0u8; 6];
  server.read_exact(&mut buf).await.expect("read failed");
  assert_eq!(&buf, b"1\n2\n3\n");
}
