use std::any::Any;
use std::sync::Arc;

use flowline::{Error, Node, NodeBuilder};

/// A node applying `f` to every input and sending the result on port 0.
pub fn transform<T, U, F>(f: F) -> Node
where
  T: Any + Clone + Send + Sync,
  U: Any + Send + Sync,
  F: Fn(T) -> Result<U, Error> + Send + Sync + 'static,
{
  transform_builder(f).build()
}

/// [`transform`] as a preconfigured builder, for callers that want to set a
/// name, worker count or buffer first.
pub fn transform_builder<T, U, F>(f: F) -> NodeBuilder
where
  T: Any + Clone + Send + Sync,
  U: Any + Send + Sync,
  F: Fn(T) -> Result<U, Error> + Send + Sync + 'static,
{
  let f = Arc::new(f);
  Node::builder().func(move |w| {
    let f = Arc::clone(&f);
    async move {
      let out = w.sender(0);
      w.consumer()
        .consume_typed::<T, _, _>(move |v| {
          let f = Arc::clone(&f);
          let out = out.clone();
          async move { out.send(f(v)?).await }
        })
        .await
    }
  })
}
