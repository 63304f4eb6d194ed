use std::any::Any;

use flowline::{Node, NodeBuilder};

/// A node expanding every received `Vec<T>` into one message per element.
pub fn unslice<T>() -> Node
where
  T: Any + Clone + Send + Sync,
{
  unslice_builder::<T>().build()
}

/// [`unslice`] as a preconfigured builder.
pub fn unslice_builder<T>() -> NodeBuilder
where
  T: Any + Clone + Send + Sync,
{
  Node::builder().func(|w| async move {
    let out = w.sender(0);
    w.consumer()
      .consume_typed::<Vec<T>, _, _>(move |items| {
        let out = out.clone();
        async move {
          for item in items {
            out.send(item).await?;
          }
          Ok(())
        }
      })
      .await
  })
}
