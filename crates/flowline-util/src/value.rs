use std::any::Any;

use flowline::Node;

/// A source node that emits `v` once on port 0 and terminates.
pub fn value<T: Any + Clone + Send + Sync>(v: T) -> Node {
  Node::builder()
    .func(move |w| {
      let v = v.clone();
      async move { w.sender(0).send(v).await }
    })
    .build()
}
