//! flowline: a small streaming dataflow runtime.
//!
//! Applications assemble a directed multigraph of worker nodes declaratively,
//! then run it from any node. The runtime materializes one bounded channel
//! per node, spawns the configured worker tasks, distributes values,
//! propagates cancellation and errors, and terminates once every source has
//! drained.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Node                              │
//! │  - declarative: workers, buffer, output ports, edges,       │
//! │    consumer middleware, worker function                     │
//! │  - run() / run_with(cancel) starts a graph walk here        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Line                              │
//! │  - one per run: walks the graph from the root               │
//! │  - bounded input channel + producer refcount per node       │
//! │  - spawns workers, collects the first error, cancels rest   │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Consumer / Sender                        │
//! │  - worker-facing capabilities over the node's own input     │
//! │    channel and its downstream channels                      │
//! │  - middleware wraps the consume handler (retry, backoff)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows opposite to the walk: each node's workers read the node's own
//! input channel and push to downstream nodes' input channels.
//!
//! # Usage
//!
//! ```ignore
//! use flowline::Node;
//!
//! let origin = Node::builder()
//!   .name("gen")
//!   .func(|w| async move {
//!     let ints = w.sender(0);
//!     for i in 0..10i64 {
//!       ints.send(i).await?;
//!     }
//!     Ok(())
//!   })
//!   .build();
//!
//! let sink = Node::builder()
//!   .name("sink")
//!   .source(0, &[&origin])
//!   .func(|w| async move {
//!     w.consumer()
//!       .consume_typed::<i64, _, _>(|v| async move {
//!         println!("{v}");
//!         Ok(())
//!       })
//!       .await
//!   })
//!   .build();
//!
//! origin.run().await?;
//! ```

mod dump;
mod line;
mod node;

pub use dump::dump_dot;
pub use node::{Node, NodeBuilder, PortKey, Worker, WorkerFn};

// Re-export the capability layer so users depend on one crate.
pub use flowline_core::{
  middleware, Consumer, Error, HandlerFn, Message, MiddlewareFn, Origin, Payload, Sender,
};
