//! Graph node model and builder.
//!
//! A [`Node`] is a declarative description of one worker pool: how many
//! workers, how large an input buffer, which output ports exist and where
//! they lead, and the function each worker runs. Nodes are cheap handles and
//! may be linked into arbitrary multigraphs (fan-out and fan-in both
//! allowed); nothing executes until [`Node::run`] materializes the graph.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flowline_core::middleware::compose;
use flowline_core::{Consumer, Error, MiddlewareFn, Origin, Sender};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::line::Line;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// The function a node's workers run, type-erased.
///
/// Installed via [`NodeBuilder::func`]; invoked once per worker task with
/// that run's [`Worker`] capabilities.
pub type WorkerFn = Arc<dyn Fn(Worker) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Capabilities handed to a worker function for one run: the node's shared
/// input [`Consumer`] and one [`Sender`] per output port.
#[derive(Clone)]
pub struct Worker {
  consumer: Consumer,
  senders: Vec<Sender>,
  cancel: CancellationToken,
  origin: Origin,
}

impl Worker {
  pub(crate) fn new(
    consumer: Consumer,
    senders: Vec<Sender>,
    cancel: CancellationToken,
    origin: Origin,
  ) -> Self {
    Self {
      consumer,
      senders,
      cancel,
      origin,
    }
  }

  /// The node's input consumer. All workers of the node share the underlying
  /// channel; every message is delivered to exactly one of them.
  pub fn consumer(&self) -> Consumer {
    self.consumer.clone()
  }

  /// The sender for output port `port`.
  ///
  /// A port with no declared targets (or an index past the declared ports)
  /// yields a sender with no outputs, which accepts every value as a no-op.
  pub fn sender(&self, port: usize) -> Sender {
    match self.senders.get(port) {
      Some(sender) => sender.clone(),
      None => Sender::new(self.cancel.clone(), Some(self.origin.clone()), Vec::new()),
    }
  }
}

/// Key selecting an output port, either by index or by declared name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortKey {
  Index(usize),
  Name(String),
}

impl From<usize> for PortKey {
  fn from(index: usize) -> Self {
    PortKey::Index(index)
  }
}

impl From<&str> for PortKey {
  fn from(name: &str) -> Self {
    PortKey::Name(name.to_string())
  }
}

impl From<String> for PortKey {
  fn from(name: String) -> Self {
    PortKey::Name(name)
  }
}

pub(crate) struct NodeInner {
  id: u64,
  name: Option<String>,
  workers: usize,
  buffer: usize,
  outputs: Vec<String>,
  func: WorkerFn,
  middleware: Option<MiddlewareFn>,
  /// Output port index -> ordered downstream nodes. Mutable through `link`
  /// until a run begins; the runtime only takes snapshots.
  targets: Mutex<BTreeMap<usize, Vec<Node>>>,
}

/// A declarative worker-pool description, and the handle graphs are built
/// from. Cloning shares the same node.
#[derive(Clone)]
pub struct Node {
  inner: Arc<NodeInner>,
}

impl Node {
  pub fn builder() -> NodeBuilder {
    NodeBuilder::new()
  }

  /// Append `targets` to the edge list of the output port selected by `key`.
  ///
  /// A name that matches none of the declared outputs is silently ignored
  /// and creates no link. Linking the same target twice delivers every
  /// message twice.
  pub fn link(&self, key: impl Into<PortKey>, targets: &[&Node]) {
    let key = key.into();
    let Some(port) = self.resolve_port(&key) else {
      debug!(node = %self, key = ?key, "ignoring link for unknown output");
      return;
    };
    let mut groups = self.inner.targets.lock().unwrap();
    groups
      .entry(port)
      .or_default()
      .extend(targets.iter().map(|target| (*target).clone()));
  }

  /// Execute the graph reachable from this node and block until every worker
  /// has terminated. Returns the first worker error, if any.
  pub async fn run(&self) -> Result<(), Error> {
    self.run_with(CancellationToken::new()).await
  }

  /// Like [`run`](Node::run), with a caller-supplied cancellation token.
  /// Cancelling the token stops all workers cooperatively.
  pub async fn run_with(&self, cancel: CancellationToken) -> Result<(), Error> {
    Line::run(self, cancel).await
  }

  pub fn name(&self) -> Option<&str> {
    self.inner.name.as_deref()
  }

  /// Configured worker count; 0 means unset and runs as 1.
  pub fn workers(&self) -> usize {
    self.inner.workers
  }

  /// Input channel capacity; 0 is a rendez-vous channel.
  pub fn buffer(&self) -> usize {
    self.inner.buffer
  }

  /// Declared output port names, in port order.
  pub fn outputs(&self) -> &[String] {
    &self.inner.outputs
  }

  pub(crate) fn id(&self) -> u64 {
    self.inner.id
  }

  pub(crate) fn func(&self) -> WorkerFn {
    Arc::clone(&self.inner.func)
  }

  pub(crate) fn middleware(&self) -> Option<MiddlewareFn> {
    self.inner.middleware.clone()
  }

  pub(crate) fn origin(&self) -> Origin {
    Origin::new(self.inner.id, self.to_string())
  }

  /// Snapshot of the outgoing edges, port index -> targets.
  pub(crate) fn target_groups(&self) -> BTreeMap<usize, Vec<Node>> {
    self.inner.targets.lock().unwrap().clone()
  }

  /// Number of output ports: enough for every declared name and every
  /// linked index.
  pub(crate) fn port_count(&self) -> usize {
    let groups = self.inner.targets.lock().unwrap();
    let linked = groups.keys().next_back().map_or(0, |port| port + 1);
    linked.max(self.inner.outputs.len())
  }

  fn resolve_port(&self, key: &PortKey) -> Option<usize> {
    match key {
      PortKey::Index(index) => Some(*index),
      PortKey::Name(name) => self.inner.outputs.iter().position(|output| output == name),
    }
  }
}

impl fmt::Display for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut label = self.inner.name.clone().unwrap_or_default();
    if !self.inner.outputs.is_empty() {
      label.push(':');
      label.push_str(&self.inner.outputs.join(","));
    }
    if label.is_empty() {
      write!(f, "<unnamed#{}>", self.inner.id)
    } else {
      write!(f, "<{label}>")
    }
  }
}

/// Builder for [`Node`]. All options chain by value; [`build`]
/// (NodeBuilder::build) panics when no worker function was installed.
#[derive(Default)]
pub struct NodeBuilder {
  name: Option<String>,
  workers: usize,
  buffer: usize,
  outputs: Vec<String>,
  func: Option<WorkerFn>,
  middleware: Vec<MiddlewareFn>,
  targets: Vec<(PortKey, Vec<Node>)>,
  sources: Vec<(PortKey, Vec<Node>)>,
}

impl NodeBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Optional label, for diagnostics and the DOT dump.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Number of concurrent workers; unset runs as 1.
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  /// Input channel capacity; 0 (the default) is a rendez-vous channel.
  pub fn buffer(mut self, buffer: usize) -> Self {
    self.buffer = buffer;
    self
  }

  /// Declare output port names; the i-th name labels port i.
  pub fn outputs<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.outputs = names.into_iter().map(Into::into).collect();
    self
  }

  /// The function each worker runs, operating on the [`Worker`]
  /// capabilities.
  pub fn func<F, Fut>(mut self, func: F) -> Self
  where
    F: Fn(Worker) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
  {
    self.func = Some(Arc::new(move |worker: Worker| -> BoxFuture<'static, Result<(), Error>> {
      Box::pin(func(worker))
    }));
    self
  }

  /// Link this node's output port `key` to `targets`.
  pub fn target(mut self, key: impl Into<PortKey>, targets: &[&Node]) -> Self {
    self
      .targets
      .push((key.into(), targets.iter().map(|t| (*t).clone()).collect()));
    self
  }

  /// Link each source's output port `key` to this node. Symmetric to
  /// [`target`](NodeBuilder::target), resolved against the source's declared
  /// outputs.
  pub fn source(mut self, key: impl Into<PortKey>, sources: &[&Node]) -> Self {
    self
      .sources
      .push((key.into(), sources.iter().map(|s| (*s).clone()).collect()));
    self
  }

  /// Append consumer middleware; declared order composes first-outermost.
  pub fn middleware(mut self, middleware: MiddlewareFn) -> Self {
    self.middleware.push(middleware);
    self
  }

  /// Apply a reusable group of options.
  ///
  /// ```ignore
  /// fn wide(b: NodeBuilder) -> NodeBuilder {
  ///   b.workers(8).buffer(64)
  /// }
  /// let node = Node::builder().apply(wide).func(...).build();
  /// ```
  pub fn apply<F: FnOnce(Self) -> Self>(self, options: F) -> Self {
    options(self)
  }

  /// Build the node and install any declared links.
  ///
  /// # Panics
  /// When no worker function was installed.
  pub fn build(self) -> Node {
    let func = self.func.expect("node requires a worker function");
    let middleware = if self.middleware.is_empty() {
      None
    } else {
      Some(compose(self.middleware))
    };
    let node = Node {
      inner: Arc::new(NodeInner {
        id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
        name: self.name,
        workers: self.workers,
        buffer: self.buffer,
        outputs: self.outputs,
        func,
        middleware,
        targets: Mutex::new(BTreeMap::new()),
      }),
    };
    for (key, targets) in self.targets {
      let targets: Vec<&Node> = targets.iter().collect();
      node.link(key, &targets);
    }
    for (key, sources) in self.sources {
      for source in sources {
        source.link(key.clone(), &[&node]);
      }
    }
    node
  }
}
