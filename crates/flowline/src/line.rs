//! Per-run graph materialization and execution.
//!
//! A `Line` exists for exactly one `run` call. It walks the graph from the
//! run root, creating one bounded input channel per node and one producer
//! refcount per channel, schedules every node's workers, then drives them to
//! completion: the first worker error cancels the shared token and becomes
//! the run result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flowline_core::{Consumer, Error, Message, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::node::{Node, Worker, WorkerFn};

struct ChannelEntry {
  /// Canonical write side. Dropped when the refcount reaches zero, which
  /// closes the channel once the finished producers' sender clones are gone.
  tx: Option<flume::Sender<Message>>,
  /// Keeps the receive side open for the whole run: producers into a node
  /// whose workers returned early must keep blocking until cancellation
  /// rather than observe a disconnect.
  rx: flume::Receiver<Message>,
  /// Live producer workers bound to this channel.
  refs: usize,
}

type ChannelTable = Arc<Mutex<HashMap<u64, ChannelEntry>>>;

struct WorkerSpec {
  func: WorkerFn,
  ctx: Worker,
  /// Downstream channels to release on termination, one entry per sender
  /// output occurrence.
  releases: Vec<u64>,
}

pub(crate) struct Line {
  cancel: CancellationToken,
  table: ChannelTable,
  scheduled: Vec<WorkerSpec>,
}

impl Line {
  pub(crate) async fn run(root: &Node, cancel: CancellationToken) -> Result<(), Error> {
    let mut line = Line {
      cancel: cancel.child_token(),
      table: Arc::new(Mutex::new(HashMap::new())),
      scheduled: Vec::new(),
    };
    debug!(root = %root, "materializing line");
    // The root's refcount of 1 is a sentinel no producer ever decrements, so
    // the root's input channel never closes on its own; a consuming root
    // parks until the run token fires.
    line.materialize(root, 1);
    line.execute().await
  }

  /// Get or create the input channel for `node`, binding `producers`
  /// additional writers to it. The first visit creates the channel,
  /// recursively materializes every downstream target and schedules the
  /// node's workers; later visits (fan-in, diamonds) only bump the refcount.
  /// Returns the write side for the caller's sender.
  fn materialize(&mut self, node: &Node, producers: usize) -> flume::Sender<Message> {
    let tx = {
      let mut table = self.table.lock().unwrap();
      if let Some(entry) = table.get_mut(&node.id()) {
        entry.refs += producers;
        // Workers only start after the walk completes, so no release can
        // have dropped the write side yet.
        return entry.tx.clone().expect("channel released during the walk");
      }
      let (tx, rx) = flume::bounded(node.buffer());
      table.insert(
        node.id(),
        ChannelEntry {
          tx: Some(tx.clone()),
          rx,
          refs: producers,
        },
      );
      tx
    };
    trace!(node = %node, buffer = node.buffer(), producers, "created input channel");

    let workers = node.workers().max(1);
    let origin = node.origin();
    let groups = node.target_groups();
    let ports = node.port_count();

    let mut senders = Vec::with_capacity(ports);
    let mut releases = Vec::new();
    for port in 0..ports {
      let mut outputs = Vec::new();
      if let Some(targets) = groups.get(&port) {
        for target in targets {
          // Each of this node's workers counts as one producer downstream.
          outputs.push(self.materialize(target, workers));
          releases.push(target.id());
        }
      }
      senders.push(Sender::new(self.cancel.clone(), Some(origin.clone()), outputs));
    }

    let consumer = {
      let table = self.table.lock().unwrap();
      let entry = table.get(&node.id()).expect("channel registered above");
      Consumer::new(self.cancel.clone(), entry.rx.clone(), node.middleware())
    };
    let ctx = Worker::new(consumer, senders, self.cancel.clone(), origin);

    debug!(node = %node, workers, "scheduling workers");
    for _ in 0..workers {
      self.scheduled.push(WorkerSpec {
        func: node.func(),
        ctx: ctx.clone(),
        releases: releases.clone(),
      });
    }

    tx
  }

  /// Spawn every scheduled worker and drain them. The first error wins,
  /// cancels the shared token and is returned; results arriving after it
  /// (including cancellations) are discarded.
  async fn execute(self) -> Result<(), Error> {
    let Line {
      cancel,
      table,
      scheduled,
    } = self;

    let mut tasks: JoinSet<Result<(), Error>> = JoinSet::new();
    for spec in scheduled {
      let table = Arc::clone(&table);
      tasks.spawn(async move {
        let WorkerSpec {
          func,
          ctx,
          releases,
        } = spec;
        let result = func(ctx).await;
        release(&table, &releases);
        result
      });
    }

    let mut first: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
      let result = match joined {
        Ok(result) => result,
        Err(join_err) => Err(Error::Worker(join_err.to_string())),
      };
      if let Err(err) = result {
        if first.is_none() {
          error!(error = %err, "worker failed, cancelling line");
          cancel.cancel();
          first = Some(err);
        }
      }
    }
    match first {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

/// Drop one producer reference from each listed channel. On the transition
/// to zero the canonical write side is dropped, closing the channel exactly
/// once; the entry itself stays registered for the rest of the run.
fn release(table: &ChannelTable, ids: &[u64]) {
  let mut table = table.lock().unwrap();
  for &id in ids {
    let Some(entry) = table.get_mut(&id) else {
      continue;
    };
    entry.refs = entry.refs.saturating_sub(1);
    if entry.refs == 0 && entry.tx.take().is_some() {
      trace!(node_id = id, "closed input channel");
    }
  }
}
