use flowline::Node;

/// Link consecutive nodes by their 0 port and return the head.
///
/// # Panics
/// When `nodes` is empty.
pub fn chain(nodes: &[&Node]) -> Node {
  let (first, rest) = nodes.split_first().expect("chain requires at least one node");
  let mut last: &Node = first;
  for &node in rest {
    last.link(0, &[node]);
    last = node;
  }
  (*first).clone()
}
