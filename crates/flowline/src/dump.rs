//! DOT serialization of a node graph, for diagnostics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;

use crate::node::Node;

/// Render the graph reachable from `root` in graphviz dot language.
///
/// The root is drawn as a green circle, sinks (nodes with no outgoing edges)
/// as blue circles; nodes with more than one worker get extra peripheries,
/// and worker/buffer settings are annotated in the label. Edges are labelled
/// with the upstream output name where one is declared.
pub fn dump_dot(root: &Node) -> String {
  let mut writer = DotWriter::default();
  let mut edges = String::new();
  writer.links(&mut edges, root, true);

  let mut out = String::new();
  out.push_str("digraph {\n");
  out.push_str("\tnode[shape=square, style=\"filled,rounded\", width=1, color=\"#aaaaaa\"]\n");
  out.push_str(&edges);
  for (name, style) in &writer.styles {
    let _ = writeln!(out, "\t{name:?}[{style}]");
  }
  out.push_str("}\n");
  out
}

#[derive(Default)]
struct DotWriter {
  visited: HashSet<u64>,
  styles: BTreeMap<String, String>,
  generated: HashMap<u64, String>,
}

impl DotWriter {
  fn node_name(&mut self, node: &Node) -> String {
    if let Some(name) = node.name() {
      return name.to_string();
    }
    if let Some(generated) = self.generated.get(&node.id()) {
      return generated.clone();
    }
    let generated = format!("<unnamed#{}>", self.generated.len() + 1);
    self.generated.insert(node.id(), generated.clone());
    generated
  }

  fn links(&mut self, out: &mut String, node: &Node, is_root: bool) {
    let name = self.node_name(node);
    if is_root {
      self
        .styles
        .insert(name.clone(), r##"shape=circle, fillcolor="#77ee77""##.to_string());
    }
    if !self.visited.insert(node.id()) {
      return;
    }

    let groups = node.target_groups();

    let mut style = String::new();
    let mut annotations = Vec::new();
    if groups.is_empty() {
      style.push_str(r##"shape=circle fillcolor="#aaaaff""##);
    }
    if node.workers() > 1 {
      style.push_str(" peripheries=3");
      annotations.push(format!("workers: {}", node.workers()));
    }
    if node.buffer() > 1 {
      annotations.push(format!("bufsize: {}", node.buffer()));
    }
    if !annotations.is_empty() {
      let _ = write!(
        style,
        r#" label=<{}<br/><br/><font point-size="8">{}</font>>"#,
        name,
        annotations.join("<br/>")
      );
    }
    if !style.is_empty() {
      self.styles.insert(name.clone(), style);
    }

    for (port, targets) in &groups {
      for target in targets {
        self.links(out, target, false);
        let target_name = self.node_name(target);
        let _ = write!(out, "\t{name:?} -> {target_name:?}");
        if let Some(output) = node.outputs().get(*port) {
          let _ = write!(out, " [label={output:?}]");
        }
        out.push('\n');
      }
    }
  }
}
