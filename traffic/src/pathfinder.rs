use glam::Vec2;
use internment::Intern;
use itertools::Itertools;
use petgraph::{
  Graph, Undirected,
  algo::astar,
  graph::{EdgeIndex, NodeIndex},
  visit::IntoNodeReferences,
};
use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
  #[default]
  Taxiway,
  Runway,
  HoldShort,
  Gate,
  Pushback,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node<T> {
  pub name: Intern<String>,
  pub kind: NodeKind,

  #[serde(default)]
  pub data: T,
}

impl<T> Node<T> {
  pub fn new(name: Intern<String>, kind: NodeKind, value: T) -> Self {
    Self {
      name,
      kind,
      data: value,
    }
  }
}

pub fn display_route(network: &GroundNetwork, route: &GroundRoute) -> String {
  route
    .nodes
    .iter()
    .filter_map(|i| network.node(*i))
    .map(|n| format!("{:?}: {}", n.kind, n.name))
    .join(", ")
}

type GroundGraph = Graph<Node<Vec2>, f32, Undirected>;

/// A shortest route through the ground network, including both endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundRoute {
  pub nodes: Vec<NodeIndex>,
  pub distance: f32,
}

impl GroundRoute {
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Taxiway graph of an airport. Node data is the position in feet and edge
/// weights are segment lengths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroundNetwork {
  pub graph: GroundGraph,
}

impl GroundNetwork {
  pub fn new() -> Self {
    Self {
      graph: GroundGraph::new_undirected(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn add_node(&mut self, node: Node<Vec2>) -> NodeIndex {
    self.graph.add_node(node)
  }

  /// Connects two nodes with a segment weighted by their distance.
  pub fn connect(&mut self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
    let length = self.position(a)?.distance(self.position(b)?);
    Some(self.graph.update_edge(a, b, length))
  }

  pub fn node(&self, index: NodeIndex) -> Option<&Node<Vec2>> {
    self.graph.node_weight(index)
  }

  pub fn position(&self, index: NodeIndex) -> Option<Vec2> {
    self.node(index).map(|n| n.data)
  }

  pub fn node_by_name(&self, name: Intern<String>) -> Option<NodeIndex> {
    self
      .graph
      .node_references()
      .find(|(_, n)| n.name == name)
      .map(|(i, _)| i)
  }

  pub fn nearest_node(&self, pos: Vec2) -> Option<NodeIndex> {
    self.nearest_matching(pos, |_| true)
  }

  /// Nearest node that lies on a runway.
  pub fn nearest_runway_node(&self, pos: Vec2) -> Option<NodeIndex> {
    self.nearest_matching(pos, |n| n.kind == NodeKind::Runway)
  }

  fn nearest_matching(
    &self,
    pos: Vec2,
    filter: impl Fn(&Node<Vec2>) -> bool,
  ) -> Option<NodeIndex> {
    self
      .graph
      .node_references()
      .filter(|(_, n)| filter(n))
      .min_by(|(_, a), (_, b)| {
        a.data
          .distance_squared(pos)
          .total_cmp(&b.data.distance_squared(pos))
      })
      .map(|(i, _)| i)
  }

  /// Shortest route between two nodes, or `None` when either node is unknown
  /// or they are not connected.
  pub fn shortest_route(
    &self,
    from: NodeIndex,
    to: NodeIndex,
  ) -> Option<GroundRoute> {
    let goal = self.position(to)?;
    self.position(from)?;

    let (distance, nodes) = astar(
      &self.graph,
      from,
      |n| n == to,
      |e| *e.weight(),
      |n| self.graph[n].data.distance(goal),
    )?;

    Some(GroundRoute { nodes, distance })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn node(name: &str, kind: NodeKind, x: f32, y: f32) -> Node<Vec2> {
    Node::new(Intern::from_ref(name), kind, Vec2::new(x, y))
  }

  /// A - B - C
  ///     |   |
  ///     D - E (runway)
  fn square() -> (GroundNetwork, [NodeIndex; 5]) {
    let mut network = GroundNetwork::new();
    let a = network.add_node(node("A", NodeKind::Gate, 0.0, 0.0));
    let b = network.add_node(node("B", NodeKind::Taxiway, 100.0, 0.0));
    let c = network.add_node(node("C", NodeKind::Taxiway, 200.0, 0.0));
    let d = network.add_node(node("D", NodeKind::Taxiway, 100.0, -300.0));
    let e = network.add_node(node("E", NodeKind::Runway, 200.0, -100.0));

    network.connect(a, b);
    network.connect(b, c);
    network.connect(b, d);
    network.connect(c, e);
    network.connect(d, e);

    (network, [a, b, c, d, e])
  }

  #[test]
  fn shortest_route_prefers_short_side() {
    let (network, [a, b, c, _, e]) = square();

    let route = network.shortest_route(a, e);
    assert!(route.is_some());
    if let Some(route) = route {
      assert_eq!(route.nodes, vec![a, b, c, e]);
      assert!((route.distance - 300.0).abs() < 0.01);
    }
  }

  #[test]
  fn shortest_route_disconnected() {
    let (mut network, [a, ..]) = square();
    let island = network.add_node(node("X", NodeKind::Taxiway, 900.0, 900.0));

    assert_eq!(network.shortest_route(a, island), None);
  }

  #[test]
  fn shortest_route_same_node() {
    let (network, [a, ..]) = square();

    let route = network.shortest_route(a, a);
    assert_eq!(route.map(|r| r.len()), Some(1));
  }

  #[test]
  fn nearest_nodes() {
    let (network, [_, b, _, _, e]) = square();

    assert_eq!(network.nearest_node(Vec2::new(90.0, 10.0)), Some(b));
    assert_eq!(network.nearest_runway_node(Vec2::new(0.0, 0.0)), Some(e));
    assert_eq!(network.node_by_name(Intern::from_ref("E")), Some(e));
  }

  #[test]
  fn connect_unknown_node() {
    let (mut network, [a, ..]) = square();
    assert_eq!(network.connect(a, NodeIndex::new(42)), None);
  }
}
