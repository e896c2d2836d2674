//! Stage graph for build dependency management.
//!
//! Every stage of every target is a node; edges run from a dependency to its dependents.
//! The merge node of an (product, OS, SDK) is the only fan-in: it depends on the install node
//! of every architecture of that SDK.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::target::{BuildTarget, ProductPlan, SdkKey, TargetKey, TargetSet};

use super::types::{ExecuteError, Stage, StageLabel};

/// What a stage node operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeScope {
  /// A whole product (download).
  Product(String),
  /// One architecture build.
  Target(TargetKey),
  /// One (product, OS, SDK) merge unit.
  Sdk(SdkKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageNode {
  pub stage: Stage,
  pub scope: NodeScope,
}

impl StageNode {
  pub fn download(product: &str) -> Self {
    Self {
      stage: Stage::Download,
      scope: NodeScope::Product(product.to_string()),
    }
  }

  pub fn target(key: &TargetKey, stage: Stage) -> Self {
    Self {
      stage,
      scope: NodeScope::Target(key.clone()),
    }
  }

  pub fn sdk(key: &SdkKey, stage: Stage) -> Self {
    Self {
      stage,
      scope: NodeScope::Sdk(key.clone()),
    }
  }

  pub fn product(&self) -> &str {
    match &self.scope {
      NodeScope::Product(product) => product,
      NodeScope::Target(key) => &key.product,
      NodeScope::Sdk(key) => &key.product,
    }
  }

  pub fn label(&self) -> StageLabel {
    match &self.scope {
      NodeScope::Product(product) => StageLabel::product(product, self.stage),
      NodeScope::Target(key) => StageLabel::target(key, self.stage),
      NodeScope::Sdk(key) => StageLabel::sdk(key, self.stage),
    }
  }
}

impl fmt::Display for StageNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.label())
  }
}

/// A DAG of stage nodes.
///
/// Provides parallel execution waves (groups of independent nodes) and dependency queries.
#[derive(Debug, Default)]
pub struct StageGraph {
  graph: DiGraph<StageNode, ()>,
  nodes: HashMap<StageNode, NodeIndex>,
}

impl StageGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build the graph for a target set.
  ///
  /// `configures` reports whether a target has a configure stage; targets without one go
  /// straight from unpack to compile.
  pub fn from_targets<F>(set: &TargetSet, configures: F) -> Result<Self, ExecuteError>
  where
    F: Fn(&ProductPlan, &BuildTarget) -> bool,
  {
    let mut dag = Self::new();

    for plan in &set.products {
      let download = dag.add_node(StageNode::download(&plan.product.name));

      for group in plan.sdk_groups() {
        let merge = dag.add_node(StageNode::sdk(&group.key, Stage::Merge));
        let package = dag.add_node(StageNode::sdk(&group.key, Stage::Package));
        dag.graph.add_edge(merge, package, ());

        for target in &group.targets {
          let unpack = dag.add_node(StageNode::target(&target.key, Stage::Unpack));
          dag.graph.add_edge(download, unpack, ());

          let mut previous = unpack;
          if configures(plan, target) {
            let configure = dag.add_node(StageNode::target(&target.key, Stage::Configure));
            dag.graph.add_edge(previous, configure, ());
            previous = configure;
          }

          let compile = dag.add_node(StageNode::target(&target.key, Stage::Compile));
          dag.graph.add_edge(previous, compile, ());
          let install = dag.add_node(StageNode::target(&target.key, Stage::Install));
          dag.graph.add_edge(compile, install, ());
          dag.graph.add_edge(install, merge, ());
        }
      }
    }

    dag.verify_acyclic()?;
    Ok(dag)
  }

  /// Add `node`, returning the existing index if it is already present.
  pub fn add_node(&mut self, node: StageNode) -> NodeIndex {
    if let Some(&idx) = self.nodes.get(&node) {
      return idx;
    }
    let idx = self.graph.add_node(node.clone());
    self.nodes.insert(node, idx);
    idx
  }

  /// Make `dependent` wait for `dependency`.
  pub fn add_dependency(&mut self, dependency: &StageNode, dependent: &StageNode) -> Result<(), ExecuteError> {
    let from = self.index(dependency)?;
    let to = self.index(dependent)?;
    self.graph.add_edge(from, to, ());
    Ok(())
  }

  fn index(&self, node: &StageNode) -> Result<NodeIndex, ExecuteError> {
    self
      .nodes
      .get(node)
      .copied()
      .ok_or_else(|| ExecuteError::NodeNotFound(node.to_string()))
  }

  /// Verify that the graph is acyclic.
  pub fn verify_acyclic(&self) -> Result<(), ExecuteError> {
    toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn contains(&self, node: &StageNode) -> bool {
    self.nodes.contains_key(node)
  }

  /// Nodes in insertion order.
  pub fn nodes(&self) -> impl Iterator<Item = &StageNode> {
    self.graph.node_indices().map(|idx| &self.graph[idx])
  }

  /// Direct dependencies of `node`.
  pub fn dependencies(&self, node: &StageNode) -> Vec<StageNode> {
    let Some(&idx) = self.nodes.get(node) else {
      return Vec::new();
    };

    let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Incoming).collect();
    deps.sort();
    deps.dedup();
    deps.into_iter().map(|dep| self.graph[dep].clone()).collect()
  }

  /// Nodes organized into parallel execution waves.
  ///
  /// Each wave contains nodes whose dependencies are all in previous waves. Within a wave,
  /// nodes keep insertion order.
  pub fn waves(&self) -> Result<Vec<Vec<StageNode>>, ExecuteError> {
    // Kahn's algorithm, level by level
    let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
    let mut node_level: HashMap<NodeIndex, usize> = HashMap::new();

    for idx in self.graph.node_indices() {
      in_degree.insert(idx, self.graph.neighbors_directed(idx, Direction::Incoming).count());
    }

    let mut current_level = 0;
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for &idx in &ready {
        node_level.insert(idx, current_level);
        remaining.remove(&idx);

        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      current_level += 1;
    }

    let mut waves: Vec<Vec<StageNode>> = vec![Vec::new(); current_level];
    for idx in self.graph.node_indices() {
      if let Some(&level) = node_level.get(&idx) {
        waves[level].push(self.graph[idx].clone());
      }
    }

    Ok(waves)
  }
}
