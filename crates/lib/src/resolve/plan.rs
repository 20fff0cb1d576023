//! Parallel execution waves.
//!
//! A resolved order is turned into a graph with edges from each dependency to
//! its dependents, then levelled with Kahn's algorithm: every member of a wave
//! has all of its dependencies in earlier waves.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::formula::Formula;
use crate::platform::Os;

use super::ResolveError;

/// Group `resolved` into waves, each ordered by resolved position.
///
/// Edges restricted to platforms other than `os` are ignored, matching the
/// resolver. Dependencies outside `resolved` are ignored too.
///
/// # Errors
///
/// Returns `CyclicDependency` if the edges among `resolved` contain a cycle.
pub fn plan<'a>(resolved: &'a [Formula], os: Option<Os>) -> Result<Vec<Vec<&'a Formula>>, ResolveError> {
  let mut graph: DiGraph<usize, ()> = DiGraph::new();
  let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

  for (position, formula) in resolved.iter().enumerate() {
    let idx = graph.add_node(position);
    nodes.insert(formula.name.as_str(), idx);
  }

  for formula in resolved {
    let dependent = nodes[formula.name.as_str()];
    for dep in formula.dependencies_for(os) {
      if let Some(&dependency) = nodes.get(dep.name.as_str()) {
        graph.update_edge(dependency, dependent, ());
      }
    }
  }

  let mut in_degree: HashMap<NodeIndex, usize> = graph
    .node_indices()
    .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
    .collect();
  let mut remaining: Vec<NodeIndex> = graph.node_indices().collect();
  let mut waves = Vec::new();

  while !remaining.is_empty() {
    let (mut ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) =
      remaining.into_iter().partition(|idx| in_degree[idx] == 0);

    if ready.is_empty() {
      return Err(ResolveError::CyclicDependency {
        cycle: rest.iter().map(|idx| resolved[graph[*idx]].name.clone()).collect(),
      });
    }

    ready.sort_by_key(|idx| graph[*idx]);
    for &idx in &ready {
      for dependent in graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(deg) = in_degree.get_mut(&dependent) {
          *deg = deg.saturating_sub(1);
        }
      }
    }

    waves.push(ready.iter().map(|idx| &resolved[graph[*idx]]).collect());
    remaining = rest;
  }

  Ok(waves)
}
