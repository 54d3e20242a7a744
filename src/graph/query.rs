//! Path queries over the focused mapping graph.
//!
//! Foreign keys are traversed in both directions, but every step keeps the
//! edge exactly as it was recorded plus the direction it was walked in.
//! Results are deterministic: identical graphs and arguments always yield
//! the same paths in the same order, which the path cache relies on.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{MappingGraph, RelationshipEdge};

/// Errors that can occur during path queries.
#[derive(Debug, Error)]
pub enum PathQueryError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("max_results must be at least 1")]
    ZeroMaxResults,
}

/// Result type for path queries.
pub type PathQueryResult<T> = Result<T, PathQueryError>;

/// Limits for one path query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathQuery {
    /// Maximum number of foreign-key hops in a returned path.
    pub max_depth: usize,
    /// Maximum number of paths returned.
    pub max_results: usize,
    /// Return only minimal-length paths. When false, longer alternatives
    /// follow the shortest ones until `max_results` is reached.
    pub shortest_only: bool,
}

impl Default for PathQuery {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_results: 10,
            shortest_only: true,
        }
    }
}

impl PathQuery {
    pub fn new(max_depth: usize, max_results: usize) -> Self {
        Self {
            max_depth,
            max_results,
            ..Self::default()
        }
    }

    /// Also return paths longer than the shortest one.
    pub fn with_longer_paths(mut self) -> Self {
        self.shortest_only = false;
        self
    }
}

/// Direction a foreign-key edge was walked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the referencing table to the referenced table.
    Forward,
    /// From the referenced table back to the referencing table.
    Reverse,
}

/// One hop of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// The edge as recorded in the graph.
    pub edge: RelationshipEdge,
    pub direction: Direction,
}

impl PathStep {
    pub fn from_table(&self) -> &str {
        match self.direction {
            Direction::Forward => &self.edge.source_table,
            Direction::Reverse => &self.edge.target_table,
        }
    }

    pub fn to_table(&self) -> &str {
        match self.direction {
            Direction::Forward => &self.edge.target_table,
            Direction::Reverse => &self.edge.source_table,
        }
    }
}

/// A simple path between two tables.
///
/// A path with no steps is the trivial path from a table to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub source: String,
    pub steps: Vec<PathStep>,
}

impl PathResult {
    fn trivial(source: &str) -> Self {
        Self {
            source: source.to_string(),
            steps: Vec::new(),
        }
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn destination(&self) -> &str {
        self.steps
            .last()
            .map(PathStep::to_table)
            .unwrap_or(&self.source)
    }

    /// Tables visited, source first.
    pub fn tables(&self) -> Vec<&str> {
        std::iter::once(self.source.as_str())
            .chain(self.steps.iter().map(PathStep::to_table))
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &RelationshipEdge> {
        self.steps.iter().map(|s| &s.edge)
    }
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for step in &self.steps {
            let edge = &step.edge;
            match step.direction {
                Direction::Forward => write!(
                    f,
                    " --{}->{}--> {}",
                    edge.source_column, edge.target_column, edge.target_table
                )?,
                Direction::Reverse => write!(
                    f,
                    " <--{}<-{}-- {}",
                    edge.target_column, edge.source_column, edge.source_table
                )?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Traversal topology
// ============================================================================

/// All foreign keys between one table and one of its neighbors.
struct Hop {
    to: NodeIndex,
    /// (edge index, direction), in edge order.
    edges: Vec<(usize, Direction)>,
}

/// Undirected petgraph view of a mapping graph.
///
/// Node weights index `MappingGraph::nodes`, edge weights index
/// `MappingGraph::edges`. `hops[n]` holds the neighbors of `n` sorted by
/// table name, self references excluded.
struct Topology {
    graph: UnGraph<usize, usize>,
    index: HashMap<String, NodeIndex>,
    hops: Vec<Vec<Hop>>,
}

impl Topology {
    fn new(mapping: &MappingGraph) -> Self {
        let mut graph = UnGraph::with_capacity(mapping.nodes.len(), mapping.edges.len());
        let mut index = HashMap::with_capacity(mapping.nodes.len());
        for (i, node) in mapping.nodes.iter().enumerate() {
            index.insert(node.name.clone(), graph.add_node(i));
        }
        for (i, edge) in mapping.edges.iter().enumerate() {
            // The builder guarantees both ends are nodes.
            if let (Some(&a), Some(&b)) =
                (index.get(&edge.source_table), index.get(&edge.target_table))
            {
                graph.add_edge(a, b, i);
            }
        }
        let hops = graph
            .node_indices()
            .map(|n| Self::hops_from(&graph, mapping, n))
            .collect();
        Self { graph, index, hops }
    }

    fn hops_from(graph: &UnGraph<usize, usize>, mapping: &MappingGraph, at: NodeIndex) -> Vec<Hop> {
        let at_name = &mapping.nodes[graph[at]].name;
        let mut by_neighbor: BTreeMap<&str, Hop> = BTreeMap::new();

        for edge_ref in graph.edges(at) {
            let other = if edge_ref.source() == at {
                edge_ref.target()
            } else {
                edge_ref.source()
            };
            if other == at {
                continue;
            }
            let edge_idx = *edge_ref.weight();
            let direction = if mapping.edges[edge_idx].source_table == *at_name {
                Direction::Forward
            } else {
                Direction::Reverse
            };
            by_neighbor
                .entry(mapping.nodes[graph[other]].name.as_str())
                .or_insert_with(|| Hop {
                    to: other,
                    edges: Vec::new(),
                })
                .edges
                .push((edge_idx, direction));
        }

        by_neighbor
            .into_values()
            .map(|mut hop| {
                hop.edges
                    .sort_by(|a, b| mapping.edges[a.0].cmp(&mapping.edges[b.0]));
                hop
            })
            .collect()
    }

    /// Hop distance from every node to `target`.
    fn distances_to(&self, target: NodeIndex) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.graph.node_count()];
        let mut queue = VecDeque::new();
        dist[target.index()] = Some(0);
        queue.push_back(target);

        while let Some(current) = queue.pop_front() {
            let next = dist[current.index()].map_or(0, |d| d + 1);
            for neighbor in self.graph.neighbors(current) {
                if dist[neighbor.index()].is_none() {
                    dist[neighbor.index()] = Some(next);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }
}

/// Depth-first enumeration of simple paths of one exact length.
///
/// Neighbors are tried in table-name order and parallel edges in edge
/// order, so paths come out already sorted and the walk stops as soon as
/// `limit` paths have been produced.
struct Search<'t> {
    topology: &'t Topology,
    dist: Vec<Option<usize>>,
    to: NodeIndex,
    limit: usize,
    on_path: Vec<bool>,
    route: Vec<&'t Hop>,
    found: Vec<Vec<(usize, Direction)>>,
}

impl<'t> Search<'t> {
    fn new(topology: &'t Topology, from: NodeIndex, to: NodeIndex, limit: usize) -> Self {
        let mut on_path = vec![false; topology.graph.node_count()];
        on_path[from.index()] = true;
        Self {
            topology,
            dist: topology.distances_to(to),
            to,
            limit,
            on_path,
            route: Vec::new(),
            found: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.found.len() >= self.limit
    }

    /// Extend the current route from `at` by exactly `remaining` hops.
    fn walk(&mut self, at: NodeIndex, remaining: usize) {
        if remaining == 0 {
            if at == self.to {
                self.emit();
            }
            return;
        }

        let topology = self.topology;
        for hop in &topology.hops[at.index()] {
            if self.is_full() {
                return;
            }
            if self.on_path[hop.to.index()] {
                continue;
            }
            // Paths end at the destination.
            if hop.to == self.to && remaining != 1 {
                continue;
            }
            match self.dist[hop.to.index()] {
                Some(d) if d < remaining => {}
                _ => continue,
            }

            self.on_path[hop.to.index()] = true;
            self.route.push(hop);
            self.walk(hop.to, remaining - 1);
            self.route.pop();
            self.on_path[hop.to.index()] = false;
        }
    }

    /// Every choice of parallel edges along the current route, in edge order.
    fn emit(&mut self) {
        let mut choice = vec![0; self.route.len()];
        loop {
            if self.is_full() {
                return;
            }
            self.found.push(
                self.route
                    .iter()
                    .zip(&choice)
                    .map(|(hop, &i)| hop.edges[i])
                    .collect(),
            );

            // Advance like an odometer, last step fastest.
            let mut pos = choice.len();
            loop {
                if pos == 0 {
                    return;
                }
                pos -= 1;
                choice[pos] += 1;
                if choice[pos] < self.route[pos].edges.len() {
                    break;
                }
                choice[pos] = 0;
            }
        }
    }
}

impl MappingGraph {
    /// Find paths from `source` to `destination`.
    ///
    /// Both names must resolve to tables in the graph (see
    /// [`MappingGraph::resolve_table`]), otherwise this fails with
    /// [`PathQueryError::UnknownTable`]. Tables that are not connected within
    /// `max_depth` hops yield an empty result, not an error.
    ///
    /// Paths are simple (no table repeats) and ordered by length. Paths of
    /// equal length are ordered by the sequence of table names they visit,
    /// source first, then by their recorded edges step by step. The direction
    /// an edge was recorded in plays no part: a first hop to `account` sorts
    /// before a first hop to `bank` even when the `bank` edge is recorded as
    /// `bank -> <source>`.
    ///
    /// Shortest paths are found without dead ends, so the work is bounded by
    /// `max_results` times the path length rather than by how many shortest
    /// paths exist. Longer alternatives are searched length by length up to
    /// `max_depth` and stop once `max_results` paths are collected.
    ///
    /// # Example
    /// ```ignore
    /// let paths = graph.find_paths("user_account", "role", &PathQuery::default())?;
    /// assert_eq!(paths[0].len(), 1);
    /// ```
    pub fn find_paths(
        &self,
        source: &str,
        destination: &str,
        query: &PathQuery,
    ) -> PathQueryResult<Vec<PathResult>> {
        if query.max_results == 0 {
            return Err(PathQueryError::ZeroMaxResults);
        }
        let source = self
            .resolve_table(source)
            .ok_or_else(|| PathQueryError::UnknownTable(source.to_string()))?;
        let destination = self
            .resolve_table(destination)
            .ok_or_else(|| PathQueryError::UnknownTable(destination.to_string()))?;

        if source.name == destination.name {
            return Ok(vec![PathResult::trivial(&source.name)]);
        }

        let topology = Topology::new(self);
        let (Some(&from), Some(&to)) = (
            topology.index.get(&source.name),
            topology.index.get(&destination.name),
        ) else {
            return Ok(Vec::new());
        };

        let mut search = Search::new(&topology, from, to, query.max_results);
        let shortest = match search.dist[from.index()] {
            Some(d) if d <= query.max_depth => d,
            _ => {
                tracing::debug!(
                    source = %source.name,
                    destination = %destination.name,
                    max_depth = query.max_depth,
                    "no path within depth"
                );
                return Ok(Vec::new());
            }
        };
        let longest = if query.shortest_only {
            shortest
        } else {
            query.max_depth
        };

        for length in shortest..=longest {
            search.walk(from, length);
            if search.is_full() {
                break;
            }
        }

        Ok(search
            .found
            .into_iter()
            .map(|steps| self.materialize(&source.name, steps))
            .collect())
    }

    fn materialize(&self, source: &str, steps: Vec<(usize, Direction)>) -> PathResult {
        PathResult {
            source: source.to_string(),
            steps: steps
                .into_iter()
                .map(|(idx, direction)| PathStep {
                    edge: self.edges[idx].clone(),
                    direction,
                })
                .collect(),
        }
    }
}
