//! Waypoint-graph navigable surface.
//!
//! The surface is approximated by a set of nodes joined by walkable edges.
//! A point is "on the surface" when it lies within the sampling radius of an
//! edge segment (or of an isolated node).
//!
//! [`NavGraph::query_path`] attaches the goal to its nearest node and runs
//! Dijkstra's algorithm over edge lengths from there.  The start joins the
//! graph through whichever end of its closest edge is cheaper overall, so an
//! agent halfway along a corridor is never sent back to the corner behind it.
//!
//! * goal node reachable → [`PathStatus::Complete`], polyline
//!   `start, n0, …, nk, end`;
//! * goal missing or unreachable → [`PathStatus::Partial`], polyline to the
//!   reachable node closest to `end`;
//! * start not near the graph → [`PathStatus::Unreachable`].
//!
//! # Example
//!
//! ```rust
//! use wayfind_spatial::nav_graph::NavGraph;
//! use wayfind_spatial::path::{PathQuery, PathStatus};
//! use wayfind_types::Vec3;
//!
//! let mut graph = NavGraph::new();
//! let a = graph.add_node(Vec3::new(0.0, 0.0, 0.0));
//! let b = graph.add_node(Vec3::new(10.0, 0.0, 0.0));
//! let c = graph.add_node(Vec3::new(10.0, 0.0, 10.0));
//! graph.connect(a, b).unwrap();
//! graph.connect(b, c).unwrap();
//!
//! let result = graph.query_path(Vec3::zero(), Vec3::new(10.0, 0.0, 10.0));
//! assert_eq!(result.status, PathStatus::Complete);
//! assert!((result.length() - 20.0).abs() < 1e-4);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use thiserror::Error;
use tracing::debug;
use wayfind_types::Vec3;

use crate::path::{PathQuery, PathQueryResult, PathStatus};

/// Default radius used to attach query endpoints to graph nodes.
pub const DEFAULT_SNAP_RADIUS: f32 = 10.0;

/// Consecutive waypoints closer than this are merged.
const MERGE_EPSILON: f32 = 1e-4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavGraphError {
    #[error("edge references unknown node {0}")]
    UnknownNode(usize),
}

// ────────────────────────────────────────────────────────────────────────────
// Dijkstra frontier entry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f32,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    // Reversed so the std max-heap pops the cheapest entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// NavGraph
// ────────────────────────────────────────────────────────────────────────────

/// Undirected waypoint graph with Euclidean edge costs.
#[derive(Debug, Clone)]
pub struct NavGraph {
    nodes: Vec<Vec3>,
    adjacency: Vec<Vec<(usize, f32)>>,
    snap_radius: f32,
}

impl Default for NavGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NavGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            adjacency: Vec::new(),
            snap_radius: DEFAULT_SNAP_RADIUS,
        }
    }

    /// Override the radius used to attach query endpoints to nodes.
    pub fn with_snap_radius(mut self, radius: f32) -> Self {
        self.snap_radius = radius;
        self
    }

    /// Add a node and return its index.
    pub fn add_node(&mut self, position: Vec3) -> usize {
        self.nodes.push(position);
        self.adjacency.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Join nodes `a` and `b` with a walkable edge in both directions.
    pub fn connect(&mut self, a: usize, b: usize) -> Result<(), NavGraphError> {
        let pa = *self.nodes.get(a).ok_or(NavGraphError::UnknownNode(a))?;
        let pb = *self.nodes.get(b).ok_or(NavGraphError::UnknownNode(b))?;
        let cost = pa.distance(pb);
        self.adjacency[a].push((b, cost));
        self.adjacency[b].push((a, cost));
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> Option<Vec3> {
        self.nodes.get(index).copied()
    }

    /// Index of the node nearest to `point` within `radius`.
    pub fn nearest_node(&self, point: Vec3, radius: f32) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (i, n.distance(point)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Shortest-path tree from `source`: `(cost, predecessor)` per node.
    fn dijkstra(&self, source: usize) -> (Vec<f32>, Vec<Option<usize>>) {
        let mut cost = vec![f32::INFINITY; self.nodes.len()];
        let mut prev = vec![None; self.nodes.len()];
        let mut heap = BinaryHeap::new();

        cost[source] = 0.0;
        heap.push(Frontier {
            cost: 0.0,
            node: source,
        });

        while let Some(Frontier { cost: c, node }) = heap.pop() {
            if c > cost[node] {
                continue;
            }
            for &(next, edge) in &self.adjacency[node] {
                let candidate = c + edge;
                if candidate < cost[next] {
                    cost[next] = candidate;
                    prev[next] = Some(node);
                    heap.push(Frontier {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }
        (cost, prev)
    }

    fn node_chain(&self, prev: &[Option<usize>], goal: usize) -> Vec<Vec3> {
        let mut chain = vec![self.nodes[goal]];
        let mut cursor = goal;
        while let Some(p) = prev[cursor] {
            chain.push(self.nodes[p]);
            cursor = p;
        }
        chain.reverse();
        chain
    }

    /// Every undirected edge once, as `(a, b)` with `a < b`.
    fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(a, edges)| {
            edges
                .iter()
                .filter(move |(b, _)| a < *b)
                .map(move |(b, _)| (a, *b))
        })
    }

    /// Nodes through which `point` can join the graph: both ends of the
    /// closest edge within the snap radius, else the nearest node.  Sorted
    /// nearest first.
    fn entry_candidates(&self, point: Vec3) -> Vec<usize> {
        let closest_edge = self
            .edges()
            .map(|(a, b)| {
                let d = closest_on_segment(point, self.nodes[a], self.nodes[b]).distance(point);
                ((a, b), d)
            })
            .filter(|(_, d)| *d <= self.snap_radius)
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map(|(edge, _)| edge);

        let mut candidates = match closest_edge {
            Some((a, b)) => vec![a, b],
            None => self.nearest_node(point, self.snap_radius).into_iter().collect(),
        };
        candidates.sort_by(|a, b| {
            self.nodes[*a]
                .distance(point)
                .total_cmp(&self.nodes[*b].distance(point))
        });
        candidates
    }

    /// Route from `start` to the goal whose shortest-path tree is
    /// `(cost, next_hop)`, entering through the cheapest candidate node.
    fn complete_route(
        &self,
        start: Vec3,
        end: Vec3,
        cost: &[f32],
        next_hop: &[Option<usize>],
    ) -> Option<Vec<Vec3>> {
        let via = |n: usize| self.nodes[n].distance(start) + cost[n];
        let entry = self
            .entry_candidates(start)
            .into_iter()
            .filter(|n| cost[*n].is_finite())
            .min_by(|a, b| via(*a).total_cmp(&via(*b)))?;

        let mut waypoints = Vec::new();
        push_merged(&mut waypoints, start);
        let mut cursor = Some(entry);
        while let Some(n) = cursor {
            push_merged(&mut waypoints, self.nodes[n]);
            cursor = next_hop[n];
        }
        push_merged(&mut waypoints, end);
        Some(waypoints)
    }

    /// Best effort when the goal cannot be reached: walk to the reachable
    /// node closest to `end`.
    fn partial_route(&self, start: Vec3, end: Vec3) -> PathQueryResult {
        let Some(source) = self.entry_candidates(start).first().copied() else {
            debug!(start = %start, "query start is not near the navigable graph");
            return PathQueryResult::unreachable();
        };
        let (cost, prev) = self.dijkstra(source);
        let closest = (0..self.nodes.len())
            .filter(|i| cost[*i].is_finite())
            .min_by(|a, b| {
                self.nodes[*a]
                    .distance(end)
                    .total_cmp(&self.nodes[*b].distance(end))
            })
            .unwrap_or(source);

        let mut waypoints = Vec::new();
        push_merged(&mut waypoints, start);
        for p in self.node_chain(&prev, closest) {
            push_merged(&mut waypoints, p);
        }
        PathQueryResult::new(waypoints, PathStatus::Partial)
    }
}

/// Closest point to `p` on segment `a`–`b`.
fn closest_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b.sub(a);
    let len_sq = ab.dot(ab);
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = (p.sub(a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a.add(ab.scale(t))
}

fn push_merged(out: &mut Vec<Vec3>, p: Vec3) {
    if out.last().is_none_or(|last| last.distance(p) > MERGE_EPSILON) {
        out.push(p);
    }
}

impl PathQuery for NavGraph {
    fn query_path(&self, start: Vec3, end: Vec3) -> PathQueryResult {
        // The graph is undirected, so a tree rooted at the goal gives every
        // node's cost-to-goal and next hop at once.
        if let Some(goal) = self.nearest_node(end, self.snap_radius) {
            let (cost, next_hop) = self.dijkstra(goal);
            if let Some(waypoints) = self.complete_route(start, end, &cost, &next_hop) {
                return PathQueryResult::new(waypoints, PathStatus::Complete);
            }
        }
        self.partial_route(start, end)
    }

    fn sample_navigable(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        let on_edges = self
            .edges()
            .map(|(a, b)| closest_on_segment(point, self.nodes[a], self.nodes[b]));
        let isolated = self
            .adjacency
            .iter()
            .enumerate()
            .filter(|(_, edges)| edges.is_empty())
            .map(|(i, _)| self.nodes[i]);

        on_edges
            .chain(isolated)
            .map(|c| (c, c.distance(point)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An L-shaped corridor plus one disconnected island node.
    fn corridor() -> NavGraph {
        let mut g = NavGraph::new().with_snap_radius(3.0);
        let a = g.add_node(Vec3::new(0.0, 0.0, 0.0));
        let b = g.add_node(Vec3::new(10.0, 0.0, 0.0));
        let c = g.add_node(Vec3::new(10.0, 0.0, 10.0));
        g.add_node(Vec3::new(50.0, 0.0, 50.0));
        g.connect(a, b).unwrap();
        g.connect(b, c).unwrap();
        g
    }

    #[test]
    fn complete_path_follows_edges() {
        let g = corridor();
        let result = g.query_path(Vec3::new(0.5, 0.0, 0.0), Vec3::new(10.0, 0.0, 9.5));
        assert_eq!(result.status, PathStatus::Complete);
        assert_eq!(result.waypoints.first(), Some(&Vec3::new(0.5, 0.0, 0.0)));
        assert_eq!(result.waypoints.last(), Some(&Vec3::new(10.0, 0.0, 9.5)));
        assert!(result.waypoints.contains(&Vec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn disconnected_goal_yields_partial_path() {
        let g = corridor();
        let result = g.query_path(Vec3::zero(), Vec3::new(50.0, 0.0, 50.0));
        assert_eq!(result.status, PathStatus::Partial);
        // Closest reachable node to the island is the far corner.
        assert_eq!(result.waypoints.last(), Some(&Vec3::new(10.0, 0.0, 10.0)));
        assert!(result.end_gap(Vec3::new(50.0, 0.0, 50.0)).unwrap() > 1.0);
    }

    #[test]
    fn start_off_graph_is_unreachable() {
        let g = corridor();
        let result = g.query_path(Vec3::new(-30.0, 0.0, -30.0), Vec3::zero());
        assert_eq!(result.status, PathStatus::Unreachable);
        assert!(result.waypoints.is_empty());
    }

    #[test]
    fn dijkstra_prefers_shorter_detour() {
        let mut g = NavGraph::new();
        let a = g.add_node(Vec3::new(0.0, 0.0, 0.0));
        let far = g.add_node(Vec3::new(5.0, 0.0, 20.0));
        let near = g.add_node(Vec3::new(5.0, 0.0, 1.0));
        let goal = g.add_node(Vec3::new(10.0, 0.0, 0.0));
        g.connect(a, far).unwrap();
        g.connect(far, goal).unwrap();
        g.connect(a, near).unwrap();
        g.connect(near, goal).unwrap();

        let result = g.query_path(Vec3::zero(), Vec3::new(10.0, 0.0, 0.0));
        assert!(result.waypoints.contains(&Vec3::new(5.0, 0.0, 1.0)));
        assert!(!result.waypoints.contains(&Vec3::new(5.0, 0.0, 20.0)));
    }

    #[test]
    fn mid_corridor_start_heads_forward() {
        let g = corridor();
        let result = g.query_path(Vec3::new(4.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 10.0));
        assert_eq!(result.status, PathStatus::Complete);
        assert!(!result.waypoints.contains(&Vec3::zero()));
        assert!((result.length() - 16.0).abs() < 1e-4);
    }

    #[test]
    fn sample_navigable_projects_onto_edges() {
        let g = corridor();
        let hit = g.sample_navigable(Vec3::new(4.0, 0.0, 0.4), 0.5).unwrap();
        assert!((hit.x - 4.0).abs() < 1e-5);
        assert!(hit.z.abs() < 1e-5);
        assert!(g.sample_navigable(Vec3::new(4.0, 0.0, 3.0), 0.5).is_none());
    }

    #[test]
    fn sample_navigable_finds_isolated_node() {
        let g = corridor();
        let hit = g.sample_navigable(Vec3::new(50.0, 0.0, 49.0), 2.0);
        assert_eq!(hit, Some(Vec3::new(50.0, 0.0, 50.0)));
    }

    #[test]
    fn connect_rejects_unknown_nodes() {
        let mut g = NavGraph::new();
        let a = g.add_node(Vec3::zero());
        assert_eq!(g.connect(a, 7), Err(NavGraphError::UnknownNode(7)));
    }
}
