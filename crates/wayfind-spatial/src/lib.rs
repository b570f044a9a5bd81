//! `wayfind-spatial` – Navigable-surface queries.
//!
//! The tracking core never builds pathfinding data itself; it only *queries*
//! a navigable surface through the [`PathQuery`][path::PathQuery] trait.
//!
//! # Modules
//!
//! - [`path`] – [`PathQuery`][path::PathQuery], [`PathQueryResult`][path::PathQueryResult]
//!   and the polyline helpers used to compute optimal lengths and
//!   off-path distances.
//! - [`nav_graph`] – [`NavGraph`][nav_graph::NavGraph]: a waypoint graph
//!   answering path queries with Dijkstra's algorithm.
//! - [`floor_plan`] – [`FloorPlan`][floor_plan::FloorPlan]: TOML description
//!   of a graph plus its named destinations.
//! - [`sim`] – deterministic path oracles for tests and headless runs.

pub mod floor_plan;
pub mod nav_graph;
pub mod path;
pub mod sim;

pub use floor_plan::{FloorPlan, FloorPlanError};
pub use nav_graph::NavGraph;
pub use path::{PathQuery, PathQueryResult, PathStatus};
