//! Floor plans – TOML description of a navigable graph and its destinations.
//!
//! ```toml
//! spawn = [0.0, 0.0, 0.0]
//! snap_radius = 10.0
//! nodes = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]]
//! edges = [[0, 1]]
//!
//! [[destinations]]
//! name = "Recepcion"
//! position = [10.0, 0.0, 0.0]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use wayfind_types::{Destination, Vec3};

use crate::nav_graph::{NavGraph, NavGraphError};

#[derive(Error, Debug)]
pub enum FloorPlanError {
    #[error("failed to read floor plan at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse floor plan: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("floor plan edge references unknown node {0}")]
    UnknownNode(usize),
}

impl From<NavGraphError> for FloorPlanError {
    fn from(e: NavGraphError) -> Self {
        match e {
            NavGraphError::UnknownNode(i) => FloorPlanError::UnknownNode(i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSpec {
    pub name: String,
    pub position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorPlan {
    /// Radius used to attach query endpoints to graph nodes.
    #[serde(default)]
    pub snap_radius: Option<f32>,
    /// Where the agent is placed on startup.
    #[serde(default)]
    pub spawn: [f32; 3],
    pub nodes: Vec<[f32; 3]>,
    #[serde(default)]
    pub edges: Vec<[usize; 2]>,
    #[serde(default)]
    pub destinations: Vec<DestinationSpec>,
}

impl FloorPlan {
    pub fn from_toml_str(raw: &str) -> Result<Self, FloorPlanError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, FloorPlanError> {
        let raw = fs::read_to_string(path).map_err(|source| FloorPlanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let plan = Self::from_toml_str(&raw)?;
        info!(
            path = %path.display(),
            nodes = plan.nodes.len(),
            destinations = plan.destinations.len(),
            "floor plan loaded"
        );
        Ok(plan)
    }

    /// The two-area reception/offices layout used when no plan is configured.
    ///
    /// A 20 × 10 m loop with a middle corridor; spawn at the origin.
    pub fn builtin() -> Self {
        Self {
            snap_radius: None,
            spawn: [0.0, 0.0, 0.0],
            nodes: vec![
                [0.0, 0.0, 0.0],
                [10.0, 0.0, 0.0],
                [20.0, 0.0, 0.0],
                [20.0, 0.0, 10.0],
                [10.0, 0.0, 10.0],
                [0.0, 0.0, 10.0],
            ],
            edges: vec![[0, 1], [1, 2], [2, 3], [1, 4], [4, 3], [4, 5]],
            destinations: vec![
                DestinationSpec {
                    name: "Recepcion".to_string(),
                    position: [20.0, 0.0, 10.0],
                },
                DestinationSpec {
                    name: "Oficinas".to_string(),
                    position: [0.0, 0.0, 10.0],
                },
            ],
        }
    }

    pub fn spawn(&self) -> Vec3 {
        Vec3::from(self.spawn)
    }

    pub fn build_graph(&self) -> Result<NavGraph, FloorPlanError> {
        let mut graph = NavGraph::new();
        if let Some(r) = self.snap_radius {
            graph = graph.with_snap_radius(r);
        }
        for n in &self.nodes {
            graph.add_node(Vec3::from(*n));
        }
        for [a, b] in &self.edges {
            graph.connect(*a, *b)?;
        }
        Ok(graph)
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations
            .iter()
            .map(|d| Destination::new(d.name.clone(), Vec3::from(d.position)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{PathQuery, PathStatus};

    const PLAN: &str = r#"
        spawn = [1.0, 0.0, 0.0]
        nodes = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 0.0, 5.0]]
        edges = [[0, 1], [1, 2]]

        [[destinations]]
        name = "Lab"
        position = [10.0, 0.0, 5.0]
    "#;

    #[test]
    fn parses_plan_and_builds_graph() {
        let plan = FloorPlan::from_toml_str(PLAN).expect("parse");
        assert_eq!(plan.spawn(), Vec3::new(1.0, 0.0, 0.0));
        let graph = plan.build_graph().expect("graph");
        assert_eq!(graph.node_count(), 3);

        let dest = &plan.destinations()[0];
        assert_eq!(dest.name, "Lab");
        let result = graph.query_path(plan.spawn(), dest.position);
        assert_eq!(result.status, PathStatus::Complete);
        // Spawn sits on the first edge and heads straight for the corner.
        assert!((result.length() - 14.0).abs() < 1e-4);
    }

    #[test]
    fn bad_edge_is_rejected() {
        let plan = FloorPlan::from_toml_str("nodes = [[0.0, 0.0, 0.0]]\nedges = [[0, 3]]").unwrap();
        assert!(matches!(plan.build_graph(), Err(FloorPlanError::UnknownNode(3))));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            FloorPlan::from_toml_str("nodes = 12"),
            Err(FloorPlanError::Toml(_))
        ));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("plan.toml");
        std::fs::write(&path, PLAN).expect("write");
        let plan = FloorPlan::load(&path).expect("load");
        assert_eq!(plan.nodes.len(), 3);

        let missing = FloorPlan::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(FloorPlanError::Io { .. })));
    }

    #[test]
    fn builtin_plan_reaches_both_areas() {
        let plan = FloorPlan::builtin();
        let graph = plan.build_graph().expect("graph");
        for dest in plan.destinations() {
            let result = graph.query_path(plan.spawn(), dest.position);
            assert_eq!(result.status, PathStatus::Complete, "{}", dest.name);
        }
        let names: Vec<_> = plan.destinations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["Recepcion", "Oficinas"]);
    }
}
