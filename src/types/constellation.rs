//! Constellation data model: nodes, edges, graph, generation config

use serde::{Deserialize, Serialize};

/// A single constellation node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Cartesian position on the jittered sphere
    pub position: [f32; 3],
    /// Importance weight in [0,1]; >= 0.7 marks a hub
    pub hierarchy: f32,
    /// Final accepted edge count, written once after edge generation
    pub connections: u32,
}

impl Node {
    /// Hub nodes get a larger degree cap and brighter rendering
    pub fn is_hub(&self) -> bool {
        self.hierarchy >= 0.7
    }

    /// Euclidean distance to another node
    pub fn distance_to(&self, other: &Node) -> f32 {
        let dx = self.position[0] - other.position[0];
        let dy = self.position[1] - other.position[1];
        let dz = self.position[2] - other.position[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// An undirected edge between two nodes, `from < to` by construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    /// Euclidean distance between the endpoints at generation time
    pub length: f32,
}

/// The full generated graph
///
/// Generated exactly once per process from a fixed seed and read-only
/// afterwards; node index is stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstellationGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ConstellationGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Fraction of nodes at or above the hub threshold
    pub fn hub_fraction(&self) -> f32 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let hubs = self.nodes.iter().filter(|n| n.is_hub()).count();
        hubs as f32 / self.nodes.len() as f32
    }
}

/// Generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstellationConfig {
    pub node_count: usize,
    pub sphere_radius: f32,
    /// Per-node radius factor spread: [1 - v/2, 1 + v/2]
    pub depth_variation: f32,
    pub hub_probability: f64,
    /// Maximum edge length considered for connection
    pub connection_threshold: f32,
    pub hub_min_connections: u32,
    pub normal_max_connections: u32,
    pub seed: u32,
}

impl Default for ConstellationConfig {
    fn default() -> Self {
        Self {
            node_count: 150,
            sphere_radius: 5.0,
            depth_variation: 0.6,
            hub_probability: 0.08,
            connection_threshold: 2.8,
            hub_min_connections: 5,
            normal_max_connections: 4,
            seed: 42,
        }
    }
}

/// Config validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ConfigError {
    /// sphere_radius must be positive
    C001_RADIUS_NOT_POSITIVE,
    /// depth_variation must be in [0, 2) so radius factors stay positive
    C002_DEPTH_VARIATION_OUT_OF_RANGE,
    /// hub_probability must be in [0, 1]
    C003_HUB_PROBABILITY_OUT_OF_RANGE,
    /// connection_threshold must be non-negative
    C004_THRESHOLD_NEGATIVE,
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::C001_RADIUS_NOT_POSITIVE => "C001_RADIUS_NOT_POSITIVE",
            Self::C002_DEPTH_VARIATION_OUT_OF_RANGE => "C002_DEPTH_VARIATION_OUT_OF_RANGE",
            Self::C003_HUB_PROBABILITY_OUT_OF_RANGE => "C003_HUB_PROBABILITY_OUT_OF_RANGE",
            Self::C004_THRESHOLD_NEGATIVE => "C004_THRESHOLD_NEGATIVE",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::C001_RADIUS_NOT_POSITIVE => "Sphere radius must be positive",
            Self::C002_DEPTH_VARIATION_OUT_OF_RANGE => "Depth variation must be in [0, 2)",
            Self::C003_HUB_PROBABILITY_OUT_OF_RANGE => "Hub probability must be in [0, 1]",
            Self::C004_THRESHOLD_NEGATIVE => "Connection threshold must be non-negative",
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

impl ConstellationConfig {
    /// Validate parameters before generation
    ///
    /// The generator itself is infallible over a validated config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sphere_radius <= 0.0 {
            return Err(ConfigError::C001_RADIUS_NOT_POSITIVE);
        }
        if !(0.0..2.0).contains(&self.depth_variation) {
            return Err(ConfigError::C002_DEPTH_VARIATION_OUT_OF_RANGE);
        }
        if !(0.0..=1.0).contains(&self.hub_probability) {
            return Err(ConfigError::C003_HUB_PROBABILITY_OUT_OF_RANGE);
        }
        if self.connection_threshold < 0.0 {
            return Err(ConfigError::C004_THRESHOLD_NEGATIVE);
        }
        Ok(())
    }

    /// Degree cap for a node of the given hierarchy
    pub fn degree_cap(&self, hierarchy: f32) -> u32 {
        if hierarchy >= 0.7 {
            self.hub_min_connections + 4
        } else {
            self.normal_max_connections
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(ConstellationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_radius() {
        let config = ConstellationConfig {
            sphere_radius: 0.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::C001_RADIUS_NOT_POSITIVE)
        );
    }

    #[test]
    fn test_invalid_hub_probability() {
        let config = ConstellationConfig {
            hub_probability: 1.2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::C003_HUB_PROBABILITY_OUT_OF_RANGE)
        );
    }

    #[test]
    fn test_degree_cap_keys_off_hub_threshold() {
        let config = ConstellationConfig::default();
        assert_eq!(config.degree_cap(0.7), 9);
        assert_eq!(config.degree_cap(0.69), 4);
        assert_eq!(config.degree_cap(1.0), 9);
    }

    #[test]
    fn test_node_distance() {
        let a = Node {
            position: [0.0, 0.0, 0.0],
            hierarchy: 0.2,
            connections: 0,
        };
        let b = Node {
            position: [3.0, 4.0, 0.0],
            hierarchy: 0.2,
            connections: 0,
        };
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_hub_fraction_empty_graph() {
        let graph = ConstellationGraph {
            nodes: vec![],
            edges: vec![],
        };
        assert_eq!(graph.hub_fraction(), 0.0);
    }
}
