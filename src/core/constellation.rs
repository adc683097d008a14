//! Constellation generation: seeded node placement + degree-capped edges
//!
//! Placement walks a Fibonacci sphere (golden-angle azimuth, arccos
//! polar) so coverage is quasi-even, then jitters both angles and the
//! radius from the seeded RNG so no lattice shows through. Edges connect
//! near pairs shortest-first under per-node degree caps.
//!
//! The whole pipeline is deterministic: same seed and config, identical
//! graph. RNG draw order per node (theta jitter, phi jitter, radius,
//! hub draw, hierarchy draw) is part of that contract.

use crate::core::rng::Mulberry32;
use crate::types::{ConstellationConfig, ConstellationGraph, Edge, Node};

/// Generate the full constellation: nodes + edges
pub fn generate_constellation(config: &ConstellationConfig) -> ConstellationGraph {
    let mut rng = Mulberry32::new(config.seed);
    let mut nodes = generate_nodes(&mut rng, config);
    let edges = generate_edges(&mut nodes, config);
    ConstellationGraph { nodes, edges }
}

/// Place nodes on a jittered Fibonacci sphere and assign hierarchy
fn generate_nodes(rng: &mut Mulberry32, config: &ConstellationConfig) -> Vec<Node> {
    let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let node_count = config.node_count;
    let mut nodes = Vec::with_capacity(node_count);

    for i in 0..node_count {
        let theta = 2.0 * std::f64::consts::PI * i as f64 / golden_ratio;
        let phi = (1.0 - 2.0 * (i as f64 + 0.5) / node_count as f64).acos();

        // Bounded jitter breaks the visible spiral
        let theta_jitter = theta + (rng.next_f64() - 0.5) * 0.8;
        let phi_jitter = phi + (rng.next_f64() - 0.5) * 0.3;

        // Radius factor in [1 - v/2, 1 + v/2] for depth
        let depth = config.depth_variation as f64;
        let radius_variation = 1.0 - depth / 2.0 + rng.next_f64() * depth;
        let r = config.sphere_radius as f64 * radius_variation;

        let x = r * phi_jitter.sin() * theta_jitter.cos();
        let y = r * phi_jitter.sin() * theta_jitter.sin();
        let z = r * phi_jitter.cos();

        // Bimodal hierarchy; the 0.7 floor is what downstream keys off
        let is_hub = rng.next_f64() < config.hub_probability;
        let hierarchy = if is_hub {
            0.7 + rng.next_f64() * 0.3
        } else {
            0.1 + rng.next_f64() * 0.4
        };

        nodes.push(Node {
            position: [x as f32, y as f32, z as f32],
            hierarchy: hierarchy as f32,
            connections: 0,
        });
    }

    nodes
}

/// Connect near pairs shortest-first under per-node degree caps
///
/// Writes final degree counts back onto the nodes. Zero candidates is a
/// valid outcome, not an error.
fn generate_edges(nodes: &mut [Node], config: &ConstellationConfig) -> Vec<Edge> {
    let mut candidates: Vec<Edge> = Vec::new();

    for i in 0..nodes.len() {
        for j in (i + 1)..nodes.len() {
            let dist = nodes[i].distance_to(&nodes[j]);
            if dist < config.connection_threshold {
                candidates.push(Edge {
                    from: i,
                    to: j,
                    length: dist,
                });
            }
        }
    }

    // Shortest connections win contested degree slots
    candidates.sort_by(|a, b| a.length.total_cmp(&b.length));

    let mut degree = vec![0u32; nodes.len()];
    let mut edges = Vec::new();

    for edge in candidates {
        let from_cap = config.degree_cap(nodes[edge.from].hierarchy);
        let to_cap = config.degree_cap(nodes[edge.to].hierarchy);

        if degree[edge.from] < from_cap && degree[edge.to] < to_cap {
            degree[edge.from] += 1;
            degree[edge.to] += 1;
            edges.push(edge);
        }
    }

    for (node, count) in nodes.iter_mut().zip(degree) {
        node.connections = count;
    }

    edges
}

// =============================================================================
// TESTS
// =============================================================================
