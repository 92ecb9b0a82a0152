use ahash::HashSet;
use itertools::Itertools;
use rayon::prelude::*;

use super::{witness_search::witness_search, Shortcut};
use crate::{
    error::ContractionError,
    graphs::{contractor_graph::ContractorGraph, Duration, Vertex, Weight},
};

/// Simulates the contraction of single vertices: for every in/out neighbor
/// pair a witness probe decides whether the path through the vertex must be
/// preserved by a shortcut. Used both to score candidates and to produce
/// the edges that are committed when a vertex is actually contracted.
pub struct ShortcutGenerator {
    pub max_hops: u32,
}

impl ShortcutGenerator {
    /// The shortcuts contracting `vertex` would require right now. One
    /// witness search per in-neighbor covers all out-neighbors at once; its
    /// bound is the largest shortcut weight that in-neighbor can produce.
    pub fn get_shortcuts(
        &self,
        graph: &ContractorGraph,
        vertex: Vertex,
    ) -> Result<Vec<Shortcut>, ContractionError> {
        let neighbors = graph.neighbors(vertex);

        let in_edges: Vec<(Vertex, Weight, Duration)> = neighbors
            .iter()
            .filter_map(|neighbor| {
                neighbor
                    .backward
                    .map(|(weight, duration)| (neighbor.vertex, weight, duration))
            })
            .collect_vec();
        let out_edges: Vec<(Vertex, Weight, Duration)> = neighbors
            .iter()
            .filter_map(|neighbor| {
                neighbor
                    .forward
                    .map(|(weight, duration)| (neighbor.vertex, weight, duration))
            })
            .collect_vec();

        if in_edges.is_empty() || out_edges.is_empty() {
            return Ok(Vec::new());
        }

        let max_out_weight = out_edges
            .iter()
            .map(|&(_, weight, _)| weight)
            .max()
            .unwrap_or(0);
        let targets: HashSet<Vertex> = out_edges.iter().map(|&(target, _, _)| target).collect();

        let per_source: Result<Vec<Vec<Shortcut>>, ContractionError> = in_edges
            .into_par_iter()
            .map(|(source, in_weight, in_duration)| {
                let bound = in_weight as u64 + max_out_weight as u64;
                let witness_weights =
                    witness_search(graph, source, vertex, bound, self.max_hops, &targets);

                out_edges
                    .iter()
                    .filter(|&&(target, _, _)| target != source)
                    .filter_map(|&(target, out_weight, out_duration)| {
                        let weight = in_weight as u64 + out_weight as u64;
                        if weight > Weight::MAX as u64 {
                            return Some(Err(ContractionError::WeightOverflow {
                                left: in_weight as u64,
                                right: out_weight as u64,
                            }));
                        }
                        let duration = in_duration as u64 + out_duration as u64;
                        if duration > Duration::MAX as u64 {
                            return Some(Err(ContractionError::WeightOverflow {
                                left: in_duration as u64,
                                right: out_duration as u64,
                            }));
                        }

                        let witness = *witness_weights.get(&target).unwrap_or(&u64::MAX);
                        if witness <= weight {
                            // A path at most as long survives without the
                            // vertex, the shortcut is unnecessary.
                            return None;
                        }

                        Some(Ok(Shortcut {
                            source,
                            target,
                            weight: weight as Weight,
                            duration: duration as Duration,
                            middle: vertex,
                        }))
                    })
                    .collect()
            })
            .collect();

        Ok(per_source?.into_iter().flatten().collect())
    }
}
