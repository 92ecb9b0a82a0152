use ahash::{HashMap, HashMapExt};
use rayon::prelude::*;

use super::{
    filtered_graph::FilteredGraph, Duration, EdgeData, InputEdge, QueryEdge, Vertex, Weight,
};
use crate::error::ContractionError;

/// One adjacency entry. Every logical edge is stored at both endpoints; the
/// entry at the other endpoint carries the same payload with the direction
/// flags swapped.
#[derive(Clone, Copy, Debug)]
pub struct ContractorEdge {
    pub target: Vertex,
    pub data: EdgeData,
}

/// The best remaining edges between a vertex and one of its neighbors,
/// merged over parallel entries. `forward` is the best edge leaving the
/// vertex, `backward` the best edge entering it.
#[derive(Clone, Copy, Debug)]
pub struct NeighborEdges {
    pub vertex: Vertex,
    pub forward: Option<(Weight, Duration)>,
    pub backward: Option<(Weight, Duration)>,
}

/// Mutable adjacency over densely numbered vertices.
///
/// Contracting a vertex archives its entries instead of dropping them; the
/// archive holds the hierarchy edges that the finished shortcut graph is
/// built from, while the live buckets shrink to the uncontracted remainder.
pub struct ContractorGraph {
    buckets: Vec<Vec<ContractorEdge>>,
    archived: Vec<Vec<ContractorEdge>>,
}

impl ContractorGraph {
    pub fn new(number_of_vertices: usize) -> Self {
        ContractorGraph {
            buckets: vec![Vec::new(); number_of_vertices],
            archived: vec![Vec::new(); number_of_vertices],
        }
    }

    /// Builds the working graph from the edge-expanded input, rejecting
    /// malformed records before any contraction work starts.
    pub fn from_input_edges(
        number_of_vertices: usize,
        edges: &[InputEdge],
    ) -> Result<Self, ContractionError> {
        validate_input_edges(number_of_vertices, edges)?;

        let mut graph = ContractorGraph::new(number_of_vertices);
        for edge in edges {
            let data = EdgeData {
                weight: edge.weight as Weight,
                duration: edge.duration as Duration,
                turn_or_middle: edge.turn_id,
                shortcut: false,
                forward: edge.forward,
                backward: edge.backward,
            };
            graph.insert_edge(edge.source, edge.target, data);
        }

        Ok(graph)
    }

    pub fn number_of_vertices(&self) -> u32 {
        self.buckets.len() as u32
    }

    pub fn entries(&self, vertex: Vertex) -> &[ContractorEdge] {
        &self.buckets[vertex as usize]
    }

    /// Inserts a logical edge, mirroring it at both endpoints. Insertion
    /// relaxes per `(source, target, direction)`: the edge with the
    /// lexicographically smaller `(weight, duration)` wins.
    pub fn insert_edge(&mut self, source: Vertex, target: Vertex, data: EdgeData) {
        debug_assert!(data.forward || data.backward);
        debug_assert_ne!(source, target);

        self.insert_half(source, target, data);
        self.insert_half(target, source, data.reversed());
    }

    fn insert_half(&mut self, owner: Vertex, other: Vertex, data: EdgeData) {
        if data.forward {
            self.insert_component(owner, other, EdgeData { backward: false, ..data });
        }
        if data.backward {
            self.insert_component(owner, other, EdgeData { forward: false, ..data });
        }
    }

    /// Inserts a single-direction component into one bucket. Keeps the
    /// bucket invariant: per target, at most one entry covers each
    /// direction, and a bidirectional entry exists only when both
    /// directions share the identical payload.
    fn insert_component(&mut self, owner: Vertex, other: Vertex, data: EdgeData) {
        let forward = data.forward;
        let bucket = &mut self.buckets[owner as usize];

        for entry in bucket.iter_mut() {
            if entry.target != other {
                continue;
            }
            let covers = if forward {
                entry.data.forward
            } else {
                entry.data.backward
            };
            if !covers {
                continue;
            }

            if (data.weight, data.duration) < (entry.data.weight, entry.data.duration) {
                if entry.data.forward && entry.data.backward {
                    // Split the shared entry: the other direction keeps the
                    // old payload, the improved direction gets a fresh entry.
                    if forward {
                        entry.data.forward = false;
                    } else {
                        entry.data.backward = false;
                    }
                    break;
                }
                entry.data = data;
            }
            return;
        }

        // No entry covers this direction. Collapse into an opposite-direction
        // entry when the payloads coincide, otherwise store a new entry.
        for entry in bucket.iter_mut() {
            if entry.target == other
                && entry.data.forward != forward
                && entry.data.backward == forward
                && entry.data.weight == data.weight
                && entry.data.duration == data.duration
                && entry.data.shortcut == data.shortcut
                && entry.data.turn_or_middle == data.turn_or_middle
            {
                entry.data.forward = true;
                entry.data.backward = true;
                return;
            }
        }

        bucket.push(ContractorEdge {
            target: other,
            data,
        });
    }

    /// Archives the vertex' entries and deletes their mirrors at the
    /// neighbors. The archived entries are the vertex' edges of the final
    /// hierarchy; the vertex no longer takes part in the working graph.
    pub fn remove_and_store_node(&mut self, vertex: Vertex) {
        let entries = std::mem::take(&mut self.buckets[vertex as usize]);
        for entry in &entries {
            self.buckets[entry.target as usize].retain(|mirror| mirror.target != vertex);
        }
        self.archived[vertex as usize] = entries;
    }

    /// Yields each distinct remaining neighbor once, with the best forward
    /// and backward edges merged over parallel entries, ordered by vertex id.
    pub fn neighbors(&self, vertex: Vertex) -> Vec<NeighborEdges> {
        let mut merged: HashMap<Vertex, NeighborEdges> = HashMap::new();

        for entry in self.entries(vertex) {
            let neighbor = merged.entry(entry.target).or_insert(NeighborEdges {
                vertex: entry.target,
                forward: None,
                backward: None,
            });
            let candidate = (entry.data.weight, entry.data.duration);
            if entry.data.forward {
                neighbor.forward = Some(neighbor.forward.map_or(candidate, |best| best.min(candidate)));
            }
            if entry.data.backward {
                neighbor.backward =
                    Some(neighbor.backward.map_or(candidate, |best| best.min(candidate)));
            }
        }

        let mut neighbors: Vec<NeighborEdges> = merged.into_values().collect();
        neighbors.sort_unstable_by_key(|neighbor| neighbor.vertex);
        neighbors
    }

    /// Number of directed edges incident to the vertex; a bidirectional
    /// entry counts for both directions.
    pub fn directed_degree(&self, vertex: Vertex) -> usize {
        self.entries(vertex)
            .iter()
            .map(|entry| entry.data.forward as usize + entry.data.backward as usize)
            .sum()
    }

    pub fn filtered<'a>(&'a self, allowed: &'a [bool]) -> FilteredGraph<'a> {
        FilteredGraph::new(self, allowed)
    }

    pub(crate) fn from_buckets(buckets: Vec<Vec<ContractorEdge>>) -> Self {
        let number_of_vertices = buckets.len();
        ContractorGraph {
            buckets,
            archived: vec![Vec::new(); number_of_vertices],
        }
    }

    /// All edges of the hierarchy built so far: the archived entries of
    /// contracted vertices plus both halves of every surviving edge, in
    /// canonical order.
    pub fn query_edges(&self) -> Vec<QueryEdge> {
        let mut edges: Vec<QueryEdge> = self
            .buckets
            .iter()
            .chain(self.archived.iter())
            .enumerate()
            .flat_map(|(source, entries)| {
                let source = (source % self.buckets.len()) as Vertex;
                entries.iter().map(move |entry| QueryEdge {
                    source,
                    target: entry.target,
                    data: entry.data,
                })
            })
            .collect();

        edges.par_sort_unstable();
        edges
    }

    pub fn into_query_edges(self) -> Vec<QueryEdge> {
        self.query_edges()
    }
}

fn validate_input_edges(
    number_of_vertices: usize,
    edges: &[InputEdge],
) -> Result<(), ContractionError> {
    for edge in edges {
        let malformed = |reason| ContractionError::MalformedEdge {
            source_vertex: edge.source,
            target_vertex: edge.target,
            reason,
        };

        if edge.source as usize >= number_of_vertices || edge.target as usize >= number_of_vertices
        {
            return Err(malformed("vertex id out of range"));
        }
        if edge.source == edge.target {
            return Err(malformed("self-loop"));
        }
        if edge.weight <= 0 {
            return Err(malformed("non-positive weight"));
        }
        if edge.duration < 0 {
            return Err(malformed("negative duration"));
        }
        if !edge.forward && !edge.backward {
            return Err(malformed("neither direction flag is set"));
        }
    }

    // Directed duplicates may only disagree in weight or duration (they get
    // relaxed away); equal-weight duplicates with different turn ids are
    // ambiguous input.
    let mut components: Vec<(Vertex, Vertex, bool, i32, i32, u32)> = edges
        .iter()
        .flat_map(|edge| {
            let mut components = Vec::with_capacity(2);
            if edge.forward {
                components.push((
                    edge.source,
                    edge.target,
                    true,
                    edge.weight,
                    edge.duration,
                    edge.turn_id,
                ));
            }
            if edge.backward {
                components.push((
                    edge.source,
                    edge.target,
                    false,
                    edge.weight,
                    edge.duration,
                    edge.turn_id,
                ));
            }
            components
        })
        .collect();
    components.sort_unstable();

    for pair in components.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if left.0 == right.0
            && left.1 == right.1
            && left.2 == right.2
            && left.3 == right.3
            && left.4 == right.4
            && left.5 != right.5
        {
            return Err(ContractionError::MalformedEdge {
                source_vertex: left.0,
                target_vertex: left.1,
                reason: "duplicate directed edge with mismatched data",
            });
        }
    }

    Ok(())
}
