use super::{
    contractor_graph::{ContractorEdge, ContractorGraph},
    Vertex,
};

/// Read-only view of a contractor graph that hides every vertex the
/// predicate rejects, together with all edges incident to hidden vertices.
/// The view borrows the backing graph and never outlives it.
pub struct FilteredGraph<'a> {
    graph: &'a ContractorGraph,
    allowed: &'a [bool],
}

impl<'a> FilteredGraph<'a> {
    pub fn new(graph: &'a ContractorGraph, allowed: &'a [bool]) -> Self {
        debug_assert_eq!(graph.number_of_vertices() as usize, allowed.len());
        FilteredGraph { graph, allowed }
    }

    pub fn number_of_vertices(&self) -> u32 {
        self.graph.number_of_vertices()
    }

    pub fn contains(&self, vertex: Vertex) -> bool {
        self.allowed[vertex as usize]
    }

    pub fn entries(&self, vertex: Vertex) -> impl Iterator<Item = &ContractorEdge> + '_ {
        let entries: &[ContractorEdge] = if self.contains(vertex) {
            self.graph.entries(vertex)
        } else {
            &[]
        };
        entries
            .iter()
            .filter(move |entry| self.allowed[entry.target as usize])
    }

    /// Copies the visible part of the view into a fresh mutable graph for
    /// the next contraction pass. Buckets are copied entry by entry, so the
    /// mirrored-edge invariant of the source carries over unchanged.
    pub fn materialize(&self) -> ContractorGraph {
        let buckets = (0..self.number_of_vertices())
            .map(|vertex| self.entries(vertex).copied().collect())
            .collect();

        ContractorGraph::from_buckets(buckets)
    }
}
