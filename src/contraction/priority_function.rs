use super::Shortcut;
use crate::graphs::{contractor_graph::ContractorGraph, Vertex};

/// One term of a candidate's contraction priority. `update` is called just
/// before a vertex is contracted, giving terms that track neighborhood
/// state the opportunity to adjust it.
pub trait PriorityFunction: Send + Sync {
    fn initialize(&mut self, graph: &ContractorGraph);

    fn priority(&self, vertex: Vertex, graph: &ContractorGraph, shortcuts: &[Shortcut]) -> i32;

    fn update(&mut self, vertex: Vertex, graph: &ContractorGraph);
}

/// The coefficient-weighted terms the driver runs with: edge difference,
/// deleted neighbors and depth, all weighted 1.
pub fn recommended_terms() -> Vec<(i32, Box<dyn PriorityFunction>)> {
    vec![
        (1, Box::new(EdgeDifference::new())),
        (1, Box::new(DeletedNeighbors::new())),
        (1, Box::new(Depth::new())),
    ]
}

/// Number of shortcuts the contraction would add minus the number of
/// directed edges it removes.
pub struct EdgeDifference {}

impl EdgeDifference {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for EdgeDifference {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityFunction for EdgeDifference {
    fn initialize(&mut self, _graph: &ContractorGraph) {}

    fn priority(&self, vertex: Vertex, graph: &ContractorGraph, shortcuts: &[Shortcut]) -> i32 {
        shortcuts.len() as i32 - graph.directed_degree(vertex) as i32
    }

    fn update(&mut self, _vertex: Vertex, _graph: &ContractorGraph) {}
}

/// How many of a vertex' neighbors are already contracted. Spreads the
/// contraction evenly instead of eating through one region first.
pub struct DeletedNeighbors {
    deleted_neighbors: Vec<u32>,
}

impl DeletedNeighbors {
    pub fn new() -> Self {
        Self {
            deleted_neighbors: Vec::new(),
        }
    }
}

impl Default for DeletedNeighbors {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityFunction for DeletedNeighbors {
    fn initialize(&mut self, graph: &ContractorGraph) {
        self.deleted_neighbors = vec![0; graph.number_of_vertices() as usize];
    }

    fn priority(&self, vertex: Vertex, _graph: &ContractorGraph, _shortcuts: &[Shortcut]) -> i32 {
        self.deleted_neighbors[vertex as usize] as i32
    }

    fn update(&mut self, vertex: Vertex, graph: &ContractorGraph) {
        for neighbor in graph.neighbors(vertex) {
            self.deleted_neighbors[neighbor.vertex as usize] += 1;
        }
    }
}

/// One more than the deepest contracted neighbor, zero while all neighbors
/// are still uncontracted. Keeps the hierarchy uniformly shallow.
pub struct Depth {
    depth: Vec<u32>,
}

impl Depth {
    pub fn new() -> Self {
        Self { depth: Vec::new() }
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityFunction for Depth {
    fn initialize(&mut self, graph: &ContractorGraph) {
        self.depth = vec![0; graph.number_of_vertices() as usize];
    }

    fn priority(&self, vertex: Vertex, _graph: &ContractorGraph, _shortcuts: &[Shortcut]) -> i32 {
        self.depth[vertex as usize] as i32
    }

    fn update(&mut self, vertex: Vertex, graph: &ContractorGraph) {
        let successor_depth = self.depth[vertex as usize] + 1;
        for neighbor in graph.neighbors(vertex) {
            let depth = &mut self.depth[neighbor.vertex as usize];
            *depth = (*depth).max(successor_depth);
        }
    }
}
