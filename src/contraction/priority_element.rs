use std::cmp::Ordering;

use crate::graphs::Vertex;

#[derive(Copy, Clone, Eq, PartialEq)]
pub struct PriorityElement {
    pub priority: i32,
    pub vertex: Vertex,
}

impl PriorityElement {
    pub fn new(priority: i32, vertex: Vertex) -> Self {
        PriorityElement { priority, vertex }
    }
}

// The ordering is flipped so that `BinaryHeap` pops the smallest priority
// first. Ties are broken by vertex id to keep `PartialEq` and `Ord`
// consistent and the pop order deterministic.
impl Ord for PriorityElement {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

impl PartialOrd for PriorityElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
