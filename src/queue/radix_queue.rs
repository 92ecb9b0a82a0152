use radix_heap::RadixHeapMap;

use crate::graphs::Vertex;

/// Monotone min-queue for the bounded witness Dijkstra. The radix heap pops
/// its largest key, so distances are stored negated; witness distances are
/// sums of two `u32` weights and fit an `i64` with room to spare.
pub struct RadixQueue {
    heap: RadixHeapMap<i64, Vertex>,
}

impl Default for RadixQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RadixQueue {
    pub fn new() -> RadixQueue {
        RadixQueue {
            heap: RadixHeapMap::new(),
        }
    }

    pub fn push(&mut self, weight: u64, vertex: Vertex) {
        self.heap.push(-(weight as i64), vertex);
    }

    pub fn pop(&mut self) -> Option<(u64, Vertex)> {
        let (negated_weight, vertex) = self.heap.pop()?;
        Some(((-negated_weight) as u64, vertex))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
