use std::mem;

use crate::{collections::chunked_vec::ChunkedVec, error::ContractionError, graphs::QueryEdge};

pub type MergedFlags = u8;

/// Number of merge passes the flag width admits.
pub const MAX_PASSES: usize = MergedFlags::BITS as usize;

/// Accumulates the edge outputs of successive contraction passes into one
/// sorted, deduplicated sequence. Every stored edge carries a flag byte
/// whose bit `p` records that pass `p` produced exactly this canonical
/// tuple; the per-pass boolean filters handed to the query side are derived
/// from those bits.
#[derive(Default)]
pub struct ContractedEdgeContainer {
    index: usize,
    flags: Vec<MergedFlags>,
    edges: ChunkedVec<QueryEdge>,
}

impl ContractedEdgeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_passes(&self) -> usize {
        self.index
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &QueryEdge> {
        self.edges.iter()
    }

    /// Merges the next pass' edges. `new_edges` must be sorted by the
    /// canonical tuple. Linear three-way sweep; consuming the stored
    /// sequence chunk by chunk keeps the peak at one sequence plus the
    /// merge output.
    pub fn merge(&mut self, new_edges: Vec<QueryEdge>) -> Result<(), ContractionError> {
        if self.index >= MAX_PASSES {
            return Err(ContractionError::TooManyPasses { limit: MAX_PASSES });
        }
        debug_assert!(new_edges.windows(2).all(|pair| pair[0] <= pair[1]));

        let flag: MergedFlags = 1 << self.index;
        self.index += 1;

        let mut merged_edges = ChunkedVec::new();
        let mut merged_flags = Vec::with_capacity(self.flags.len() + new_edges.len());

        // Appends one edge, folding canonical duplicates into a single
        // entry by or-ing their flags. This keeps the sequence strictly
        // increasing no matter which side duplicates came from.
        fn emit(
            edge: QueryEdge,
            edge_flags: MergedFlags,
            merged_flags: &mut Vec<MergedFlags>,
            merged_edges: &mut ChunkedVec<QueryEdge>,
        ) {
            if let Some(last) = merged_flags.last_mut() {
                if merged_edges.last() == Some(&edge) {
                    *last |= edge_flags;
                    return;
                }
            }
            merged_edges.push(edge);
            merged_flags.push(edge_flags);
        }

        let old_flags = mem::take(&mut self.flags);
        let old_edges = mem::take(&mut self.edges);

        let mut existing = old_edges.into_iter().zip(old_flags).peekable();
        let mut incoming = new_edges.into_iter().peekable();

        loop {
            match (existing.peek(), incoming.peek()) {
                (Some((old_edge, _)), Some(new_edge)) => {
                    if old_edge < new_edge {
                        let (edge, edge_flags) = existing.next().unwrap();
                        emit(edge, edge_flags, &mut merged_flags, &mut merged_edges);
                    } else if new_edge < old_edge {
                        let edge = incoming.next().unwrap();
                        emit(edge, flag, &mut merged_flags, &mut merged_edges);
                    } else {
                        let (edge, edge_flags) = existing.next().unwrap();
                        incoming.next();
                        emit(edge, edge_flags | flag, &mut merged_flags, &mut merged_edges);
                    }
                }
                (Some(_), None) => {
                    let (edge, edge_flags) = existing.next().unwrap();
                    emit(edge, edge_flags, &mut merged_flags, &mut merged_edges);
                }
                (None, Some(_)) => {
                    let edge = incoming.next().unwrap();
                    emit(edge, flag, &mut merged_flags, &mut merged_edges);
                }
                (None, None) => break,
            }
        }

        self.flags = merged_flags;
        self.edges = merged_edges;
        Ok(())
    }

    /// One boolean vector per pass: entry `i` of vector `p` tells whether
    /// stored edge `i` was produced by pass `p`. Restricting a query to the
    /// edges of its profile's pass walks exactly that pass' hierarchy.
    pub fn make_edge_filters(&self) -> Vec<Vec<bool>> {
        (0..self.index)
            .map(|pass| {
                self.flags
                    .iter()
                    .map(|&flags| flags & (1 << pass) != 0)
                    .collect()
            })
            .collect()
    }

    /// Drains the container. Called exactly once, after the last merge.
    pub fn into_edges_and_flags(self) -> (ChunkedVec<QueryEdge>, Vec<MergedFlags>) {
        (self.edges, self.flags)
    }
}
