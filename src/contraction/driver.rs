use std::collections::{BinaryHeap, VecDeque};

use indicatif::ParallelProgressIterator;
use rand::prelude::*;
use rayon::prelude::*;

use super::{
    priority_element::PriorityElement,
    priority_function::{recommended_terms, PriorityFunction},
    shortcut_generator::ShortcutGenerator,
    Shortcut, WITNESS_HOP_LIMIT,
};
use crate::{
    error::ContractionError,
    graphs::{contractor_graph::ContractorGraph, EdgeData, Level, Vertex},
    utility::get_progressbar,
};

/// Upper bound on how many independent vertices one round hands to the
/// worker pool. Large enough to keep every worker busy, small enough that
/// the lazy priorities do not go stale across a round.
const BATCH_PER_THREAD: usize = 4;

/// One contraction pass over a working graph.
///
/// Vertices whose contraction cannot require a shortcut (no incoming or no
/// outgoing edge left) are contracted first, without witness searches. The
/// remaining vertices are contracted in priority order in rounds: a batch
/// of pairwise non-adjacent candidates is popped from the queue, their
/// shortcut sets are recomputed in parallel against the current graph, and
/// the batch is then committed serially. A candidate whose fresh priority
/// fell behind the next queue entry is pushed back instead of contracted.
///
/// The pass stops once the configured fraction of its candidates is
/// contracted; whatever remains is the pass core.
pub struct ContractionPass {
    queue: BinaryHeap<PriorityElement>,
    priority_terms: Vec<(i32, Box<dyn PriorityFunction>)>,
    shortcut_generator: ShortcutGenerator,
    use_cached_priority: bool,
}

impl ContractionPass {
    pub fn new(use_cached_priority: bool) -> Self {
        ContractionPass {
            queue: BinaryHeap::new(),
            priority_terms: recommended_terms(),
            shortcut_generator: ShortcutGenerator {
                max_hops: WITNESS_HOP_LIMIT,
            },
            use_cached_priority,
        }
    }

    /// Contracts up to `core_factor` of the allowed vertices. Hidden
    /// vertices are never touched; they stay part of the returned core.
    /// Levels of contracted vertices are written into `node_levels`,
    /// numbered from zero in contraction order.
    ///
    /// Returns the core marker of this pass: true for every vertex that was
    /// not contracted.
    pub fn contract(
        mut self,
        graph: &mut ContractorGraph,
        allowed: &[bool],
        node_levels: &mut [Level],
        cached_levels: Option<&[f32]>,
        core_factor: f32,
    ) -> Result<Vec<bool>, ContractionError> {
        let number_of_vertices = graph.number_of_vertices() as usize;
        debug_assert_eq!(allowed.len(), number_of_vertices);
        debug_assert_eq!(node_levels.len(), number_of_vertices);

        let candidates: Vec<Vertex> = (0..number_of_vertices as Vertex)
            .filter(|&vertex| allowed[vertex as usize])
            .collect();
        let number_of_candidates = candidates.len();

        let mut contracted = vec![false; number_of_vertices];
        if number_of_candidates == 0 || core_factor <= 0.0 {
            return Ok(vec![true; number_of_vertices]);
        }

        for (_, term) in self.priority_terms.iter_mut() {
            term.initialize(graph);
        }
        self.initialize_queue(graph, candidates.clone(), cached_levels)?;

        let contraction_target = core_factor as f64 * number_of_candidates as f64;
        let batch_capacity = BATCH_PER_THREAD * rayon::current_num_threads().max(1);

        let bar = get_progressbar("Contracting", number_of_candidates as u64);
        let mut blocked = vec![false; number_of_vertices];
        let mut number_of_contracted = 0usize;
        let mut level_counter: Level = 0;

        // Vertices that cannot produce a shortcut are committed ahead of the
        // queue. A path graph contracts entirely through this list and ends
        // up shortcut-free, whichever way the priority terms would have
        // ordered its interior.
        let mut queued_free = vec![false; number_of_vertices];
        let mut free_vertices: VecDeque<Vertex> = VecDeque::new();
        for &vertex in &candidates {
            if is_shortcut_free(graph, vertex) {
                queued_free[vertex as usize] = true;
                free_vertices.push_back(vertex);
            }
        }

        while (number_of_contracted as f64) < contraction_target {
            if let Some(vertex) = free_vertices.pop_front() {
                if contracted[vertex as usize] {
                    continue;
                }

                let neighbors: Vec<Vertex> = graph
                    .neighbors(vertex)
                    .iter()
                    .map(|neighbor| neighbor.vertex)
                    .collect();
                self.commit_vertex(graph, vertex, &[], node_levels, &mut level_counter);
                contracted[vertex as usize] = true;
                number_of_contracted += 1;
                bar.inc(1);

                queue_newly_free(
                    graph,
                    &neighbors,
                    allowed,
                    &contracted,
                    &mut queued_free,
                    &mut free_vertices,
                );
                continue;
            }

            if self.queue.is_empty() {
                break;
            }

            let batch =
                self.select_independent_batch(graph, &contracted, &mut blocked, batch_capacity);

            // The only concurrent region: batch vertices are pairwise
            // non-adjacent, so their shortcut sets stay valid while the
            // whole batch commits below.
            let graph_view: &ContractorGraph = graph;
            let recomputed: Result<Vec<(PriorityElement, Vec<Shortcut>)>, ContractionError> =
                batch
                    .par_iter()
                    .map(|element| {
                        let (priority, shortcuts) =
                            self.priority_and_shortcuts(element.vertex, graph_view)?;
                        Ok((PriorityElement::new(priority, element.vertex), shortcuts))
                    })
                    .collect();
            let recomputed = recomputed?;

            for (element, shortcuts) in recomputed {
                if !self.use_cached_priority {
                    let next_best = self.queue.peek().map_or(i32::MAX, |next| next.priority);
                    if element.priority > next_best {
                        self.queue.push(element);
                        continue;
                    }
                }

                let neighbors: Vec<Vertex> = graph
                    .neighbors(element.vertex)
                    .iter()
                    .map(|neighbor| neighbor.vertex)
                    .collect();
                self.commit_vertex(
                    graph,
                    element.vertex,
                    &shortcuts,
                    node_levels,
                    &mut level_counter,
                );
                contracted[element.vertex as usize] = true;
                number_of_contracted += 1;
                bar.inc(1);

                queue_newly_free(
                    graph,
                    &neighbors,
                    allowed,
                    &contracted,
                    &mut queued_free,
                    &mut free_vertices,
                );
            }
        }
        bar.finish_and_clear();

        Ok(contracted.iter().map(|&contracted| !contracted).collect())
    }

    /// Serial commit of one vertex: refresh the neighborhood priority
    /// terms, insert the required shortcuts, assign the level and archive
    /// the vertex' edges.
    fn commit_vertex(
        &mut self,
        graph: &mut ContractorGraph,
        vertex: Vertex,
        shortcuts: &[Shortcut],
        node_levels: &mut [Level],
        level_counter: &mut Level,
    ) {
        for (_, term) in self.priority_terms.iter_mut() {
            term.update(vertex, graph);
        }

        for shortcut in shortcuts {
            graph.insert_edge(
                shortcut.source,
                shortcut.target,
                EdgeData {
                    weight: shortcut.weight,
                    duration: shortcut.duration,
                    turn_or_middle: shortcut.middle,
                    shortcut: true,
                    forward: true,
                    backward: false,
                },
            );
        }

        node_levels[vertex as usize] = *level_counter;
        *level_counter += 1;

        graph.remove_and_store_node(vertex);
    }

    /// Greedily pops candidates that are not adjacent to anything popped so
    /// far. Adjacent candidates go straight back into the queue; entries of
    /// vertices the free list already contracted are discarded.
    fn select_independent_batch(
        &mut self,
        graph: &ContractorGraph,
        contracted: &[bool],
        blocked: &mut [bool],
        batch_capacity: usize,
    ) -> Vec<PriorityElement> {
        let mut batch = Vec::new();
        let mut deferred = Vec::new();
        let mut blocked_vertices = Vec::new();

        while batch.len() < batch_capacity {
            let Some(element) = self.queue.pop() else {
                break;
            };
            if contracted[element.vertex as usize] {
                continue;
            }
            if blocked[element.vertex as usize] {
                deferred.push(element);
                continue;
            }

            for entry in graph.entries(element.vertex) {
                if !blocked[entry.target as usize] {
                    blocked[entry.target as usize] = true;
                    blocked_vertices.push(entry.target);
                }
            }
            batch.push(element);
        }

        self.queue.extend(deferred);
        for vertex in blocked_vertices {
            blocked[vertex as usize] = false;
        }

        batch
    }

    fn priority_and_shortcuts(
        &self,
        vertex: Vertex,
        graph: &ContractorGraph,
    ) -> Result<(i32, Vec<Shortcut>), ContractionError> {
        let shortcuts = self.shortcut_generator.get_shortcuts(graph, vertex)?;
        let priority = self
            .priority_terms
            .iter()
            .map(|(coefficient, term)| coefficient * term.priority(vertex, graph, &shortcuts))
            .sum();

        Ok((priority, shortcuts))
    }

    fn initialize_queue(
        &mut self,
        graph: &ContractorGraph,
        mut candidates: Vec<Vertex>,
        cached_levels: Option<&[f32]>,
    ) -> Result<(), ContractionError> {
        if self.use_cached_priority {
            if let Some(levels) = cached_levels {
                self.queue = candidates
                    .iter()
                    .map(|&vertex| PriorityElement::new(levels[vertex as usize] as i32, vertex))
                    .collect();
                return Ok(());
            }
            // Without a level file there is nothing to reuse.
            self.use_cached_priority = false;
        }

        // Shuffling decorrelates the expensive simulations so the workers
        // see evenly mixed vertex degrees.
        candidates.shuffle(&mut rand::thread_rng());

        let bar = get_progressbar("Computing initial priorities", candidates.len() as u64);
        let elements: Result<Vec<PriorityElement>, ContractionError> = candidates
            .into_par_iter()
            .progress_with(bar)
            .map(|vertex| {
                let (priority, _) = self.priority_and_shortcuts(vertex, graph)?;
                Ok(PriorityElement::new(priority, vertex))
            })
            .collect();

        self.queue = elements?.into_iter().collect();
        Ok(())
    }
}

/// A vertex without incoming or without outgoing edges has no neighbor pair
/// to bridge, so contracting it can never require a shortcut or a witness
/// search.
fn is_shortcut_free(graph: &ContractorGraph, vertex: Vertex) -> bool {
    let mut has_incoming = false;
    let mut has_outgoing = false;
    for entry in graph.entries(vertex) {
        has_incoming |= entry.data.backward;
        has_outgoing |= entry.data.forward;
        if has_incoming && has_outgoing {
            return false;
        }
    }
    true
}

/// Contracting a vertex can strip its neighbors of their last incoming or
/// outgoing edge; such neighbors join the shortcut-free list. Shortcuts are
/// only ever inserted between vertices that already have edges in both
/// directions, so a listed vertex stays shortcut-free until it is
/// contracted.
fn queue_newly_free(
    graph: &ContractorGraph,
    neighbors: &[Vertex],
    allowed: &[bool],
    contracted: &[bool],
    queued_free: &mut [bool],
    free_vertices: &mut VecDeque<Vertex>,
) {
    for &neighbor in neighbors {
        if allowed[neighbor as usize]
            && !contracted[neighbor as usize]
            && !queued_free[neighbor as usize]
            && is_shortcut_free(graph, neighbor)
        {
            queued_free[neighbor as usize] = true;
            free_vertices.push_back(neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ContractionPass;
    use crate::graphs::{contractor_graph::ContractorGraph, EdgeData, Level};

    fn forward(weight: u32) -> EdgeData {
        EdgeData {
            weight,
            duration: weight,
            turn_or_middle: 0,
            shortcut: false,
            forward: true,
            backward: false,
        }
    }

    fn line_graph(length: u32) -> ContractorGraph {
        let mut graph = ContractorGraph::new(length as usize);
        for vertex in 0..length - 1 {
            graph.insert_edge(vertex, vertex + 1, forward(1));
        }
        graph
    }

    #[test]
    fn contracts_everything_at_core_factor_one() {
        let mut graph = line_graph(4);
        let allowed = vec![true; 4];
        let mut levels: Vec<Level> = vec![0; 4];

        let core = ContractionPass::new(false)
            .contract(&mut graph, &allowed, &mut levels, None, 1.0)
            .unwrap();

        assert!(core.iter().all(|&is_core| !is_core));

        // A path graph is already shortest-path complete: the shortcut-free
        // list eats it from the ends inward, so no shortcut is ever needed.
        let edges = graph.query_edges();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|edge| !edge.data.shortcut));

        // Levels are a permutation of 0..4.
        let mut sorted = levels.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
    }

    #[test]
    fn contracts_nothing_at_core_factor_zero() {
        let mut graph = line_graph(4);
        let allowed = vec![true; 4];
        let mut levels: Vec<Level> = vec![0; 4];

        let core = ContractionPass::new(false)
            .contract(&mut graph, &allowed, &mut levels, None, 0.0)
            .unwrap();

        assert!(core.iter().all(|&is_core| is_core));
        assert_eq!(levels, vec![0; 4]);
    }

    #[test]
    fn hidden_vertices_stay_in_the_core() {
        let mut graph = line_graph(4);
        let allowed = vec![true, true, false, false];
        let mut levels: Vec<Level> = vec![0; 4];

        let core = ContractionPass::new(false)
            .contract(&mut graph, &allowed, &mut levels, None, 1.0)
            .unwrap();

        assert_eq!(core, vec![false, false, true, true]);
    }

    #[test]
    fn contracting_a_detour_inserts_the_shortcut() {
        let mut graph = ContractorGraph::new(3);
        graph.insert_edge(0, 1, forward(1));
        graph.insert_edge(1, 2, forward(1));
        graph.insert_edge(0, 2, forward(3));

        // Only the middle vertex is contractable.
        let allowed = vec![false, true, false];
        let mut levels: Vec<Level> = vec![0; 3];

        ContractionPass::new(false)
            .contract(&mut graph, &allowed, &mut levels, None, 1.0)
            .unwrap();

        let edges = graph.query_edges();
        let shortcut = edges
            .iter()
            .find(|edge| edge.data.shortcut && edge.source == 0)
            .expect("shortcut 0 -> 2 must exist");
        assert_eq!(shortcut.target, 2);
        assert_eq!(shortcut.data.weight, 2);
        assert_eq!(shortcut.data.turn_or_middle, 1);

        // Relaxation replaced the heavier original 0 -> 2 edge.
        assert!(!edges
            .iter()
            .any(|edge| edge.source == 0 && edge.target == 2 && !edge.data.shortcut));
    }
}
