use ahash::{HashMap, HashMapExt, HashSet};

use crate::{
    graphs::{contractor_graph::ContractorGraph, Vertex},
    queue::radix_queue::RadixQueue,
};

/// Bounded one-to-many Dijkstra over forward edges, skipping the forbidden
/// vertex. Stops once every target is settled or the queue minimum exceeds
/// `max_weight`; `max_hops` caps the path length. Returns the distances of
/// all reached vertices; absent targets have no witness within the bound.
pub fn witness_search(
    graph: &ContractorGraph,
    source: Vertex,
    forbidden: Vertex,
    max_weight: u64,
    max_hops: u32,
    targets: &HashSet<Vertex>,
) -> HashMap<Vertex, u64> {
    let mut queue = RadixQueue::new();
    let mut weight: HashMap<Vertex, u64> = HashMap::new();
    let mut hops: HashMap<Vertex, u32> = HashMap::new();

    let mut open_targets = targets.clone();

    queue.push(0, source);
    weight.insert(source, 0);
    hops.insert(source, 0);

    while let Some((_, vertex)) = queue.pop() {
        if open_targets.remove(&vertex) && open_targets.is_empty() {
            break;
        }

        let weight_vertex = weight[&vertex];
        let hops_vertex = hops[&vertex];

        for edge in graph.entries(vertex) {
            if !edge.data.forward || edge.target == forbidden {
                continue;
            }

            let alternative_weight = weight_vertex + edge.data.weight as u64;
            let alternative_hops = hops_vertex + 1;
            if alternative_weight > max_weight || alternative_hops > max_hops {
                continue;
            }

            let current_weight = *weight.get(&edge.target).unwrap_or(&u64::MAX);
            if alternative_weight < current_weight {
                queue.push(alternative_weight, edge.target);
                weight.insert(edge.target, alternative_weight);
                hops.insert(edge.target, alternative_hops);
            }
        }
    }

    weight
}
