use std::{cmp::Reverse, collections::BinaryHeap};

use rand::{rngs::StdRng, Rng, SeedableRng};

use ch_core::{
    config::ContractorConfig,
    contraction::driver::ContractionPass,
    error::ContractionError,
    graphs::{contractor_graph::ContractorGraph, InputEdge, Level, QueryEdge},
    preprocessor::{contract_graph, ContractionOutput, GraphInput},
};

fn edge(source: u32, target: u32, weight: i32) -> InputEdge {
    InputEdge {
        source,
        target,
        weight,
        duration: weight,
        forward: true,
        backward: false,
        turn_id: 0,
    }
}

fn config(core_factor: f32) -> ContractorConfig {
    ContractorConfig {
        core_factor,
        use_cached_priority: false,
        threads: 2,
    }
}

fn input(number_of_vertices: usize, edges: Vec<InputEdge>) -> GraphInput {
    GraphInput {
        node_weights: vec![1; number_of_vertices],
        edges,
        node_classes: vec![0; number_of_vertices],
        excludable_classes: Vec::new(),
        cached_levels: None,
    }
}

/// Plain Dijkstra over the input edge list, restricted to allowed vertices.
/// The yardstick every hierarchy distance is compared against.
fn reference_distance(
    number_of_vertices: usize,
    edges: &[InputEdge],
    node_allowed: &[bool],
    source: u32,
    target: u32,
) -> Option<u64> {
    let mut adjacency: Vec<Vec<(u32, u64)>> = vec![Vec::new(); number_of_vertices];
    for edge in edges {
        if edge.forward {
            adjacency[edge.source as usize].push((edge.target, edge.weight as u64));
        }
        if edge.backward {
            adjacency[edge.target as usize].push((edge.source, edge.weight as u64));
        }
    }

    if !node_allowed[source as usize] || !node_allowed[target as usize] {
        return None;
    }

    let mut distances: Vec<Option<u64>> = vec![None; number_of_vertices];
    let mut queue = BinaryHeap::new();
    distances[source as usize] = Some(0);
    queue.push(Reverse((0u64, source)));

    while let Some(Reverse((distance, vertex))) = queue.pop() {
        if distances[vertex as usize] != Some(distance) {
            continue;
        }
        for &(next, weight) in &adjacency[vertex as usize] {
            if !node_allowed[next as usize] {
                continue;
            }
            let alternative = distance + weight;
            if distances[next as usize].map_or(true, |current| alternative < current) {
                distances[next as usize] = Some(alternative);
                queue.push(Reverse((alternative, next)));
            }
        }
    }

    distances[target as usize]
}

/// Bidirectional upward search over the finished edge stream. Every stored
/// edge lives at its deeper endpoint, so both searches climb by only ever
/// relaxing the records of the vertex they sit on: the forward search along
/// forward-traversable halves, the backward search along backward ones.
struct UpwardSearch {
    number_of_vertices: usize,
    upward_forward: Vec<Vec<(u32, u64)>>,
    upward_backward: Vec<Vec<(u32, u64)>>,
}

impl UpwardSearch {
    fn new(number_of_vertices: usize, edges: &[QueryEdge], edge_allowed: &[bool]) -> Self {
        let mut upward_forward: Vec<Vec<(u32, u64)>> = vec![Vec::new(); number_of_vertices];
        let mut upward_backward: Vec<Vec<(u32, u64)>> = vec![Vec::new(); number_of_vertices];

        for (edge, &allowed) in edges.iter().zip(edge_allowed) {
            if !allowed {
                continue;
            }
            if edge.data.forward {
                upward_forward[edge.source as usize]
                    .push((edge.target, edge.data.weight as u64));
            }
            if edge.data.backward {
                upward_backward[edge.source as usize]
                    .push((edge.target, edge.data.weight as u64));
            }
        }

        UpwardSearch {
            number_of_vertices,
            upward_forward,
            upward_backward,
        }
    }

    fn distance(&self, source: u32, target: u32, node_allowed: &[bool]) -> Option<u64> {
        if !node_allowed[source as usize] || !node_allowed[target as usize] {
            return None;
        }

        let forward = self.one_sided(source, &self.upward_forward, node_allowed);
        let backward = self.one_sided(target, &self.upward_backward, node_allowed);

        forward
            .iter()
            .zip(&backward)
            .filter_map(|(forward, backward)| Some(forward.as_ref()? + backward.as_ref()?))
            .min()
    }

    fn one_sided(
        &self,
        source: u32,
        adjacency: &[Vec<(u32, u64)>],
        node_allowed: &[bool],
    ) -> Vec<Option<u64>> {
        let mut distances: Vec<Option<u64>> = vec![None; self.number_of_vertices];
        let mut queue = BinaryHeap::new();
        distances[source as usize] = Some(0);
        queue.push(Reverse((0u64, source)));

        while let Some(Reverse((distance, vertex))) = queue.pop() {
            if distances[vertex as usize] != Some(distance) {
                continue;
            }
            for &(next, weight) in &adjacency[vertex as usize] {
                if !node_allowed[next as usize] {
                    continue;
                }
                let alternative = distance + weight;
                if distances[next as usize].map_or(true, |current| alternative < current) {
                    distances[next as usize] = Some(alternative);
                    queue.push(Reverse((alternative, next)));
                }
            }
        }

        distances
    }
}

fn all_edges_allowed(output: &ContractionOutput) -> Vec<bool> {
    vec![true; output.edges.len()]
}

fn collected_edges(output: &ContractionOutput) -> Vec<QueryEdge> {
    output.edges.iter().copied().collect()
}

fn assert_all_pairs_preserved(
    number_of_vertices: usize,
    edges: &[InputEdge],
    output: &ContractionOutput,
) {
    let stored = collected_edges(output);
    let search = UpwardSearch::new(number_of_vertices, &stored, &all_edges_allowed(output));
    let everywhere = vec![true; number_of_vertices];

    for source in 0..number_of_vertices as u32 {
        for target in 0..number_of_vertices as u32 {
            let expected =
                reference_distance(number_of_vertices, edges, &everywhere, source, target);
            let actual = search.distance(source, target, &everywhere);
            assert_eq!(
                expected, actual,
                "distance {source} -> {target} changed during contraction"
            );
        }
    }
}

fn seeded_random_graph(number_of_vertices: u32, number_of_edges: usize) -> Vec<InputEdge> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut seen = std::collections::HashSet::new();
    let mut edges = Vec::new();

    while edges.len() < number_of_edges {
        let source = rng.gen_range(0..number_of_vertices);
        let target = rng.gen_range(0..number_of_vertices);
        if source == target || !seen.insert((source, target)) {
            continue;
        }
        let mut edge = edge(source, target, rng.gen_range(1..=20));
        edge.backward = rng.gen_bool(0.3);
        edges.push(edge);
    }

    edges
}

#[test]
fn line_graph_contracts_completely_without_shortcuts() {
    let edges = vec![edge(0, 1, 1), edge(1, 2, 1), edge(2, 3, 1)];
    let output = contract_graph(&config(1.0), input(4, edges.clone())).unwrap();

    assert!(output.is_core.iter().all(|&core| !core));

    // The path graph is already shortest-path complete.
    assert!(output.edges.iter().all(|edge| !edge.data.shortcut));

    let mut levels = output.node_levels.clone();
    levels.sort_unstable();
    assert_eq!(levels, vec![0, 1, 2, 3]);

    assert_all_pairs_preserved(4, &edges, &output);
}

#[test]
fn core_factor_zero_contracts_nothing() {
    let edges = vec![edge(0, 1, 1), edge(1, 2, 1), edge(2, 3, 1)];
    let output = contract_graph(&config(0.0), input(4, edges.clone())).unwrap();

    assert!(output.is_core.iter().all(|&core| core));
    assert_eq!(output.node_levels, vec![0; 4]);

    // No contraction happened, so nothing is a shortcut.
    assert!(output.edges.iter().all(|edge| !edge.data.shortcut));

    assert_all_pairs_preserved(4, &edges, &output);
}

#[test]
fn full_contraction_preserves_all_distances() {
    let edges = seeded_random_graph(30, 110);
    let output = contract_graph(&config(1.0), input(30, edges.clone())).unwrap();

    assert!(output.is_core.iter().all(|&core| !core));
    assert_all_pairs_preserved(30, &edges, &output);
}

#[test]
fn partial_contraction_preserves_all_distances() {
    let edges = seeded_random_graph(30, 110);
    let output = contract_graph(&config(0.6), input(30, edges.clone())).unwrap();

    assert!(output.is_core.iter().any(|&core| core));
    assert_all_pairs_preserved(30, &edges, &output);
}

#[test]
fn shortcuts_never_undercut_true_distances() {
    let edges = seeded_random_graph(25, 90);
    let output = contract_graph(&config(1.0), input(25, edges.clone())).unwrap();
    let everywhere = vec![true; 25];

    for stored in output.edges.iter().filter(|edge| edge.data.shortcut) {
        // A shortcut stands for a real path, in each direction it covers.
        if stored.data.forward {
            let reference =
                reference_distance(25, &edges, &everywhere, stored.source, stored.target)
                    .expect("shortcut endpoints must be connected");
            assert!(reference <= stored.data.weight as u64);
        }
        if stored.data.backward {
            let reference =
                reference_distance(25, &edges, &everywhere, stored.target, stored.source)
                    .expect("shortcut endpoints must be connected");
            assert!(reference <= stored.data.weight as u64);
        }
    }
}

#[test]
fn growing_core_factor_shrinks_the_core() {
    let edges = seeded_random_graph(40, 150);

    let core_of = |core_factor: f32| {
        let mut graph = ContractorGraph::from_input_edges(40, &edges).unwrap();
        let allowed = vec![true; 40];
        let mut levels: Vec<Level> = vec![0; 40];
        ContractionPass::new(false)
            .contract(&mut graph, &allowed, &mut levels, None, core_factor)
            .unwrap()
    };

    let loose = core_of(0.3);
    let tight = core_of(0.8);

    // Contraction is a prefix process: a larger factor only keeps going, so
    // the tighter core is contained in the looser one.
    for vertex in 0..40 {
        if tight[vertex] {
            assert!(loose[vertex]);
        }
    }
    assert!(loose.iter().filter(|&&core| core).count() >= tight.iter().filter(|&&c| c).count());
}

#[test]
fn per_profile_hierarchies_respect_exclusions() {
    // Component A (vertices 0-2, class 0) is allowed under every profile
    // and handled by the shared base pass. Component B splits into a
    // class-2 ring (4, 6, 8) and a class-1 chain (3, 5, 7, 9); each profile
    // excludes one of the two. The 3 -> 4 edge is invisible to every
    // profile and must simply disappear.
    let edges = vec![
        edge(0, 1, 1),
        edge(1, 2, 1),
        edge(0, 2, 3),
        edge(4, 6, 2),
        edge(6, 8, 2),
        edge(4, 8, 7),
        edge(3, 5, 1),
        edge(5, 7, 1),
        edge(7, 9, 1),
        edge(3, 9, 5),
        edge(3, 4, 1),
    ];
    let node_classes = vec![0, 0, 0, 1, 2, 1, 2, 1, 2, 1];
    let excludable_classes = vec![0b01, 0b10];

    let graph_input = GraphInput {
        node_weights: vec![1; 10],
        edges: edges.clone(),
        node_classes: node_classes.clone(),
        excludable_classes: excludable_classes.clone(),
        cached_levels: None,
    };
    let output = contract_graph(&config(1.0), graph_input).unwrap();

    assert_eq!(output.edge_filters.len(), 3);
    assert_eq!(output.edge_flags.len(), output.edges.len());
    assert!(output.edge_flags.iter().all(|&flags| flags != 0));
    assert!(output.is_core.iter().all(|&core| !core));

    let stored = collected_edges(&output);
    for (profile, &mask) in excludable_classes.iter().enumerate() {
        let node_allowed: Vec<bool> = node_classes
            .iter()
            .map(|&class| class & mask == 0)
            .collect();

        // A profile travels the shared base edges plus its own pass.
        let edge_allowed: Vec<bool> = output.edge_filters[0]
            .iter()
            .zip(&output.edge_filters[profile + 1])
            .map(|(&base, &own)| base || own)
            .collect();
        let search = UpwardSearch::new(10, &stored, &edge_allowed);

        for source in 0..10u32 {
            for target in 0..10u32 {
                if !node_allowed[source as usize] || !node_allowed[target as usize] {
                    continue;
                }
                let expected = reference_distance(10, &edges, &node_allowed, source, target);
                let actual = search.distance(source, target, &node_allowed);
                assert_eq!(
                    expected, actual,
                    "profile {profile}: distance {source} -> {target} is wrong"
                );
            }
        }
    }
}

#[test]
fn cached_levels_still_produce_a_correct_hierarchy() {
    let edges = seeded_random_graph(20, 70);

    let first = contract_graph(&config(1.0), input(20, edges.clone())).unwrap();

    let mut rerun_input = input(20, edges.clone());
    rerun_input.cached_levels = Some(
        first
            .node_levels
            .iter()
            .map(|&level| level as f32)
            .collect(),
    );
    let rerun_config = ContractorConfig {
        use_cached_priority: true,
        ..config(1.0)
    };
    let rerun = contract_graph(&rerun_config, rerun_input).unwrap();

    assert_all_pairs_preserved(20, &edges, &rerun);
}

#[test]
fn invalid_core_factor_is_rejected() {
    let result = contract_graph(&config(1.5), input(2, vec![edge(0, 1, 1)]));
    assert!(matches!(
        result,
        Err(ContractionError::InvalidCoreFactor(_))
    ));
}

#[test]
fn more_filters_than_flag_bits_are_rejected() {
    let mut graph_input = input(2, vec![edge(0, 1, 1)]);
    // Eight filter passes plus the base pass exceed the eight flag bits.
    graph_input.excludable_classes = (0..8).map(|bit| 1 << bit).collect();

    let result = contract_graph(&config(1.0), graph_input);
    assert!(matches!(
        result,
        Err(ContractionError::TooManyPasses { .. })
    ));
}

#[test]
fn malformed_edges_are_rejected_before_contraction() {
    let self_loop = InputEdge {
        source: 1,
        target: 1,
        weight: 3,
        duration: 3,
        forward: true,
        backward: false,
        turn_id: 0,
    };
    let result = contract_graph(&config(1.0), input(2, vec![self_loop]));
    assert!(matches!(result, Err(ContractionError::MalformedEdge { .. })));

    let negative = InputEdge {
        source: 0,
        target: 1,
        weight: -4,
        duration: 1,
        forward: true,
        backward: false,
        turn_id: 0,
    };
    let result = contract_graph(&config(1.0), input(2, vec![negative]));
    assert!(matches!(result, Err(ContractionError::MalformedEdge { .. })));
}
