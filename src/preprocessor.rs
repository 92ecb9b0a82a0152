use log::info;

use crate::{
    collections::chunked_vec::ChunkedVec,
    config::{ContractorConfig, BASE_CORE},
    contraction::driver::ContractionPass,
    error::ContractionError,
    graphs::{contractor_graph::ContractorGraph, InputEdge, Level, QueryEdge},
    io,
    merge::contracted_edge_container::{ContractedEdgeContainer, MergedFlags, MAX_PASSES},
};

/// Everything the preprocessor consumes. Node weights anchor the vertex
/// count; all other per-node data must match their length.
pub struct GraphInput {
    pub node_weights: Vec<u32>,
    pub edges: Vec<InputEdge>,
    pub node_classes: Vec<u32>,
    pub excludable_classes: Vec<u32>,
    pub cached_levels: Option<Vec<f32>>,
}

pub struct ContractionOutput {
    pub number_of_vertices: u32,
    pub checksum: u32,
    pub edges: ChunkedVec<QueryEdge>,
    pub edge_flags: Vec<MergedFlags>,
    pub edge_filters: Vec<Vec<bool>>,
    pub node_levels: Vec<Level>,
    pub is_core: Vec<bool>,
}

/// Runs the full contraction pipeline inside a worker pool of the
/// configured size: shared base pass over the always-allowed vertices, one
/// pass per exclusion filter over the shared core, merged into a single
/// flagged edge stream.
pub fn contract_graph(
    config: &ContractorConfig,
    input: GraphInput,
) -> Result<ContractionOutput, ContractionError> {
    config.validate()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    pool.install(|| run(config, input))
}

fn run(config: &ContractorConfig, input: GraphInput) -> Result<ContractionOutput, ContractionError> {
    let number_of_vertices = input.node_weights.len();

    if input.node_classes.len() != number_of_vertices {
        return Err(ContractionError::NodeCountMismatch {
            expected: number_of_vertices,
            got: input.node_classes.len(),
        });
    }
    if let Some(cached_levels) = &input.cached_levels {
        if cached_levels.len() != number_of_vertices {
            return Err(ContractionError::NodeCountMismatch {
                expected: number_of_vertices,
                got: cached_levels.len(),
            });
        }
    }

    let filters = node_filters(
        number_of_vertices,
        &input.node_classes,
        &input.excludable_classes,
    );
    if filters.len() + 1 > MAX_PASSES {
        return Err(ContractionError::TooManyPasses { limit: MAX_PASSES });
    }

    info!("building contractor graph from {} edges", input.edges.len());
    let mut graph = ContractorGraph::from_input_edges(number_of_vertices, &input.edges)?;

    let mut always_allowed = vec![true; number_of_vertices];
    for filter in &filters {
        for (allowed, &filter_allows) in always_allowed.iter_mut().zip(filter) {
            *allowed = *allowed && filter_allows;
        }
    }

    let mut node_levels: Vec<Level> = vec![0; number_of_vertices];
    let cached_levels = input.cached_levels.as_deref();

    // Contracting only up to BASE_CORE here avoids a very dense shared
    // core; the graph gets a little larger, but the per-filter passes stay
    // cheap and the final hierarchy better.
    info!("contracting the shared base pass");
    let is_shared_core = ContractionPass::new(config.use_cached_priority)
        .contract(
            &mut graph,
            &always_allowed,
            &mut node_levels,
            cached_levels,
            BASE_CORE.min(config.core_factor),
        )
        .map_err(|error| error.in_pass(0))?;

    let mut container = ContractedEdgeContainer::new();

    // Pass 0 contributes every edge that is not interior to the shared
    // core. Interior edges are re-derived by each filter pass; keeping them
    // here as well would double-count them.
    let mut non_core_edges = graph.query_edges();
    non_core_edges.retain(|edge| {
        !(is_shared_core[edge.source as usize] && is_shared_core[edge.target as usize])
    });
    container
        .merge(non_core_edges)
        .map_err(|error| error.in_pass(0))?;

    let shared_core_graph = graph.filtered(&is_shared_core).materialize();
    drop(graph);

    let mut is_core = vec![false; number_of_vertices];
    for (filter_index, filter) in filters.iter().enumerate() {
        let pass = filter_index + 1;
        info!("contracting pass {pass} of {}", filters.len());

        let allowed: Vec<bool> = (0..number_of_vertices)
            .map(|vertex| filter[vertex] && is_shared_core[vertex])
            .collect();
        let mut pass_graph = shared_core_graph.filtered(filter).materialize();

        let pass_core = ContractionPass::new(config.use_cached_priority)
            .contract(
                &mut pass_graph,
                &allowed,
                &mut node_levels,
                cached_levels,
                config.core_factor,
            )
            .map_err(|error| error.in_pass(pass))?;

        for vertex in 0..number_of_vertices {
            if allowed[vertex] && pass_core[vertex] {
                is_core[vertex] = true;
            }
        }

        container
            .merge(pass_graph.into_query_edges())
            .map_err(|error| error.in_pass(pass))?;
    }

    // Shared-core vertices no filter admits are contracted by no pass; they
    // stay at the top of the hierarchy.
    for vertex in 0..number_of_vertices {
        if is_shared_core[vertex] && filters.iter().all(|filter| !filter[vertex]) {
            is_core[vertex] = true;
        }
    }

    info!("contracted graph has {} edges", container.number_of_edges());

    let checksum = io::edge_checksum(container.edges());
    let edge_filters = container.make_edge_filters();
    let (edges, edge_flags) = container.into_edges_and_flags();

    Ok(ContractionOutput {
        number_of_vertices: number_of_vertices as u32,
        checksum,
        edges,
        edge_flags,
        edge_filters,
        node_levels,
        is_core,
    })
}

/// One allow-vector per excludable class: a vertex is allowed when its
/// class bitmask shares no bit with the exclusion mask. Without any
/// excludable class a single pass over all vertices remains.
fn node_filters(
    number_of_vertices: usize,
    node_classes: &[u32],
    excludable_classes: &[u32],
) -> Vec<Vec<bool>> {
    if excludable_classes.is_empty() {
        return vec![vec![true; number_of_vertices]];
    }

    excludable_classes
        .iter()
        .map(|&mask| {
            node_classes
                .iter()
                .map(|&node_class| node_class & mask == 0)
                .collect()
        })
        .collect()
}
