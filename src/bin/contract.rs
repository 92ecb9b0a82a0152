use std::{path::PathBuf, process::exit, time::Instant};

use clap::Parser;
use log::info;

use ch_core::{
    config::ContractorConfig,
    error::ContractionError,
    io,
    preprocessor::{contract_graph, ContractionOutput, GraphInput},
    utility::get_progressspinner,
};

/// Contracts an edge-expanded road graph into a layered shortcut graph.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node weight file
    #[arg(long)]
    node_weights: PathBuf,

    /// Edge-expanded edge list
    #[arg(long)]
    edges: PathBuf,

    /// Per-node class bitmask file
    #[arg(long)]
    node_data: PathBuf,

    /// Profile properties (excludable class masks)
    #[arg(long)]
    properties: PathBuf,

    /// Base path of the output files (.hsgr, .core and .level are appended)
    #[arg(short, long)]
    output: PathBuf,

    /// Fraction of nodes to contract per pass, 1.0 contracts everything
    #[arg(long, default_value_t = 1.0)]
    core_factor: f32,

    /// Load the level file of an earlier run and skip priority computation
    #[arg(long, default_value_t = false)]
    use_cached_priority: bool,

    /// Worker pool size, defaults to all hardware threads
    #[arg(long)]
    threads: Option<usize>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ContractorConfig {
        core_factor: args.core_factor,
        use_cached_priority: args.use_cached_priority,
        threads: args.threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, |threads| threads.get())
        }),
    };

    let start = Instant::now();

    let input = match load_input(&args, &config) {
        Ok(input) => input,
        Err(error) => fail("loading", error),
    };

    let output = match contract_graph(&config, input) {
        Ok(output) => output,
        Err(error) => fail("contracting", error),
    };

    info!(
        "contracted {} vertices into {} edges in {:?}",
        output.number_of_vertices,
        output.edges.len(),
        start.elapsed()
    );

    if let Err(error) = write_output(&args, &config, output) {
        fail("writing", error);
    }

    info!("finished preprocessing in {:?}", start.elapsed());
}

fn load_input(args: &Args, config: &ContractorConfig) -> Result<GraphInput, ContractionError> {
    info!("reading node weights");
    let node_weights = io::read_node_weights(&args.node_weights)?;

    let spinner = get_progressspinner("Reading edge-expanded graph");
    let edges = io::read_input_edges(&args.edges)?;
    spinner.finish_and_clear();

    info!("reading node data and profile properties");
    let node_classes = io::read_node_classes(&args.node_data)?;
    let excludable_classes = io::read_profile_properties(&args.properties)?;

    let cached_levels = if config.use_cached_priority {
        Some(io::read_levels(&level_path(args))?)
    } else {
        None
    };

    Ok(GraphInput {
        node_weights,
        edges,
        node_classes,
        excludable_classes,
        cached_levels,
    })
}

fn write_output(
    args: &Args,
    config: &ContractorConfig,
    output: ContractionOutput,
) -> Result<(), ContractionError> {
    io::write_core_marker(&output_path(args, "core"), &output.is_core)?;
    if !config.use_cached_priority {
        io::write_levels(&level_path(args), &output.node_levels)?;
    }

    io::write_graph(
        &output_path(args, "hsgr"),
        output.checksum,
        output.number_of_vertices,
        output.edges,
    )
}

fn level_path(args: &Args) -> PathBuf {
    output_path(args, "level")
}

fn output_path(args: &Args, extension: &str) -> PathBuf {
    let mut path = args.output.clone().into_os_string();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn fail(phase: &str, error: ContractionError) -> ! {
    eprintln!("error while {phase}: {error}");
    exit(1);
}
