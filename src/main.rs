use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use itertools::Itertools;
use tracing_subscriber::EnvFilter;

use oblivious_bsearch::benchmark::benchmark_searches;
use oblivious_bsearch::network::Config;
use oblivious_bsearch::search::SearchVariant;

#[derive(Parser)]
struct Cli {
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    #[arg(
        long,
        value_name = "N_THREADS",
        help = "The number of worker threads. Set to 0 to indicate the number of cores on the machine. Optional, default single-threaded"
    )]
    threads: Option<usize>,

    #[arg(long, help = "The number of elements of the searched array. You can pass multiple values.", num_args = 1..)]
    size: Vec<usize>,

    #[arg(long, help = "The number repetitions of the protocol execution")]
    rep: usize,

    #[arg(long, help = "Path to write benchmark result data as CSV. Default: result.csv", default_value = "result.csv")]
    csv: PathBuf,

    #[arg(long, help = "Seed of the insecure benchmark dealer, must be equal for both parties", default_value_t = 0)]
    seed: u64,

    #[arg(long, help = "If set, benchmark all search variants and ignore specified targets.", default_value_t = false)]
    all: bool,

    #[arg(value_enum)]
    target: Vec<SearchVariant>,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let (party_index, config) = Config::from_file(&cli.config)
        .map_err(|err| format!("cannot load config {}: {}", cli.config.display(), err))?;

    if cli.size.is_empty() {
        return Err("size parameter required".to_string());
    }
    if !cli.size.iter().all_unique() {
        return Err(format!("Duplicate size values in argument {:?}", cli.size));
    }
    if cli.rep == 0 {
        return Err("rep must be at least 1".to_string());
    }

    let targets: Vec<SearchVariant> = if cli.all {
        SearchVariant::value_variants().to_vec()
    } else {
        // check non-empty and distinct targets
        if cli.target.is_empty() {
            let all_targets: Vec<_> = SearchVariant::value_variants()
                .iter()
                .filter_map(|v| v.to_possible_value())
                .map(|v| v.get_name().to_string())
                .collect();
            return Err(format!("List of targets is empty: choose any number of targets: {:?}", all_targets));
        }
        if !cli.target.iter().all_unique() {
            return Err(format!("Duplicate targets in argument {:?}", cli.target));
        }
        cli.target
    };

    benchmark_searches(
        party_index,
        &config,
        &targets,
        &cli.size,
        cli.rep,
        cli.threads,
        cli.seed,
        &cli.csv,
    )
    .map_err(|err| err.to_string())
}
