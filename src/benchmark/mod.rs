//! Two-process benchmark of the search variants.
//!
//! Every iteration connects to the other party, sets up a fresh [MainParty] and runs three phases:
//! - preprocessing: both parties derive the same [TrustedDealer] from a common seed and keep
//!   their own store and array shares. This gives no privacy and only serves benchmarking.
//! - online: one search for a random target.
//! - finalize: the index is opened and compared with the plaintext lower bound.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::network::{Config, ConnectedParty};
use crate::oram::SharedArray;
use crate::party::correlated_randomness::TrustedDealer;
use crate::party::error::MpcResult;
use crate::party::{CommStats, MainParty, Role};
use crate::search::{run_search, search_demand, SearchVariant};
use crate::share::MAX_ABS_VALUE;

const WAIT_BETWEEN_SEC: u64 = 1;
const CONNECT_TIMEOUT_SEC: u64 = 60;

pub struct BenchmarkResult {
    prep_time: Duration,
    online_time: Duration,
    finalize_time: Duration,
    online_comm_stats: CommStats,
    comparisons: usize,
    total_read_width: usize,
    correct: bool,
    additional_timers: HashMap<String, Duration>,
}

#[derive(Default)]
pub struct AggregatedBenchmarkResult {
    results: Vec<BenchmarkResult>,
}

/// Sorted plaintext array and target of one iteration, identical for both parties.
fn instance(size: usize, rng: &mut ChaCha20Rng) -> (Vec<i64>, i64) {
    let bound = MAX_ABS_VALUE / 2;
    let mut values: Vec<i64> = (0..size).map(|_| rng.gen_range(-bound..=bound)).collect();
    values.sort_unstable();
    let target = if !values.is_empty() && rng.gen_bool(0.5) {
        // hit an existing value half of the time
        values[rng.gen_range(0..values.len())]
    } else {
        rng.gen_range(-bound..=bound)
    };
    (values, target)
}

fn run_iteration(
    conn: ConnectedParty,
    variant: SearchVariant,
    size: usize,
    n_worker_threads: Option<usize>,
    seed: u64,
) -> MpcResult<BenchmarkResult> {
    let mut party = MainParty::setup(conn, n_worker_threads)?;
    let role = party.role();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let (values, target) = instance(size, &mut rng);

    let start = Instant::now();
    let mut dealer = TrustedDealer::from_seed(rng.gen());
    let (array0, array1) = dealer.share_values(&values)?;
    let (target0, target1) = dealer.share_values(&[target])?;
    let (store0, store1) = dealer.deal(&search_demand(variant, size));
    let (array, target_share, store) = match role {
        Role::P0 => (array0, target0[0], store0),
        Role::P1 => (array1, target1[0], store1),
    };
    party.add_correlations(store);
    let array = SharedArray::from_shares(array);
    let prep_time = start.elapsed();

    party.reset_comm_stats();
    party.reset_search_cost();
    let start = Instant::now();
    let index = run_search(&mut party, variant, &array, target_share)?;
    let online_time = start.elapsed();
    let online_comm_stats = party.comm_stats();

    let start = Instant::now();
    let opened = index.open(&mut party)?;
    let finalize_time = start.elapsed();
    let expected = values.partition_point(|v| *v < target) as u64;
    let correct = opened == expected;
    if !correct {
        tracing::error!(?variant, size, opened, expected, "search returned a wrong index");
    }

    party.teardown()?;
    party.print_statistics();
    let cost = party.search_cost();
    Ok(BenchmarkResult {
        prep_time,
        online_time,
        finalize_time,
        online_comm_stats,
        comparisons: cost.comparisons,
        total_read_width: cost.total_read_width(),
        correct,
        additional_timers: party.get_additional_timers().into_iter().collect(),
    })
}

fn benchmark(
    party_index: usize,
    config: &Config,
    variant: SearchVariant,
    size: usize,
    iterations: usize,
    n_worker_threads: Option<usize>,
    seed: u64,
) -> MpcResult<AggregatedBenchmarkResult> {
    let mut agg = AggregatedBenchmarkResult::default();
    for i in 0..iterations {
        tracing::info!(?variant, size, iteration = i + 1, "benchmark iteration");
        let conn = ConnectedParty::bind_and_connect(
            party_index,
            config.clone(),
            Some(Duration::from_secs(CONNECT_TIMEOUT_SEC)),
        )?;
        let res = run_iteration(conn, variant, size, n_worker_threads, seed.wrapping_add(i as u64))?;
        agg.results.push(res);
        thread::sleep(Duration::from_secs(WAIT_BETWEEN_SEC));
    }
    Ok(agg)
}

/// Benchmarks every variant on every size and writes one CSV row per iteration to `output`.
#[allow(clippy::too_many_arguments)]
pub fn benchmark_searches(
    party_index: usize,
    config: &Config,
    variants: &[SearchVariant],
    sizes: &[usize],
    iterations: usize,
    n_worker_threads: Option<usize>,
    seed: u64,
    output: &Path,
) -> MpcResult<()> {
    let mut writer = BufWriter::new(File::create(output)?);
    writeln!(
        &mut writer,
        "variant,size,pre-processing-time,online-time,finalize-time,online-bytes-sent,online-bytes-received,online-rounds,comparisons,total-read-width,correct"
    )?;
    tracing::info!(
        "benchmark [rep: {}, sizes: {:?}, threads: {:?}, targets: {}]",
        iterations,
        sizes,
        n_worker_threads,
        variants.iter().map(|v| format!("{:?}", v)).join(", ")
    );

    for size in sizes {
        for variant in variants {
            let agg = benchmark(party_index, config, *variant, *size, iterations, n_worker_threads, seed)?;
            tracing::info!(
                ?variant,
                size,
                online_avg_s = agg.online_time_avg_s(),
                "finished benchmark"
            );
            for (key, duration) in agg.additional_timers() {
                tracing::info!(?variant, size, "{}: {}s", key, duration.as_secs_f64());
            }
            agg.write_to_csv(&mut writer, &format!("{:?}", variant), *size)?;
            writer.flush()?;
        }
    }
    tracing::info!("wrote CSV-formatted benchmark results to {}", output.display());
    Ok(())
}

impl AggregatedBenchmarkResult {
    pub fn n_iterations(&self) -> usize {
        self.results.len()
    }

    pub fn online_time_avg_s(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        let total: f64 = self.results.iter().map(|r| r.online_time.as_secs_f64()).sum();
        total / self.results.len() as f64
    }

    pub fn all_correct(&self) -> bool {
        self.results.iter().all(|r| r.correct)
    }

    /// Sum of every additional timer over all iterations.
    pub fn additional_timers(&self) -> HashMap<String, Duration> {
        let mut total = HashMap::new();
        for r in &self.results {
            for (key, duration) in &r.additional_timers {
                *total.entry(key.clone()).or_insert(Duration::ZERO) += *duration;
            }
        }
        total
    }

    pub fn write_to_csv<W: Write>(&self, writer: &mut W, name: &str, size: usize) -> io::Result<()> {
        for r in &self.results {
            write!(writer, "\"{}\",{},", name, size)?;
            write!(
                writer,
                "{},{},{},",
                r.prep_time.as_secs_f64(),
                r.online_time.as_secs_f64(),
                r.finalize_time.as_secs_f64()
            )?;
            r.online_comm_stats.write_to_csv(writer)?;
            writeln!(writer, ",{},{},{}", r.comparisons, r.total_read_width, r.correct)?;
        }
        Ok(())
    }
}
