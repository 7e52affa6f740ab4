//! privsum-bench: calibration and scaling benchmark of the private
//! aggregation service.
//!
//! Every flag can also be set through the `PRIVSUM_BENCH_*` environment
//! variable shown in `--help`.

use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use privsum::LocalService;
use privsum_bench::{
    Baseline, BenchConfig, BenchmarkRunner, CalibrationSettings, Parallelism, WorkloadSettings,
};

const EXECUTION_MODE: &str = "in-process";
const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

#[derive(Parser)]
#[command(name = "privsum-bench")]
#[command(about = "Calibrate and sweep the private aggregation service")]
#[command(version)]
struct Args {
    /// Standard deviation of the per-node noise
    #[arg(long, env = "PRIVSUM_BENCH_SIGMA", default_value_t = 0.5)]
    sigma: f64,

    /// Worker counts of the weak-scaling sweep
    #[arg(
        long,
        env = "PRIVSUM_BENCH_WEAK_SCALES",
        value_delimiter = ',',
        default_value = "1,2,4,8,16,32"
    )]
    weak_threads: Vec<usize>,

    /// Worker counts of the strong-scaling sweep
    #[arg(
        long,
        env = "PRIVSUM_BENCH_STRONG_SCALES",
        value_delimiter = ',',
        default_value = "1,2,4,8,16,32"
    )]
    strong_threads: Vec<usize>,

    /// Skip calibration and use this many values per pass
    #[arg(long, env = "PRIVSUM_BENCH_DATA_SIZE")]
    data_size: Option<usize>,

    /// First dataset size tried by calibration
    #[arg(long, env = "PRIVSUM_BENCH_INITIAL_SIZE", default_value_t = 1024)]
    initial_size: usize,

    /// Largest dataset size tried by calibration
    #[arg(long, env = "PRIVSUM_BENCH_MAX_SIZE", default_value_t = 1 << 22)]
    max_size: usize,

    /// Growth factor between calibration attempts
    #[arg(long, env = "PRIVSUM_BENCH_GROWTH", default_value_t = 2)]
    growth_factor: usize,

    /// Target pass latency of calibration, in milliseconds
    #[arg(long, env = "PRIVSUM_BENCH_TARGET_MILLIS", default_value_t = 50.0)]
    target_millis: f64,

    /// Passes discarded before measuring
    #[arg(long, env = "PRIVSUM_BENCH_WARMUP", default_value_t = 3)]
    warmup: usize,

    /// Passes averaged per measurement
    #[arg(long, env = "PRIVSUM_BENCH_MEASURE", default_value_t = 5)]
    measure: usize,

    /// Ceiling on concurrent workers (defaults to the host parallelism)
    #[arg(long, env = "PRIVSUM_BENCH_MAX_THREADS", conflicts_with = "unbounded")]
    max_threads: Option<usize>,

    /// Run every requested worker, without a ceiling
    #[arg(long)]
    unbounded: bool,

    /// Seconds a pass waits for its worker threads to exit
    #[arg(long, env = "PRIVSUM_BENCH_GRACE_SECS", default_value_t = 5)]
    grace_secs: u64,

    /// Seed for reproducible noise and perturbation
    #[arg(long, env = "PRIVSUM_BENCH_SEED")]
    seed: Option<u64>,

    /// Log every pass
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> privsum::Result<BenchConfig> {
        if !self.target_millis.is_finite() || self.target_millis < 0.0 {
            return Err(privsum::Error::invalid_configuration(
                "target latency must be a non-negative number of milliseconds",
            ));
        }
        let baseline = match self.data_size {
            Some(data_size) => Baseline::Fixed(WorkloadSettings::new(
                data_size,
                self.warmup,
                self.measure,
                self.sigma,
            )?),
            None => Baseline::Calibrate(CalibrationSettings::new(
                self.initial_size,
                self.max_size,
                self.growth_factor,
                Duration::from_secs_f64(self.target_millis / 1000.0),
                self.warmup,
                self.measure,
                self.sigma,
            )?),
        };
        let parallelism = match (self.unbounded, self.max_threads) {
            (true, _) => Parallelism::Unbounded,
            (false, Some(threads)) => Parallelism::bounded(threads)?,
            (false, None) => Parallelism::from_host(),
        };
        let config = BenchConfig {
            parallelism,
            grace_period: Duration::from_secs(self.grace_secs),
            seed: self.seed,
            ..BenchConfig::new(
                baseline,
                self.weak_threads.clone(),
                self.strong_threads.clone(),
            )?
        };
        Ok(config)
    }

    fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.config()?;
    info!("Execution mode: {}", EXECUTION_MODE);
    info!("Parallelism ceiling: {:?}", config.parallelism);
    info!("Baseline threads: {}", config.baseline_threads());

    let service = match config.seed {
        Some(seed) => LocalService::with_seed(seed),
        None => LocalService::new(),
    };

    let steps = (config.weak_thread_counts.len() + config.strong_thread_counts.len()) as u64;
    let pb = ProgressBar::new(steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)?
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    let mut runner = BenchmarkRunner::from_config(&service, &config).on_result(move |result| {
        progress.set_message(format!(
            "{} threads, {} values",
            result.requested_threads, result.dataset_extent
        ));
        progress.inc(1);
    });
    let summary = runner.run(&config, EXECUTION_MODE)?;
    pb.finish_and_clear();

    println!("{}", style("== Benchmark Summary ==").green().bold());
    println!("{}", summary.to_pretty_string()?);
    Ok(())
}
