//! MMDStream CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mmd_compute::GaussianKernel;
use mmd_core::{
    DenseFeatures, Kernel, KernelSelectionMethod, NullApproximationMethod, StatisticType,
    VarianceEstimationMethod,
};
use mmd_inference::{BlockStream, MmdConfig, StreamingMmd};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mmdtest")]
#[command(about = "Streaming kernel two-sample test (MMD)")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the two-sample test (optionally selecting the kernel first)
    Test {
        #[command(flatten)]
        run: RunArgs,

        /// Significance level
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Kernel selection method (median_heuristic, maximize_mmd, maximize_power, maximize_xvalidation)
        #[arg(long)]
        select: Option<String>,

        /// Learn a weighted combination of the candidate kernels
        #[arg(long)]
        weighted: bool,

        /// Train/test ratio used during kernel selection
        #[arg(long, default_value = "1.0")]
        train_test_ratio: f64,

        /// Number of runs for cross-validated selection
        #[arg(long, default_value = "5")]
        num_runs: usize,
    },

    /// Sample the permutation null distribution
    Null {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Print version information
    Version,
}

#[derive(Args)]
struct RunArgs {
    /// Input samples (JSON: {"p": [[...], ...], "q": [[...], ...]})
    #[arg(short, long)]
    input: PathBuf,

    /// Output file for results (pretty JSON). Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Estimator configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Samples per block (both P and Q)
    #[arg(long, default_value = "50")]
    blocksize: usize,

    /// Block pairs per burst
    #[arg(long, default_value = "8")]
    blocks_per_burst: usize,

    /// Gaussian kernel widths; the first is used unless a selection method is given
    #[arg(long, value_delimiter = ',', default_value = "1.0")]
    widths: Vec<f64>,

    /// Statistic type (unbiased_full, unbiased_incomplete, biased_full)
    #[arg(long)]
    statistic: Option<String>,

    /// Variance estimation method (direct, permutation)
    #[arg(long)]
    variance: Option<String>,

    /// Null approximation method (permutation, mmd1_gaussian)
    #[arg(long)]
    null: Option<String>,

    /// Number of null samples
    #[arg(long)]
    num_null_samples: Option<usize>,

    /// Seed for permutations
    #[arg(long)]
    seed: Option<u64>,

    /// Threads (0 = auto)
    #[arg(long, default_value = "0")]
    threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct SamplesJson {
    p: Vec<Vec<f64>>,
    q: Vec<Vec<f64>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Test { run, alpha, select, weighted, train_test_ratio, num_runs } => {
            cmd_test(&run, alpha, select.as_deref(), weighted, train_test_ratio, num_runs)
        }
        Commands::Null { run } => cmd_null(&run),
        Commands::Version => {
            println!("mmdtest {}", mmd_core::VERSION);
            Ok(())
        }
    }
}

fn load_config(run: &RunArgs) -> Result<MmdConfig> {
    let mut config = match &run.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            MmdConfig::from_json_str(&text)?
        }
        None => MmdConfig::default(),
    };
    if let Some(s) = &run.statistic {
        config.statistic_type = s.parse::<StatisticType>()?;
    }
    if let Some(s) = &run.variance {
        config.variance_estimation_method = s.parse::<VarianceEstimationMethod>()?;
    }
    if let Some(s) = &run.null {
        config.null_approximation_method = s.parse::<NullApproximationMethod>()?;
    }
    if let Some(n) = run.num_null_samples {
        config.num_null_samples = n;
    }
    if run.seed.is_some() {
        config.seed = run.seed;
    }
    config.n_threads = run.threads;
    config.validate()?;
    Ok(config)
}

fn load_estimator(run: &RunArgs) -> Result<StreamingMmd<BlockStream>> {
    let config = load_config(run)?;
    let text = std::fs::read_to_string(&run.input)
        .with_context(|| format!("failed to read input {}", run.input.display()))?;
    let samples: SamplesJson = serde_json::from_str(&text)?;
    let p = DenseFeatures::from_rows(&samples.p)?;
    let q = DenseFeatures::from_rows(&samples.q)?;
    tracing::info!(
        n_p = p.num_vectors(),
        n_q = q.num_vectors(),
        dim = p.dim(),
        blocksize = run.blocksize,
        "loaded samples"
    );
    let source = BlockStream::new(p, q, run.blocksize, run.blocksize, run.blocks_per_burst)?;
    Ok(StreamingMmd::new(source, config)?)
}

fn kernels(widths: &[f64]) -> Result<Vec<Arc<dyn Kernel>>> {
    if widths.is_empty() {
        anyhow::bail!("at least one kernel width is required");
    }
    widths
        .iter()
        .map(|&w| Ok(Arc::new(GaussianKernel::new(w)?) as Arc<dyn Kernel>))
        .collect()
}

fn cmd_test(
    run: &RunArgs,
    alpha: f64,
    select: Option<&str>,
    weighted: bool,
    train_test_ratio: f64,
    num_runs: usize,
) -> Result<()> {
    let mut mmd = load_estimator(run)?;
    let candidates = kernels(&run.widths)?;

    let selection = match select {
        Some(name) => {
            let method = name.parse::<KernelSelectionMethod>()?;
            for k in candidates {
                mmd.add_kernel(k);
            }
            let chosen = mmd.select_kernel(method, weighted, train_test_ratio, num_runs, alpha)?;
            tracing::info!(method = %method, kernel = %chosen.name(), "kernel selected");
            Some(method)
        }
        None => {
            mmd.set_kernel(candidates[0].clone());
            None
        }
    };

    let outcome = mmd.perform_test(alpha)?;
    tracing::info!(statistic = outcome.statistic, p_value = outcome.p_value, reject = outcome.reject, "test done");

    let kernel = mmd.kernel().map(|k| k.name());
    let output_json = serde_json::json!({
        "kernel": kernel,
        "selection": selection.map(|m| m.as_str()),
        "seed": mmd.seed(),
        "result": outcome,
    });
    write_json(run.output.as_ref(), output_json)
}

fn cmd_null(run: &RunArgs) -> Result<()> {
    let mut mmd = load_estimator(run)?;
    let kernel = kernels(&run.widths)?.remove(0);
    mmd.set_kernel(kernel.clone());
    let null_samples = mmd.sample_null()?;
    tracing::info!(num_null_samples = null_samples.len(), "null sampled");

    let output_json = serde_json::json!({
        "kernel": kernel.name(),
        "statistic_type": mmd.statistic_type(),
        "seed": mmd.seed(),
        "null": null_samples,
    });
    write_json(run.output.as_ref(), output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
