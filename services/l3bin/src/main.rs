//! Level-3 binning command-line tool.
//!
//! `bin` runs a binning request over the products listed in a manifest and
//! writes a binned file; `inspect` prints the contents of a binned file.

mod sources;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use l3_binning::writer::Dim;
use l3_binning::{AtomicProgress, BinFileReader, BinningConfig, BinningProcess, Product};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "l3bin")]
#[command(about = "Spatial/temporal binning of Level-2 products onto a global grid")]
struct Cli {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a binning request
    Bin {
        /// Binning request (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Product manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Override the output path of the request
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the number of worker threads
        #[arg(short, long)]
        parallelism: Option<usize>,
    },

    /// Print the contents of a binned file
    Inspect {
        /// Binned file
        file: PathBuf,

        /// Number of bins to list
        #[arg(short, long, default_value = "10")]
        bins: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Bin {
            config,
            manifest,
            output,
            parallelism,
        } => run_binning(config, manifest, output, parallelism),
        Commands::Inspect { file, bins } => inspect(file, bins),
    }
}

fn run_binning(
    config_path: PathBuf,
    manifest: PathBuf,
    output: Option<PathBuf>,
    parallelism: Option<usize>,
) -> Result<()> {
    let mut config = BinningConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load binning request {}", config_path.display()))?;
    config.apply_env_overrides();
    if let Some(output) = output {
        config.output.path = output;
    }
    if let Some(parallelism) = parallelism {
        config.parallelism = parallelism;
    }

    info!(
        config = %config_path.display(),
        num_rows = config.num_rows,
        compositing_type = %config.compositing_type,
        aggregators = config.aggregators.len(),
        "Loaded binning request"
    );

    let process = BinningProcess::new(config).context("Invalid binning request")?;
    let products = sources::load_products(&manifest)?;
    let refs: Vec<&dyn Product> = products.iter().map(|p| p as &dyn Product).collect();

    let progress = AtomicProgress::new();
    let summary = process.run(&refs, &progress).context("Binning failed")?;

    println!("Binned {} product(s) into {}", summary.products_binned.len(), summary.output.path.display());
    for (name, filter) in &summary.products_excluded {
        println!("  excluded {} ({})", name, filter);
    }
    println!("  region:     {}", summary.region);
    println!("  pixels:     {}", summary.stats.pixels);
    println!("  samples:    {}", summary.stats.samples);
    println!("  bins:       {}", summary.output.bins_written);
    println!("  rows:       {}", summary.output.rows_with_data);
    println!("  bytes:      {}", summary.output.bytes);
    if let Some((start, end)) = summary.time_coverage {
        println!("  coverage:   {} .. {}", start, end);
    }

    Ok(())
}

fn inspect(file: PathBuf, bins: usize) -> Result<()> {
    let reader = BinFileReader::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;

    println!("{}", file.display());
    println!("  dims: bin_index = {}, bin_list = {}", reader.dim_len(Dim::BinIndex), reader.dim_len(Dim::BinList));
    println!("  attributes:");
    for (name, value) in reader.attributes() {
        println!("    {} = {}", name, value);
    }
    println!("  variables:");
    for var in reader.variables() {
        println!("    {} ({}, {})", var.name, var.dim.name(), var.data.type_name());
    }

    let bin_nums = reader.bin_nums()?;
    let nobs = reader.nobs()?;
    let nscenes = reader.nscenes()?;
    let names = reader.feature_names();
    let features = names
        .iter()
        .map(|n| reader.feature(n))
        .collect::<l3_binning::Result<Vec<_>>>()?;

    println!("  bins (first {}):", bins.min(bin_nums.len()));
    println!("    bin_num nobs nscenes {}", names.join(" "));
    for i in 0..bins.min(bin_nums.len()) {
        let values: Vec<String> = features.iter().map(|f| format!("{}", f[i])).collect();
        println!("    {} {} {} {}", bin_nums[i], nobs[i], nscenes[i], values.join(" "));
    }

    Ok(())
}
