use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use lattice_core::pipeline::config::{ProcessPlan, RegistrationConfig};
use lattice_core::pipeline::{process_item, ItemOutcome, ItemReporter};
use lattice_core::pool::AbortFlag;

use crate::services::{CudaDeconvArgs, ExternalCompression, NoopStageOps};

use super::DatasetArgs;

#[derive(Args)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Path to the cudaDeconv executable
    #[arg(long)]
    pub binary: PathBuf,

    /// Process plan file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Comma-separated GPU device indices
    #[arg(long, default_value = "0")]
    pub gpus: String,

    /// Richardson-Lucy iterations (0 = deskew only)
    #[arg(long, default_value = "10")]
    pub iterations: u32,

    /// OTF file, one per processed channel
    #[arg(long)]
    pub otf: Vec<PathBuf>,

    /// Camera background, one per processed channel
    #[arg(long)]
    pub background: Vec<i32>,

    /// Timepoints to process, e.g. "0-9" or "0,4,7" (default: all)
    #[arg(long)]
    pub t_range: Option<String>,

    /// Channels to process, e.g. "0-1" (default: all)
    #[arg(long)]
    pub c_range: Option<String>,

    /// Keep a deskewed copy of the raw data
    #[arg(long)]
    pub save_deskewed_raw: bool,

    /// Merge maximum-intensity projections after processing
    #[arg(long)]
    pub merge_mips: bool,

    /// Registration calibration folder (enables channel registration)
    #[arg(long)]
    pub reg_calib: Option<PathBuf>,

    /// Reference wavelength for registration, in nm
    #[arg(long, default_value = "488")]
    pub reg_wave: u32,

    /// Compress the raw data after processing
    #[arg(long)]
    pub compress_raw: bool,

    /// Write a JSON processing log on success
    #[arg(long)]
    pub write_log: bool,
}

pub fn run(args: &ProcessArgs) -> Result<()> {
    let mut dataset = args.dataset.open()?;

    let plan = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid process plan")?
    } else {
        build_plan_from_args(args)?
    };

    tracing::debug!("effective plan: {plan:?}");
    print_summary(&dataset.path, &plan, &args.binary);

    let deskew = dataset.params.deskew();
    let assembler = CudaDeconvArgs::new(
        args.binary.clone(),
        plan.n_iters,
        deskew,
        plan.save_deskewed_raw,
    );

    let abort = AbortFlag::new();
    let ctrlc_abort = abort.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nabort requested, draining GPU workers...");
        ctrlc_abort.request();
    })
    .context("Failed to install Ctrl-C handler")?;

    let reporter = BarReporter::new();

    let outcome = process_item(
        &mut dataset,
        &plan,
        &assembler,
        &ExternalCompression,
        &NoopStageOps,
        &reporter,
        &abort,
    )?;
    reporter.bar.finish_and_clear();

    match outcome {
        ItemOutcome::Finished => println!("{}", style("Done").green().bold()),
        ItemOutcome::Skipped(reason) => {
            println!("{} {reason}", style("Skipped:").yellow().bold())
        }
        ItemOutcome::Aborted => println!("{}", style("Aborted").red().bold()),
    }

    Ok(())
}

fn build_plan_from_args(args: &ProcessArgs) -> Result<ProcessPlan> {
    let gpus: Vec<u32> = args
        .gpus
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    if gpus.is_empty() {
        bail!("no valid GPU indices in {:?}", args.gpus);
    }

    Ok(ProcessPlan {
        gpus,
        t_range: args.t_range.as_deref().map(parse_range).transpose()?,
        c_range: args.c_range.as_deref().map(parse_range).transpose()?,
        n_iters: args.iterations,
        save_deskewed_raw: args.save_deskewed_raw,
        otfs: args.otf.clone(),
        backgrounds: args.background.clone(),
        registration: args.reg_calib.as_ref().map(|calib| RegistrationConfig {
            ref_wave: args.reg_wave,
            mode: "2step".to_string(),
            calib_path: calib.clone(),
            discard_unregistered: false,
        }),
        merge_mips: args.merge_mips,
        compress_raw: args.compress_raw,
        write_log: args.write_log,
        ..ProcessPlan::default()
    })
}

/// Parse "3-7" into 3..=7 and "0,4,7" into the listed values.
fn parse_range(spec: &str) -> Result<Vec<usize>> {
    if let Some((lo, hi)) = spec.split_once('-') {
        let lo: usize = lo.trim().parse().context("Invalid range start")?;
        let hi: usize = hi.trim().parse().context("Invalid range end")?;
        if hi < lo {
            bail!("range end before start: {spec}");
        }
        return Ok((lo..=hi).collect());
    }
    spec.split(',')
        .map(|s| s.trim().parse().context("Invalid range entry"))
        .collect()
}

fn print_summary(input: &std::path::Path, plan: &ProcessPlan, binary: &std::path::Path) {
    println!();
    println!("  {}", style("Lattice Processing").cyan().bold());
    println!("  {:<14}{}", style("Input").dim(), input.display());
    println!("  {:<14}{}", style("Binary").dim(), binary.display());
    println!(
        "  {:<14}{}",
        style("GPUs").dim(),
        plan.gpus
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  {:<14}{}", style("Iterations").dim(), plan.n_iters);
    if plan.registration.is_some() {
        println!("  {:<14}enabled", style("Registration").dim());
    }
    if plan.merge_mips {
        println!("  {:<14}enabled", style("Merge MIPs").dim());
    }
    println!();
}

struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(1);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:40} [{bar:40}] {pos}/{len} {prefix}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl ItemReporter for BarReporter {
    fn status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn begin_units(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn unit_done(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn eta(&self, remaining: &str) {
        self.bar.set_prefix(format!("ETA {remaining}"));
    }
}
