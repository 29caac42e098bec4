//! stlforge CLI - STEP to STL conversion for the glasses parts
//!
//! With no arguments, converts the built-in task table from `assets/step`
//! into `assets/stl`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stlforge::{BatchReport, ConvertConfig, Converter, OnError, StlFormat, Task};
use stlforge_kernel::read_step;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stlforge", version)]
#[command(about = "Convert STEP CAD files to STL meshes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// TOML config with settings and the task table
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the STEP inputs
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory receiving the STL outputs
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Linear deflection in mm
    #[arg(long)]
    linear: Option<f64>,

    /// Angular deflection in radians
    #[arg(long)]
    angular: Option<f64>,

    /// Keep running after a task fails
    #[arg(short, long)]
    keep_going: bool,

    /// Write ASCII STL instead of binary
    #[arg(long)]
    ascii: bool,

    /// Run only tasks with this output stem or input name (repeatable)
    #[arg(long, value_name = "STEM")]
    only: Vec<String>,

    /// Print the task table and exit
    #[arg(long)]
    list: bool,

    /// Write a JSON report of the batch
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the solids of a STEP file with their indices and bounds
    Inspect {
        /// STEP file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Inspect { file }) = &cli.command {
        return inspect(file);
    }

    let config = build_config(&cli)?;
    if cli.list {
        print_tasks(&config);
        return Ok(());
    }

    let converter = Converter::new(config)?;
    print_banner(converter.config());

    let filter = TaskFilter::new(&cli.only, &converter.config().tasks)?;
    let report = converter.run_where(|task| filter.accepts(task))?;

    print_summary(&report);
    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("cannot write report {}", path.display()))?;
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} task(s) failed, {} skipped",
            report.failed.len(),
            report.skipped.len()
        );
    }
    Ok(())
}

/// Config file (or built-in defaults) with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<ConvertConfig> {
    let mut config = match &cli.config {
        Some(path) => ConvertConfig::load(path)?,
        None => ConvertConfig::default(),
    };

    if let Some(dir) = &cli.input_dir {
        config.input_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(linear) = cli.linear {
        config.deflection.linear = linear;
    }
    if let Some(angular) = cli.angular {
        config.deflection.angular = angular;
    }
    if cli.keep_going {
        config.on_error = OnError::Continue;
    }
    if cli.ascii {
        config.format = StlFormat::Ascii;
    }
    tracing::debug!(
        tasks = config.tasks.len(),
        linear = config.deflection.linear,
        angular = config.deflection.angular,
        "configuration ready"
    );
    Ok(config)
}

/// Selects tasks by `--only` names.
struct TaskFilter<'a> {
    names: &'a [String],
}

impl<'a> TaskFilter<'a> {
    /// Reject names that match no task so typos don't silently run nothing.
    fn new(names: &'a [String], tasks: &[Task]) -> Result<Self> {
        let filter = Self { names };
        for name in names {
            if !tasks.iter().any(|t| filter.matches(name, t)) {
                anyhow::bail!("--only {name}: no such task");
            }
        }
        Ok(filter)
    }

    fn matches(&self, name: &str, task: &Task) -> bool {
        let input_stem = task.input.file_stem().map(|s| s.to_string_lossy());
        task.stem() == name
            || task.input == Path::new(name)
            || input_stem.as_deref() == Some(name)
    }

    fn accepts(&self, task: &Task) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| self.matches(n, task))
    }
}

fn print_banner(config: &ConvertConfig) {
    let d = config.deflection;
    println!("stlforge {}", env!("CARGO_PKG_VERSION"));
    println!("  Input:      {}", config.input_dir.display());
    println!("  Output:     {}", config.output_dir.display());
    println!(
        "  Deflection: {} mm linear, {} rad ({:.2}°) angular",
        d.linear,
        d.angular,
        d.angular_degrees()
    );
    println!();
}

fn print_tasks(config: &ConvertConfig) {
    println!("{} task(s):", config.tasks.len());
    for task in &config.tasks {
        let outputs: Vec<String> = task
            .rule
            .labels()
            .into_iter()
            .map(|label| task.output_name(label))
            .collect();
        println!(
            "  {} [{}] -> {}",
            task.input.display(),
            task.rule.describe(),
            outputs.join(", ")
        );
    }
}

fn print_summary(report: &BatchReport) {
    for task in &report.completed {
        println!("{} ({} solids)", task.input.display(), task.solid_count);
        for output in &task.outputs {
            let name = output
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!(
                "  ✓ {}: {} triangles, {:.2} MB{}",
                name,
                output.stats.triangles,
                output.size_mb(),
                if output.repaired { ", repaired" } else { "" }
            );
        }
    }
    for failure in &report.failed {
        println!("✗ {}: {}", failure.input.display(), failure.message);
    }
    for skipped in &report.skipped {
        println!("- {} (skipped)", skipped.display());
    }

    println!();
    println!(
        "Done: {} file(s) written, {} task(s) failed",
        report.output_count(),
        report.failed.len()
    );
}

fn inspect(file: &Path) -> Result<()> {
    let doc = read_step(file)?;
    let bb = doc.bounds();

    println!("STEP file: {}", file.display());
    println!("  Solids: {}", doc.len());
    println!(
        "  Bounds: [{:.3}, {:.3}, {:.3}] - [{:.3}, {:.3}, {:.3}]",
        bb.min.x, bb.min.y, bb.min.z, bb.max.x, bb.max.y, bb.max.z
    );
    println!();
    for solid in doc.solids() {
        let c = solid.bounds.center();
        let s = solid.bounds.size();
        let voids = match solid.voids.len() {
            0 => String::new(),
            n => format!("  {n} void(s)"),
        };
        println!(
            "  {:>3}  #{:<8} centre ({:.3}, {:.3}, {:.3})  size {:.3} x {:.3} x {:.3}{}",
            solid.index, solid.entity_id, c.x, c.y, c.z, s.x, s.y, s.z, voids
        );
    }
    Ok(())
}
