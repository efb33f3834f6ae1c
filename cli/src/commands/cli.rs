use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "imgbatch",
    version,
    about = "Resumable batch processing for imaging datasets"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file. Defaults to ~/.imgbatch/config.toml, then ./imgbatch.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Pipeline to run; repeatable. All pipelines, in config order, when omitted.
    #[arg(long = "pipeline", action = clap::ArgAction::Append)]
    pub pipelines: Vec<String>,

    /// Group id relative to the input root (e.g. `sub-01/MPRAGE`); repeatable.
    /// Groups are discovered when omitted.
    #[arg(long = "group", action = clap::ArgAction::Append)]
    pub groups: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Override `max_workers` of every selected pipeline.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Override the per-item deadline of every selected pipeline.
    #[arg(long)]
    pub item_timeout_secs: Option<u64>,

    /// text | jsonl
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Show progress bars (text format on a terminal only).
    #[arg(long)]
    pub progress: bool,

    #[arg(long)]
    pub ascii: bool,

    /// Append JSONL events to this file (or `stdout:`).
    #[arg(long)]
    pub events_out: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// text | jsonl
    #[arg(long, default_value = "text")]
    pub format: String,

    /// List every pending input.
    #[arg(long)]
    pub verbose: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InitArgs {
    /// Where to write the sample config. Defaults to ~/.imgbatch/config.toml.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every item whose output does not exist yet.
    Run(RunArgs),
    /// Show the residual work per group without running anything.
    Plan(PlanArgs),
    /// Write a sample configuration.
    Init(InitArgs),
}
