use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "triad")]
#[command(about = "Plan/implement/review pipeline orchestrator driving an external AI CLI")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// The objective - what you want built (all arguments are joined)
    #[arg(trailing_var_arg = true, required = true)]
    pub objective: Vec<String>,

    /// Working directory the agents operate in (defaults to current directory)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Pipeline config file (defaults to <working_dir>/triad.yaml, then the
    /// built-in config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Approve the plan without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Override every stage timeout, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Disable the on-disk run log
    #[arg(long)]
    pub no_log: bool,
}

impl Cli {
    pub fn objective_text(&self) -> String {
        self.objective.join(" ")
    }
}
