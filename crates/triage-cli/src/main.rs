mod cmd;
mod output;

use clap::Parser;
use cmd::triage::{Overrides, TriageArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sheriff-triage",
    about = "Determine the likely cause of a CI task failure from Taskcluster and Treeherder signals",
    version
)]
struct Cli {
    /// Task id or Taskcluster task URL
    task: String,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Skip the cross-branch Treeherder search
    #[arg(long)]
    skip_treeherder: bool,

    /// Taskcluster root URL
    #[arg(long, env = "TASKCLUSTER_ROOT_URL")]
    root_url: Option<String>,

    /// Treeherder base URL
    #[arg(long, env = "TREEHERDER_URL")]
    treeherder_url: Option<String>,

    /// Config file (default: ~/.config/sheriff-triage/config.yaml if present)
    #[arg(long, env = "SHERIFF_TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Recent pushes inspected per branch
    #[arg(long, value_name = "N")]
    push_limit: Option<u32>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = TriageArgs {
        task: cli.task,
        json: cli.json,
        skip_treeherder: cli.skip_treeherder,
        config: cli.config,
        overrides: Overrides {
            root_url: cli.root_url,
            treeherder_url: cli.treeherder_url,
            timeout_seconds: cli.timeout,
            push_limit: cli.push_limit,
        },
    };

    if let Err(e) = cmd::triage::run(args) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
