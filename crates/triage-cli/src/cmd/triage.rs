use crate::output::progress;
use anyhow::Context;
use std::path::PathBuf;
use tracing::warn;
use triage_core::{
    classifier::determine_verdict,
    collector::{CollectOptions, SignalCollector, Step},
    config::Config,
    report::Report,
    task_id::{extract_task_id, is_slug_id},
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Values given on the command line or through the environment. They win
/// over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub root_url: Option<String>,
    pub treeherder_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub push_limit: Option<u32>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.root_url {
            config.taskcluster.root_url = url;
        }
        if let Some(url) = self.treeherder_url {
            config.treeherder.url = url;
        }
        if let Some(secs) = self.timeout_seconds {
            config.http.timeout_seconds = secs;
        }
        if let Some(n) = self.push_limit {
            config.treeherder.push_limit = n;
        }
    }
}

pub struct TriageArgs {
    pub task: String,
    pub json: bool,
    pub skip_treeherder: bool,
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(args: TriageArgs) -> anyhow::Result<()> {
    let mut config =
        Config::load_or_default(args.config.as_deref()).context("failed to load config")?;
    args.overrides.apply(&mut config);
    for w in config.ensure_valid().context("invalid configuration")? {
        warn!("config: {}", w.message);
    }

    let task_id = extract_task_id(&args.task);
    if task_id.is_empty() {
        anyhow::bail!("no task id given");
    }
    if !is_slug_id(&task_id) {
        warn!(task_id = task_id.as_str(), "input does not look like a task id, trying anyway");
    }

    let json = args.json;
    let report_progress = |step: Step| {
        if !json {
            progress(step);
        }
    };

    let collector = SignalCollector::new(&config).context("failed to set up HTTP client")?;
    if !json {
        progress(format!("Triaging task: {task_id}"));
        progress("");
    }
    let collection = collector
        .collect(
            &task_id,
            CollectOptions {
                skip_treeherder: args.skip_treeherder,
            },
            &report_progress,
        )
        .with_context(|| format!("cannot triage task '{task_id}'"))?;

    report_progress(Step::Verdict);
    let verdict = determine_verdict(&collection.signals);
    let report = Report::build(&collection.context, &collection.signals, &verdict);

    if json {
        println!("{}", report.to_json().context("failed to render report")?);
    } else {
        // Blank line separates the report from the progress lines.
        progress("");
        print!("{}", report.to_markdown());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
