use crate::config::Config;
use crate::error::Result;
use crate::http::HttpClient;
use crate::taskcluster::TaskclusterClient;
use crate::treeherder::{BranchFailures, ClassificationHit, TreeherderClient};
use crate::types::{Signal, SignalTuple};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Progress steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    TaskInfo,
    ImageVersions,
    CrossBranch { skipped: bool },
    Classification,
    Verdict,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::TaskInfo => f.write_str("[1/5] Getting task info..."),
            Step::ImageVersions => f.write_str("[2/5] Comparing image versions..."),
            Step::CrossBranch { skipped: false } => {
                f.write_str("[3/5] Searching for similar failures...")
            }
            Step::CrossBranch { skipped: true } => {
                f.write_str("[3/5] Skipping Treeherder search...")
            }
            Step::Classification => f.write_str("[4/5] Checking Treeherder classification..."),
            Step::Verdict => f.write_str("[5/5] Determining verdict..."),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskContext
// ---------------------------------------------------------------------------

/// Facts about the task that the report shows but the rules never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub task_id: String,
    pub task_label: String,
    /// Job-type name used for the cross-branch search. `None` when the label
    /// gives nothing to search for.
    pub job_name: Option<String>,
    pub state: String,
    pub worker_pool: String,
    /// Production counterpart, only set for alpha pools.
    pub production_pool: Option<String>,
    pub worker_group: Option<String>,
    pub worker_id: Option<String>,
    pub resolved: Option<DateTime<Utc>>,
    pub taskcluster_url: String,
    pub sbom_url: Option<String>,
    pub production_sbom_url: Option<String>,
    pub classification_repo: Option<String>,
    pub classification_url: Option<String>,
    /// A few Treeherder links per branch to matching failures.
    pub similar_failures: BTreeMap<String, Vec<String>>,
}

/// Everything a triage run gathered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub context: TaskContext,
    pub signals: SignalTuple,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    pub skip_treeherder: bool,
}

/// Last `/` segment of a task label, e.g.
/// `test-linux1804-64/opt-xpcshell-3` → `opt-xpcshell-3`. An empty segment
/// would match every job, so it yields `None`.
pub fn job_name_from_label(label: &str) -> Option<&str> {
    label
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

// ---------------------------------------------------------------------------
// SignalCollector
// ---------------------------------------------------------------------------

pub struct SignalCollector<'a> {
    config: &'a Config,
    taskcluster: TaskclusterClient,
    treeherder: TreeherderClient,
}

impl<'a> SignalCollector<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let http = HttpClient::new(&config.http)?;
        Ok(Self {
            config,
            taskcluster: TaskclusterClient::new(http.clone(), &config.taskcluster.root_url),
            treeherder: TreeherderClient::new(http, &config.treeherder.url),
        })
    }

    /// Gather the signal tuple for `task_id`.
    ///
    /// Only the task definition is mandatory: if Taskcluster cannot produce
    /// it the run fails. Every other fetch degrades to `Signal::Unknown`.
    pub fn collect(
        &self,
        task_id: &str,
        opts: CollectOptions,
        progress: &dyn Fn(Step),
    ) -> Result<Collection> {
        progress(Step::TaskInfo);
        let definition = self.taskcluster.task(task_id)?;
        let status = self.taskcluster.status(task_id).map_err(|e| {
            warn!("task status unavailable: {e}");
            e
        });
        let last_run = status.as_ref().ok().and_then(|s| s.last_run()).cloned();

        let worker_pool = definition.worker_pool()?;
        let is_alpha_pool = self.config.is_alpha_pool(&worker_pool);
        let production_pool = self.config.production_pool(&worker_pool).to_string();
        let job_name = definition
            .label()
            .and_then(job_name_from_label)
            .map(str::to_string);
        let task_label = definition.label().unwrap_or("unknown").to_string();

        // Each step is announced as its fetch starts; the three run together.
        let (images, branches, classification) = std::thread::scope(|s| {
            progress(Step::ImageVersions);
            let images = s.spawn(|| self.images(&worker_pool, is_alpha_pool, &production_pool));
            progress(Step::CrossBranch {
                skipped: opts.skip_treeherder,
            });
            let branches =
                s.spawn(|| self.cross_branch(job_name.as_deref(), opts.skip_treeherder));
            progress(Step::Classification);
            let classification = self.classification(task_id);
            (
                images.join().unwrap_or_else(|_| ImageSignals::lost()),
                branches.join().unwrap_or_else(|_| self.lost_branches()),
                classification,
            )
        });

        let mut similar_failures = BTreeMap::new();
        let mut cross_branch_failure_count = BTreeMap::new();
        for (branch, found) in branches {
            let signal = match found {
                Signal::Known(f) => {
                    if !f.examples.is_empty() {
                        similar_failures.insert(branch.clone(), f.examples);
                    }
                    Signal::Known(f.count)
                }
                Signal::Unknown(reason) => Signal::Unknown(reason),
            };
            cross_branch_failure_count.insert(branch, signal);
        }

        let (human_classification, classification_repo, classification_url) = match classification {
            Signal::Known(Some(hit)) => (
                Signal::Known(hit.classification),
                Some(hit.repo.clone()),
                Some(self.classification_url(&hit)),
            ),
            Signal::Known(None) => (Signal::unknown("no Treeherder job found"), None, None),
            Signal::Unknown(reason) => (Signal::Unknown(reason), None, None),
        };

        let signals = SignalTuple {
            is_alpha_pool,
            image_version_current: images.current,
            image_version_baseline: images.baseline,
            cross_branch_failure_count,
            human_classification,
        };

        let context = TaskContext {
            task_id: task_id.to_string(),
            task_label,
            job_name,
            state: status
                .map(|s| s.state)
                .unwrap_or_else(|_| "unknown".to_string()),
            worker_pool,
            production_pool: is_alpha_pool.then_some(production_pool),
            worker_group: last_run.as_ref().and_then(|r| r.worker_group.clone()),
            worker_id: last_run.as_ref().and_then(|r| r.worker_id.clone()),
            resolved: last_run.as_ref().and_then(|r| r.resolved),
            taskcluster_url: self.taskcluster.task_url(task_id),
            sbom_url: images.sbom_url,
            production_sbom_url: images.production_sbom_url,
            classification_repo,
            classification_url,
            similar_failures,
        };

        info!(
            task_id,
            pool = context.worker_pool.as_str(),
            alpha = is_alpha_pool,
            "signals collected"
        );
        Ok(Collection { context, signals })
    }

    fn images(&self, worker_pool: &str, is_alpha: bool, production_pool: &str) -> ImageSignals {
        let (current, sbom_url) = self.pool_image(worker_pool);
        if !is_alpha {
            // A production pool is its own baseline.
            return ImageSignals {
                baseline: current.clone(),
                current,
                sbom_url,
                production_sbom_url: None,
            };
        }
        let (baseline, production_sbom_url) = self.pool_image(production_pool);
        ImageSignals {
            current,
            baseline,
            sbom_url,
            production_sbom_url,
        }
    }

    fn pool_image(&self, pool: &str) -> (Signal<String>, Option<String>) {
        match self.taskcluster.pool_image(pool) {
            Ok(image) => (Signal::Known(image.image_version), Some(image.sbom_url)),
            Err(e) => {
                warn!(pool, "image version unavailable: {e}");
                (Signal::Unknown(e.to_string()), None)
            }
        }
    }

    fn cross_branch(
        &self,
        job_name: Option<&str>,
        skip: bool,
    ) -> Vec<(String, Signal<BranchFailures>)> {
        let cfg = &self.config.treeherder;
        cfg.production_branches
            .iter()
            .map(|branch| {
                if skip {
                    return (branch.clone(), Signal::unknown("skipped"));
                }
                let Some(job_name) = job_name else {
                    return (branch.clone(), Signal::unknown("no job name"));
                };
                let found = self.treeherder.count_failures(branch, job_name, cfg.push_limit);
                if let Err(e) = &found {
                    warn!(branch = branch.as_str(), "cross-branch search unavailable: {e}");
                }
                (branch.clone(), Signal::from(found))
            })
            .collect()
    }

    fn lost_branches(&self) -> Vec<(String, Signal<BranchFailures>)> {
        self.config
            .treeherder
            .production_branches
            .iter()
            .map(|b| (b.clone(), Signal::unknown("search thread panicked")))
            .collect()
    }

    fn classification(&self, task_id: &str) -> Signal<Option<ClassificationHit>> {
        let found = self
            .treeherder
            .classification(task_id, &self.config.treeherder.classification_repos);
        if let Err(e) = &found {
            warn!("classification unavailable: {e}");
        }
        Signal::from(found)
    }

    fn classification_url(&self, hit: &ClassificationHit) -> String {
        format!(
            "{}/jobs?repo={}&selectedJobId={}",
            self.config.treeherder.url.trim_end_matches('/'),
            hit.repo,
            hit.job_id
        )
    }
}

struct ImageSignals {
    current: Signal<String>,
    baseline: Signal<String>,
    sbom_url: Option<String>,
    production_sbom_url: Option<String>,
}

impl ImageSignals {
    fn lost() -> Self {
        Self {
            current: Signal::unknown("image lookup thread panicked"),
            baseline: Signal::unknown("image lookup thread panicked"),
            sbom_url: None,
            production_sbom_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
