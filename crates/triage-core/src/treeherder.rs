//! Read-only client for the Treeherder project API.

use crate::error::{Result, TriageError};
use crate::http::HttpClient;
use crate::types::HumanClassification;
use serde::Deserialize;
use tracing::{debug, warn};

pub const SERVICE: &str = "treeherder";

/// Job results that count as a failure of the same kind.
const FAILING_RESULTS: &[&str] = &["testfailed", "busted"];

/// How many example links per branch are kept for the report.
const MAX_EXAMPLES: usize = 3;

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Push {
    pub id: u64,
    #[serde(default)]
    pub revision: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: u64,
    #[serde(default)]
    pub job_type_name: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub failure_classification_id: Option<u32>,
}

impl Job {
    pub fn is_failure(&self) -> bool {
        FAILING_RESULTS.contains(&self.result.as_str())
    }

    /// Case-insensitive substring match on the job type name.
    pub fn matches_name(&self, job_name: &str) -> bool {
        self.job_type_name
            .to_lowercase()
            .contains(&job_name.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Matching failures found on one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailures {
    pub branch: String,
    pub count: u32,
    /// Up to a handful of Treeherder links to matching jobs.
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationHit {
    pub classification: HumanClassification,
    pub classification_id: u32,
    pub repo: String,
    pub job_id: u64,
}

// ---------------------------------------------------------------------------
// TreeherderClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TreeherderClient {
    http: HttpClient,
    base_url: String,
}

impl TreeherderClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn job_url(&self, repo: &str, revision: &str, job_id: u64) -> String {
        format!(
            "{}/jobs?repo={repo}&revision={revision}&selectedJobId={job_id}",
            self.base_url
        )
    }

    fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        repo: &str,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let url = format!("{}/api/project/{repo}/{endpoint}/", self.base_url);
        let page: Option<Page<T>> = self.http.get_json(SERVICE, &url, query)?;
        page.map(|p| p.results).ok_or_else(|| TriageError::SignalFetchError {
            service: SERVICE.to_string(),
            message: format!("unknown repository '{repo}'"),
        })
    }

    pub fn pushes(&self, repo: &str, count: u32) -> Result<Vec<Push>> {
        self.get_page(repo, "push", &[("count", count.to_string())])
    }

    pub fn jobs_for_push(&self, repo: &str, push_id: u64) -> Result<Vec<Job>> {
        self.get_page(repo, "jobs", &[("push_id", push_id.to_string())])
    }

    pub fn jobs_for_task(&self, repo: &str, task_id: &str) -> Result<Vec<Job>> {
        self.get_page(repo, "jobs", &[("task_id", task_id.to_string())])
    }

    /// Count failing jobs named like `job_name` across the latest
    /// `push_limit` pushes of `branch`. Any failed request fails the whole
    /// branch: a partial count would understate the evidence.
    pub fn count_failures(
        &self,
        branch: &str,
        job_name: &str,
        push_limit: u32,
    ) -> Result<BranchFailures> {
        let pushes = self.pushes(branch, push_limit)?;
        let mut count = 0u32;
        let mut examples = Vec::new();

        for push in &pushes {
            let jobs = self.jobs_for_push(branch, push.id)?;
            for job in jobs.iter().filter(|j| j.is_failure() && j.matches_name(job_name)) {
                count += 1;
                if examples.len() < MAX_EXAMPLES {
                    examples.push(self.job_url(branch, &push.revision, job.id));
                }
            }
        }

        debug!(branch, job_name, pushes = pushes.len(), count, "cross-branch search");
        Ok(BranchFailures {
            branch: branch.to_string(),
            count,
            examples,
        })
    }

    /// Find the sheriff classification of the job backing `task_id`,
    /// trying `repos` in order. `Ok(None)` means no repo knows the task.
    pub fn classification(
        &self,
        task_id: &str,
        repos: &[String],
    ) -> Result<Option<ClassificationHit>> {
        let mut last_err = None;

        for repo in repos {
            let jobs = match self.jobs_for_task(repo, task_id) {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(repo = repo.as_str(), "classification lookup failed: {e}");
                    last_err = Some(e);
                    continue;
                }
            };
            let Some(job) = jobs.first() else {
                continue;
            };

            let id = job.failure_classification_id.unwrap_or(1);
            let classification = HumanClassification::from_treeherder_id(id).ok_or_else(|| {
                TriageError::MalformedResponse {
                    service: SERVICE.to_string(),
                    message: format!("unknown failure classification id {id}"),
                }
            })?;
            return Ok(Some(ClassificationHit {
                classification,
                classification_id: id,
                repo: repo.clone(),
                job_id: job.id,
            }));
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
