//! Read-only client for the Taskcluster queue and worker-manager APIs.

use crate::error::{Result, TriageError};
use crate::http::HttpClient;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

pub const SERVICE: &str = "taskcluster";

static SBOM_VERSION_RE: OnceLock<Regex> = OnceLock::new();

fn sbom_version_re() -> &'static Regex {
    SBOM_VERSION_RE.get_or_init(|| Regex::new(r"-(\d+\.\d+\.\d+)\.md$").unwrap())
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(default)]
    pub provisioner_id: Option<String>,
    #[serde(default)]
    pub worker_type: Option<String>,
    #[serde(default)]
    pub task_queue_id: Option<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskMetadata {
    #[serde(default)]
    pub name: String,
}

impl TaskDefinition {
    /// `provisionerId/workerType`, falling back to `taskQueueId`. A
    /// definition with neither is not a task.
    pub fn worker_pool(&self) -> Result<String> {
        match (&self.provisioner_id, &self.worker_type, &self.task_queue_id) {
            (Some(p), Some(w), _) if !p.is_empty() && !w.is_empty() => Ok(format!("{p}/{w}")),
            (_, _, Some(q)) if !q.is_empty() => Ok(q.clone()),
            _ => Err(TriageError::MalformedResponse {
                service: SERVICE.to_string(),
                message: "task definition names no worker pool".to_string(),
            }),
        }
    }

    /// `metadata.name`, if the task has one.
    pub fn label(&self) -> Option<&str> {
        let name = self.metadata.name.trim();
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TaskStatusResponse {
    status: TaskStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub state: String,
    #[serde(default)]
    pub runs: Vec<TaskRun>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub run_id: u32,
    pub state: String,
    #[serde(default)]
    pub worker_group: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub resolved: Option<DateTime<Utc>>,
}

impl TaskStatus {
    pub fn last_run(&self) -> Option<&TaskRun> {
        self.runs.last()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPool {
    pub worker_pool_id: String,
    #[serde(default)]
    pub config: WorkerPoolConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolConfig {
    #[serde(default)]
    pub launch_configs: Vec<LaunchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    #[serde(default)]
    pub worker_config: Option<WorkerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    #[serde(default)]
    pub generic_worker: Option<GenericWorker>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericWorker {
    #[serde(default)]
    pub config: Option<GenericWorkerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericWorkerConfig {
    #[serde(default)]
    pub worker_type_meta_data: Option<WorkerTypeMetaData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerTypeMetaData {
    #[serde(default)]
    pub sbom: Option<String>,
}

impl WorkerPool {
    /// SBOM URL of the first launch config that advertises one.
    pub fn sbom_url(&self) -> Option<&str> {
        self.config.launch_configs.iter().find_map(|lc| {
            lc.worker_config
                .as_ref()?
                .generic_worker
                .as_ref()?
                .config
                .as_ref()?
                .worker_type_meta_data
                .as_ref()?
                .sbom
                .as_deref()
                .filter(|s| !s.is_empty())
        })
    }
}

/// The image version is encoded in the SBOM file name, e.g.
/// `.../win11-64-24h2-1.0.9.md` → `1.0.9`.
pub fn image_version_from_sbom(url: &str) -> Option<String> {
    sbom_version_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Image facts for one worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolImage {
    pub worker_pool: String,
    pub sbom_url: String,
    pub image_version: String,
}

// ---------------------------------------------------------------------------
// TaskclusterClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TaskclusterClient {
    http: HttpClient,
    root_url: String,
}

impl TaskclusterClient {
    pub fn new(http: HttpClient, root_url: &str) -> Self {
        Self {
            http,
            root_url: root_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn task_url(&self, task_id: &str) -> String {
        self.api_url(&["tasks", task_id])
            .unwrap_or_else(|_| format!("{}/tasks/{task_id}", self.root_url))
    }

    /// Join path segments onto the root URL, percent-encoding each one so
    /// user input cannot reach a different endpoint.
    fn api_url(&self, segments: &[&str]) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.root_url).map_err(|e| {
            TriageError::Config(format!("invalid Taskcluster root URL '{}': {e}", self.root_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                TriageError::Config(format!("invalid Taskcluster root URL '{}'", self.root_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// Fetch the task definition. Fails with `TaskNotFound` on 404 and with
    /// `MalformedResponse` if the body does not describe a task.
    pub fn task(&self, task_id: &str) -> Result<TaskDefinition> {
        let url = self.api_url(&["api", "queue", "v1", "task", task_id])?;
        let definition: TaskDefinition = self
            .http
            .get_json(SERVICE, &url, &[])?
            .ok_or_else(|| TriageError::TaskNotFound(task_id.to_string()))?;
        definition.worker_pool()?;
        Ok(definition)
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatus> {
        let url = self.api_url(&["api", "queue", "v1", "task", task_id, "status"])?;
        self.http
            .get_json::<TaskStatusResponse>(SERVICE, &url, &[])?
            .map(|r| r.status)
            .ok_or_else(|| TriageError::SignalFetchError {
                service: SERVICE.to_string(),
                message: format!("no status for task {task_id}"),
            })
    }

    pub fn worker_pool(&self, worker_pool_id: &str) -> Result<WorkerPool> {
        let Some((provisioner, worker_type)) = worker_pool_id.split_once('/') else {
            return Err(TriageError::MalformedResponse {
                service: SERVICE.to_string(),
                message: format!("invalid worker pool id '{worker_pool_id}'"),
            });
        };
        let url = self.api_url(&[
            "api",
            "worker-manager",
            "v1",
            "worker-pool",
            provisioner,
            worker_type,
        ])?;
        self.http
            .get_json(SERVICE, &url, &[])?
            .ok_or_else(|| TriageError::SignalFetchError {
                service: SERVICE.to_string(),
                message: format!("worker pool {worker_pool_id} not found"),
            })
    }

    /// Resolve the image version a worker pool is currently launching.
    pub fn pool_image(&self, worker_pool_id: &str) -> Result<PoolImage> {
        if worker_pool_id.split('/').count() != 2 {
            return Err(TriageError::MalformedResponse {
                service: SERVICE.to_string(),
                message: format!("invalid worker pool id '{worker_pool_id}'"),
            });
        }
        let pool = self.worker_pool(worker_pool_id)?;
        let no_version = |what: &str| TriageError::MalformedResponse {
            service: SERVICE.to_string(),
            message: format!("worker pool {worker_pool_id}: {what}"),
        };
        let sbom_url = pool.sbom_url().ok_or_else(|| no_version("no SBOM advertised"))?;
        let image_version = image_version_from_sbom(sbom_url)
            .ok_or_else(|| no_version("no image version in SBOM URL"))?;
        Ok(PoolImage {
            worker_pool: worker_pool_id.to_string(),
            sbom_url: sbom_url.to_string(),
            image_version,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    const ID: &str = "Xcac5C8gRqiOT13YsVRX8A";

    fn client(server: &mockito::Server) -> TaskclusterClient {
        let http = HttpClient::new(&HttpConfig {
            timeout_seconds: 5,
            max_attempts: 1,
            backoff_ms: 0,
        })
        .unwrap();
        TaskclusterClient::new(http, &format!("{}/", server.url()))
    }

    fn pool_body(sbom: &str) -> String {
        serde_json::json!({
            "workerPoolId": "gecko-t/win11-64-24h2-alpha",
            "config": {
                "launchConfigs": [
                    { "workerConfig": {} },
                    { "workerConfig": { "genericWorker": { "config": {
                        "workerTypeMetaData": { "sbom": sbom }
                    }}}}
                ]
            }
        })
        .to_string()
    }

    #[test]
    fn version_from_sbom_url() {
        assert_eq!(
            image_version_from_sbom("https://example.com/sbom/win11-64-24h2-1.0.9.md"),
            Some("1.0.9".to_string())
        );
        assert_eq!(image_version_from_sbom("https://example.com/sbom/latest.md"), None);
    }

    #[test]
    fn worker_pool_prefers_provisioner_pair() {
        let def: TaskDefinition = serde_json::from_str(
            r#"{"provisionerId":"gecko-t","workerType":"t-linux","taskQueueId":"x/y","metadata":{"name":"a/b"}}"#,
        )
        .unwrap();
        assert_eq!(def.worker_pool().unwrap(), "gecko-t/t-linux");
        assert_eq!(def.label(), Some("a/b"));

        let queue_only: TaskDefinition =
            serde_json::from_str(r#"{"taskQueueId":"gecko-t/t-win"}"#).unwrap();
        assert_eq!(queue_only.worker_pool().unwrap(), "gecko-t/t-win");
        assert_eq!(queue_only.label(), None);
    }

    #[test]
    fn definition_without_pool_is_malformed() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", format!("/api/queue/v1/task/{ID}").as_str())
            .with_body(r#"{"status":{"state":"failed","runs":[]}}"#)
            .create();
        let err = client(&server).task(ID).unwrap_err();
        assert!(matches!(err, TriageError::MalformedResponse { .. }));
    }

    #[test]
    fn task_id_is_a_single_path_segment() {
        let mut server = mockito::Server::new();
        let status = server
            .mock("GET", format!("/api/queue/v1/task/{ID}/status").as_str())
            .with_body(r#"{"status":{"state":"failed","runs":[]}}"#)
            .expect(0)
            .create();
        let escaped = server
            .mock("GET", format!("/api/queue/v1/task/{ID}%2Fstatus").as_str())
            .with_status(404)
            .create();

        let err = client(&server).task(&format!("{ID}/status")).unwrap_err();
        assert!(matches!(err, TriageError::TaskNotFound(_)));
        status.assert();
        escaped.assert();
    }

    #[test]
    fn task_url_escapes_input() {
        let http = HttpClient::new(&HttpConfig::default()).unwrap();
        let tc = TaskclusterClient::new(http, "https://tc.example/");
        assert_eq!(tc.task_url(ID), format!("https://tc.example/tasks/{ID}"));
        assert_eq!(tc.task_url("a b"), "https://tc.example/tasks/a%20b");
    }

    #[test]
    fn task_404_is_task_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", format!("/api/queue/v1/task/{ID}").as_str())
            .with_status(404)
            .create();
        let err = client(&server).task(ID).unwrap_err();
        assert!(matches!(err, TriageError::TaskNotFound(id) if id == ID));
    }

    #[test]
    fn status_parses_runs() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", format!("/api/queue/v1/task/{ID}/status").as_str())
            .with_status(200)
            .with_body(
                r#"{"status":{"taskId":"x","state":"failed","runs":[
                    {"runId":0,"state":"failed","workerGroup":"westus","workerId":"vm-1",
                     "resolved":"2026-03-01T10:00:00.000Z"}]}}"#,
            )
            .create();
        let status = client(&server).status(ID).unwrap();
        assert_eq!(status.state, "failed");
        let run = status.last_run().unwrap();
        assert_eq!(run.worker_id.as_deref(), Some("vm-1"));
        assert!(run.resolved.is_some());
    }

    #[test]
    fn pool_image_reads_first_sbom() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/worker-manager/v1/worker-pool/gecko-t/win11-64-24h2-alpha")
            .with_status(200)
            .with_body(pool_body("https://example.com/win11-64-24h2-alpha-1.0.9.md"))
            .create();
        let image = client(&server)
            .pool_image("gecko-t/win11-64-24h2-alpha")
            .unwrap();
        assert_eq!(image.image_version, "1.0.9");
        assert!(image.sbom_url.ends_with("1.0.9.md"));
    }

    #[test]
    fn pool_without_sbom_is_malformed() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/api/worker-manager/v1/worker-pool/gecko-t/bare")
            .with_status(200)
            .with_body(r#"{"workerPoolId":"gecko-t/bare","config":{}}"#)
            .create();
        let err = client(&server).pool_image("gecko-t/bare").unwrap_err();
        assert!(matches!(err, TriageError::MalformedResponse { .. }));
    }

    #[test]
    fn pool_id_must_have_two_parts() {
        let server = mockito::Server::new();
        assert!(client(&server).pool_image("no-slash").is_err());
    }
}
