use regex::Regex;
use std::sync::OnceLock;

// Taskcluster slug ids are 22 characters of URL-safe base64.
static TASK_URL_RE: OnceLock<Regex> = OnceLock::new();
static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn task_url_re() -> &'static Regex {
    TASK_URL_RE.get_or_init(|| {
        Regex::new(r"https?://[^/]+/(?:tasks|task-group)/([A-Za-z0-9_-]{22})").unwrap()
    })
}

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{22}$").unwrap())
}

/// Pull the task id out of a Taskcluster task or task-group URL.
/// Anything else is returned trimmed but otherwise untouched; whether it
/// names a real task is for Taskcluster to decide.
pub fn extract_task_id(input: &str) -> String {
    let input = input.trim();
    task_url_re()
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| input.to_string())
}

pub fn is_slug_id(s: &str) -> bool {
    slug_re().is_match(s)
}
