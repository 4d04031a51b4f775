use crate::classifier::VerdictResult;
use crate::collector::TaskContext;
use crate::error::Result;
use crate::types::{Confidence, Signal, SignalTuple, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One line of the signal table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRow {
    pub name: String,
    pub value: String,
    pub implication: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// A rendered triage outcome. Building and rendering are pure: the same
/// inputs always give byte-identical output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub task_id: String,
    pub task_label: String,
    pub state: String,
    pub worker_pool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_pool: Option<String>,
    pub verdict: Verdict,
    pub confidence: Confidence,
    pub rationale: String,
    pub rule: String,
    pub signals: Vec<SignalRow>,
    /// The tuple the verdict was computed from, unflattened.
    pub raw_signals: SignalTuple,
    pub recommended_actions: Vec<String>,
    pub links: Vec<Link>,
    /// Task facts shown in the report header (worker, resolved time,
    /// classification repo).
    pub context: TaskContext,
}

impl Report {
    pub fn build(context: &TaskContext, signals: &SignalTuple, result: &VerdictResult) -> Self {
        Self {
            task_id: context.task_id.clone(),
            task_label: context.task_label.clone(),
            state: context.state.clone(),
            worker_pool: context.worker_pool.clone(),
            production_pool: context.production_pool.clone(),
            verdict: result.verdict,
            confidence: result.confidence,
            rationale: result.rationale.clone(),
            rule: result.rule.clone(),
            signals: signal_rows(signals),
            raw_signals: signals.clone(),
            recommended_actions: result
                .verdict
                .recommended_actions()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            links: links(context),
            context: context.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_markdown(&mut out);
        out
    }

    fn write_markdown(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "## Triage Report: {}", self.task_id)?;
        writeln!(out)?;
        writeln!(out, "**Test**: {}", self.task_label)?;
        writeln!(out, "**Status**: {}", self.state)?;
        writeln!(out, "**Worker Pool**: {}", self.worker_pool)?;
        if let Some(pool) = &self.production_pool {
            writeln!(out, "**Production Pool**: {pool}")?;
        }
        if let Some(worker) = worker_label(&self.context) {
            writeln!(out, "**Worker**: {worker}")?;
        }
        if let Some(resolved) = self.context.resolved {
            writeln!(out, "**Resolved**: {}", resolved.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        if let Some(repo) = &self.context.classification_repo {
            writeln!(out, "**Classified In**: {repo}")?;
        }
        writeln!(out)?;

        writeln!(out, "### Signals")?;
        writeln!(out)?;
        writeln!(out, "| Signal | Value | Implication |")?;
        writeln!(out, "|--------|-------|-------------|")?;
        for row in &self.signals {
            writeln!(
                out,
                "| {} | {} | {} |",
                cell(&row.name),
                cell(&row.value),
                cell(&row.implication)
            )?;
        }
        writeln!(out)?;

        writeln!(out, "### Verdict: **{}**", self.verdict)?;
        writeln!(out)?;
        writeln!(out, "_{}_", self.verdict.description())?;
        writeln!(out)?;
        writeln!(out, "**Confidence**: {}", capitalize(self.confidence.as_str()))?;
        writeln!(out, "**Rationale**: {}", self.rationale)?;
        writeln!(out)?;

        writeln!(out, "### Recommended Actions")?;
        writeln!(out)?;
        for (i, action) in self.recommended_actions.iter().enumerate() {
            writeln!(out, "{}. {action}", i + 1)?;
        }

        if !self.links.is_empty() {
            writeln!(out)?;
            writeln!(out, "### Links")?;
            writeln!(out)?;
            for link in &self.links {
                writeln!(out, "- **{}**: {}", link.label, link.url)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signal table
// ---------------------------------------------------------------------------

fn unavailable(reason: &str) -> String {
    format!("unavailable ({reason})")
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

fn signal_rows(s: &SignalTuple) -> Vec<SignalRow> {
    let mut rows = vec![SignalRow {
        name: "Alpha Pool".to_string(),
        value: yes_no(s.is_alpha_pool).to_string(),
        implication: if s.is_alpha_pool {
            "Using new/staging image"
        } else {
            "Production pool"
        }
        .to_string(),
        available: true,
    }];

    rows.push(match &s.image_version_current {
        Signal::Known(v) => SignalRow {
            name: "Image Version".to_string(),
            value: v.clone(),
            implication: if s.is_alpha_pool {
                "Image under validation"
            } else {
                "Production image"
            }
            .to_string(),
            available: true,
        },
        Signal::Unknown(reason) => SignalRow {
            name: "Image Version".to_string(),
            value: unavailable(reason),
            implication: "Cannot compare images".to_string(),
            available: false,
        },
    });

    if s.is_alpha_pool {
        rows.push(match (s.image_version_differs(), &s.image_version_baseline) {
            (Some(differs), Signal::Known(baseline)) => SignalRow {
                name: "Image Version Differs".to_string(),
                value: format!(
                    "{} ({} vs {baseline})",
                    yes_no(differs),
                    s.image_version_current.known().map(String::as_str).unwrap_or("?"),
                ),
                implication: if differs {
                    "Image change detected"
                } else {
                    "Same image"
                }
                .to_string(),
                available: true,
            },
            (_, baseline) => SignalRow {
                name: "Image Version Differs".to_string(),
                value: unavailable(
                    baseline
                        .unknown_reason()
                        .or(s.image_version_current.unknown_reason())
                        .unwrap_or("unknown"),
                ),
                implication: "Cannot compare images".to_string(),
                available: false,
            },
        });
    }

    for (branch, count) in &s.cross_branch_failure_count {
        let name = format!("Similar Failures on {branch}");
        rows.push(match count {
            Signal::Known(n) => SignalRow {
                name,
                value: n.to_string(),
                implication: if *n > 0 {
                    "Failing on production"
                } else {
                    "Not failing on production"
                }
                .to_string(),
                available: true,
            },
            Signal::Unknown(reason) => SignalRow {
                name,
                value: unavailable(reason),
                implication: "Treeherder: unavailable".to_string(),
                available: false,
            },
        });
    }

    rows.push(match &s.human_classification {
        Signal::Known(c) => SignalRow {
            name: "Treeherder Classification".to_string(),
            value: c.to_string(),
            implication: if c.is_triaged() {
                "Already triaged"
            } else {
                "No prior triage"
            }
            .to_string(),
            available: true,
        },
        Signal::Unknown(reason) => SignalRow {
            name: "Treeherder Classification".to_string(),
            value: unavailable(reason),
            implication: "Treeherder: unavailable".to_string(),
            available: false,
        },
    });

    rows
}

fn links(ctx: &TaskContext) -> Vec<Link> {
    let mut links = vec![Link {
        label: "Taskcluster".to_string(),
        url: ctx.taskcluster_url.clone(),
    }];
    if let Some(url) = &ctx.sbom_url {
        links.push(Link {
            label: "SBOM".to_string(),
            url: url.clone(),
        });
    }
    if let Some(url) = &ctx.production_sbom_url {
        links.push(Link {
            label: "Production SBOM".to_string(),
            url: url.clone(),
        });
    }
    if let Some(url) = &ctx.classification_url {
        links.push(Link {
            label: "Treeherder".to_string(),
            url: url.clone(),
        });
    }
    for (branch, urls) in &ctx.similar_failures {
        for (i, url) in urls.iter().enumerate() {
            links.push(Link {
                label: format!("Similar failure on {branch} #{}", i + 1),
                url: url.clone(),
            });
        }
    }
    links
}

fn worker_label(ctx: &TaskContext) -> Option<String> {
    match (&ctx.worker_group, &ctx.worker_id) {
        (Some(g), Some(id)) => Some(format!("{g}/{id}")),
        (None, Some(id)) => Some(id.clone()),
        _ => None,
    }
}

/// Keep user text from breaking the Markdown table.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
