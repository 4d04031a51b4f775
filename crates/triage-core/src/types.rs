use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A fact gathered from an upstream service, or the reason it could not be.
///
/// `Unknown` never satisfies a positive rule condition, so a triage over
/// partial data falls through to `NEEDS_INVESTIGATION` instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Signal<T> {
    Known(T),
    Unknown(String),
}

impl<T> Signal<T> {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Signal::Unknown(reason.into())
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Signal::Known(v) => Some(v),
            Signal::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Signal::Known(_))
    }

    pub fn unknown_reason(&self) -> Option<&str> {
        match self {
            Signal::Known(_) => None,
            Signal::Unknown(reason) => Some(reason),
        }
    }
}

impl<T> From<crate::error::Result<T>> for Signal<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(v) => Signal::Known(v),
            Err(e) => Signal::Unknown(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// HumanClassification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanClassification {
    Unclassified,
    Intermittent,
    Infra,
    FixedByCommit,
    Expected,
    NewUnclassified,
}

impl HumanClassification {
    /// Map a Treeherder `failure_classification_id`.
    ///
    /// "intermittent needs filing" (6) and "autoclassified intermittent" (7)
    /// are both intermittent classifications.
    pub fn from_treeherder_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(HumanClassification::Unclassified),
            2 => Some(HumanClassification::FixedByCommit),
            3 => Some(HumanClassification::Expected),
            4 | 6 | 7 => Some(HumanClassification::Intermittent),
            5 => Some(HumanClassification::Infra),
            8 => Some(HumanClassification::NewUnclassified),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HumanClassification::Unclassified => "unclassified",
            HumanClassification::Intermittent => "intermittent",
            HumanClassification::Infra => "infra",
            HumanClassification::FixedByCommit => "fixed_by_commit",
            HumanClassification::Expected => "expected",
            HumanClassification::NewUnclassified => "new_unclassified",
        }
    }

    /// True if a sheriff has already looked at the failure.
    pub fn is_triaged(self) -> bool {
        !matches!(
            self,
            HumanClassification::Unclassified | HumanClassification::NewUnclassified
        )
    }
}

impl fmt::Display for HumanClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    CodeRegression,
    ImageRegression,
    Intermittent,
    Infra,
    NeedsInvestigation,
}

impl Verdict {
    pub fn all() -> &'static [Verdict] {
        &[
            Verdict::CodeRegression,
            Verdict::ImageRegression,
            Verdict::Intermittent,
            Verdict::Infra,
            Verdict::NeedsInvestigation,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::CodeRegression => "CODE_REGRESSION",
            Verdict::ImageRegression => "IMAGE_REGRESSION",
            Verdict::Intermittent => "INTERMITTENT",
            Verdict::Infra => "INFRA",
            Verdict::NeedsInvestigation => "NEEDS_INVESTIGATION",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Verdict::CodeRegression => "Likely caused by code change",
            Verdict::ImageRegression => "Likely caused by image change",
            Verdict::Intermittent => "Known flaky test",
            Verdict::Infra => "Infrastructure issue",
            Verdict::NeedsInvestigation => "Unclear cause",
        }
    }

    /// Fixed follow-up steps shown with every report for this verdict.
    pub fn recommended_actions(self) -> &'static [&'static str] {
        match self {
            Verdict::ImageRegression => &[
                "Notify image maintainer",
                "Check SBOM for image changes",
                "Consider rolling back image or fixing the issue",
            ],
            Verdict::CodeRegression => &[
                "Identify the regressing commit",
                "Consider backout or fix",
                "Star/classify the failures in Treeherder",
            ],
            Verdict::Intermittent => &[
                "No action needed if already filed",
                "Check if failure rate is increasing",
            ],
            Verdict::Infra => &[
                "Check infrastructure status",
                "Report to RelOps if persistent",
            ],
            Verdict::NeedsInvestigation => &[
                "Manual investigation needed",
                "Check task logs for more details",
                "Compare with similar tasks",
            ],
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SignalTuple
// ---------------------------------------------------------------------------

/// Everything the verdict rules look at. Built fresh for each triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTuple {
    pub is_alpha_pool: bool,
    pub image_version_current: Signal<String>,
    pub image_version_baseline: Signal<String>,
    /// Keyed by production branch name; the key set is fixed by config.
    pub cross_branch_failure_count: BTreeMap<String, Signal<u32>>,
    pub human_classification: Signal<HumanClassification>,
}

impl SignalTuple {
    /// `Some(true)` when both image versions are known and differ,
    /// `None` when either side is unknown.
    pub fn image_version_differs(&self) -> Option<bool> {
        match (
            self.image_version_current.known(),
            self.image_version_baseline.known(),
        ) {
            (Some(current), Some(baseline)) => Some(current != baseline),
            _ => None,
        }
    }

    /// True only if every production branch reported exactly zero matches.
    pub fn production_branches_clean(&self) -> bool {
        !self.cross_branch_failure_count.is_empty()
            && self
                .cross_branch_failure_count
                .values()
                .all(|c| c.known() == Some(&0))
    }

    /// Sum of the known per-branch counts.
    pub fn known_failure_total(&self) -> u32 {
        self.cross_branch_failure_count
            .values()
            .filter_map(Signal::known)
            .sum()
    }

    pub fn classification_is(&self, c: HumanClassification) -> bool {
        self.human_classification.known() == Some(&c)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
