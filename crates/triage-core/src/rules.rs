use crate::classifier::Rule;
use crate::types::{Confidence, HumanClassification, SignalTuple, Verdict};

pub const FALLBACK_RULE_ID: &str = "no_signal_match";

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn classified_intermittent(s: &SignalTuple) -> bool {
    s.classification_is(HumanClassification::Intermittent)
}

fn classified_infra(s: &SignalTuple) -> bool {
    s.classification_is(HumanClassification::Infra)
}

fn alpha_image_changed_production_clean(s: &SignalTuple) -> bool {
    s.is_alpha_pool && s.image_version_differs() == Some(true) && s.production_branches_clean()
}

fn failing_on_production(s: &SignalTuple) -> bool {
    s.cross_branch_failure_count
        .values()
        .any(|c| c.known().is_some_and(|n| *n > 0))
}

// ---------------------------------------------------------------------------
// Rationale helpers
// ---------------------------------------------------------------------------

fn branch_counts(s: &SignalTuple) -> String {
    s.cross_branch_failure_count
        .iter()
        .map(|(branch, count)| match count.known() {
            Some(n) => format!("{branch}: {n}"),
            None => format!("{branch}: unknown"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn version_or_unknown(v: &crate::types::Signal<String>) -> &str {
    v.known().map(String::as_str).unwrap_or("unknown")
}

/// Names of the signals that could not be collected.
pub fn unavailable_signals(s: &SignalTuple) -> Vec<String> {
    let mut missing = Vec::new();
    if !s.image_version_current.is_known() {
        missing.push("image version".to_string());
    }
    if s.is_alpha_pool && !s.image_version_baseline.is_known() {
        missing.push("production image version".to_string());
    }
    for (branch, count) in &s.cross_branch_failure_count {
        if !count.is_known() {
            missing.push(format!("failures on {branch}"));
        }
    }
    if !s.human_classification.is_known() {
        missing.push("Treeherder classification".to_string());
    }
    missing
}

pub fn fallback_rationale(s: &SignalTuple) -> String {
    let base = if s.is_alpha_pool && s.image_version_differs() == Some(false) {
        "Failed on alpha pool but same image version as production - could be code or intermittent"
    } else {
        "Insufficient signals to determine cause - manual investigation needed"
    };
    let missing = unavailable_signals(s);
    if missing.is_empty() {
        base.to_string()
    } else {
        format!("{base} (unavailable: {})", missing.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Default rule table
// ---------------------------------------------------------------------------

/// Priority order matters: a sheriff's classification outranks every
/// automatic signal, and image evidence is only considered while production
/// is known to be clean.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "classified_intermittent",
            condition: classified_intermittent,
            verdict: Verdict::Intermittent,
            confidence: Confidence::High,
            rationale: |_| "Already classified as intermittent in Treeherder".to_string(),
        },
        Rule {
            id: "classified_infra",
            condition: classified_infra,
            verdict: Verdict::Infra,
            confidence: Confidence::High,
            rationale: |_| "Already classified as infrastructure issue in Treeherder".to_string(),
        },
        Rule {
            id: "alpha_image_changed",
            condition: alpha_image_changed_production_clean,
            verdict: Verdict::ImageRegression,
            confidence: Confidence::High,
            rationale: |s| {
                format!(
                    "Failed on alpha pool with different image version ({} vs {}), \
                     no similar failures on production branches",
                    version_or_unknown(&s.image_version_current),
                    version_or_unknown(&s.image_version_baseline),
                )
            },
        },
        Rule {
            id: "failing_on_production",
            condition: failing_on_production,
            verdict: Verdict::CodeRegression,
            confidence: Confidence::Medium,
            rationale: |s| {
                format!(
                    "Similar failures found on production branches ({})",
                    branch_counts(s)
                )
            },
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
