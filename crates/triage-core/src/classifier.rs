use crate::rules::{default_rules, fallback_rationale, FALLBACK_RULE_ID};
use crate::types::{Confidence, SignalTuple, Verdict};
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// VerdictResult (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictResult {
    pub verdict: Verdict,
    pub confidence: Confidence,
    pub rationale: String,
    /// Id of the rule that fired.
    pub rule: String,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A fn-pointer rule. Conditions must be pure: they only read the tuple.
pub struct Rule {
    pub id: &'static str,
    pub condition: fn(&SignalTuple) -> bool,
    pub verdict: Verdict,
    pub confidence: Confidence,
    pub rationale: fn(&SignalTuple) -> String,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule wins; nothing matching means
    /// `NEEDS_INVESTIGATION` at low confidence. Never fails.
    pub fn classify(&self, signals: &SignalTuple) -> VerdictResult {
        for rule in &self.rules {
            if (rule.condition)(signals) {
                return VerdictResult {
                    verdict: rule.verdict,
                    confidence: rule.confidence,
                    rationale: (rule.rationale)(signals),
                    rule: rule.id.to_string(),
                };
            }
        }

        VerdictResult {
            verdict: Verdict::NeedsInvestigation,
            confidence: Confidence::Low,
            rationale: fallback_rationale(signals),
            rule: FALLBACK_RULE_ID.to_string(),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// Classify with the default rule table.
pub fn determine_verdict(signals: &SignalTuple) -> VerdictResult {
    let result = Classifier::default().classify(signals);
    info!(
        verdict = result.verdict.as_str(),
        confidence = result.confidence.as_str(),
        rule = result.rule.as_str(),
        "verdict"
    );
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HumanClassification, Signal};

    fn always(_: &SignalTuple) -> bool {
        true
    }

    fn never(_: &SignalTuple) -> bool {
        false
    }

    fn text(_: &SignalTuple) -> String {
        "fired".to_string()
    }

    fn tuple() -> SignalTuple {
        SignalTuple {
            is_alpha_pool: false,
            image_version_current: Signal::unknown("n/a"),
            image_version_baseline: Signal::unknown("n/a"),
            cross_branch_failure_count: Default::default(),
            human_classification: Signal::Known(HumanClassification::Unclassified),
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let classifier = Classifier::new(vec![
            Rule {
                id: "skip",
                condition: never,
                verdict: Verdict::Infra,
                confidence: Confidence::High,
                rationale: text,
            },
            Rule {
                id: "first",
                condition: always,
                verdict: Verdict::CodeRegression,
                confidence: Confidence::Medium,
                rationale: text,
            },
            Rule {
                id: "second",
                condition: always,
                verdict: Verdict::ImageRegression,
                confidence: Confidence::High,
                rationale: text,
            },
        ]);
        let result = classifier.classify(&tuple());
        assert_eq!(result.rule, "first");
        assert_eq!(result.verdict, Verdict::CodeRegression);
        assert_eq!(result.rationale, "fired");
    }

    #[test]
    fn empty_rule_table_falls_back() {
        let result = Classifier::new(vec![]).classify(&tuple());
        assert_eq!(result.verdict, Verdict::NeedsInvestigation);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.rule, FALLBACK_RULE_ID);
    }
}
