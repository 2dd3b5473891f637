//! Decision types produced by the engine.

use serde::Serialize;

use crate::rule::Effect;

/// The result of evaluating a rule set against a request.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyDecision {
    pub effect: Effect,
    /// Description of the winning rule, score included. `None` when no rule
    /// applied and the default was used.
    pub reason: Option<String>,
    /// Position of the winning rule in the rule list.
    pub rule_index: Option<usize>,
    /// Identifier of the winning rule.
    pub rule_id: Option<i64>,
    /// Structured trace of how this decision was reached.
    pub trace: DecisionTrace,
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Render the decision trace as a list of human-readable strings.
    pub fn explanation(&self) -> Vec<String> {
        self.trace.render()
    }
}

/// A rule that applied to the request.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMatch {
    pub rule_index: usize,
    pub identifier: i64,
    pub description: String,
    pub effect: Effect,
    pub is_final: bool,
    pub specificity: f64,
}

/// A rule that did not apply.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSkip {
    pub rule_index: usize,
    pub description: String,
    /// Why this rule was skipped.
    pub reason: String,
}

/// How one identifier group was resolved.
#[derive(Debug, Clone, Serialize)]
pub struct GroupResolution {
    pub identifier: i64,
    /// Index of the rule that won the group.
    pub winner: usize,
    /// Number of applicable rules in the group.
    pub candidates: usize,
    /// Whether a final rule decided the group.
    pub locked: bool,
}

/// Several final rules with different effects competing for one identifier.
#[derive(Debug, Clone, Serialize)]
pub struct FinalConflict {
    pub identifier: i64,
    pub rule_indices: Vec<usize>,
    /// The rule chosen: the most specific of the finals.
    pub chosen: usize,
}

/// Structured trace of a policy evaluation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecisionTrace {
    pub matched_rules: Vec<RuleMatch>,
    pub skipped_rules: Vec<RuleSkip>,
    pub groups: Vec<GroupResolution>,
    pub conflicts: Vec<FinalConflict>,
    /// Summary of how the final effect was determined.
    pub final_resolution: String,
}

impl DecisionTrace {
    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for skip in &self.skipped_rules {
            lines.push(format!(
                "skipped #{}: {} ({})",
                skip.rule_index, skip.description, skip.reason
            ));
        }
        for m in &self.matched_rules {
            lines.push(format!(
                "matched #{}: {} -> {}{}",
                m.rule_index,
                m.description,
                m.effect,
                if m.is_final { " [final]" } else { "" }
            ));
        }
        for g in &self.groups {
            lines.push(format!(
                "group id={}: #{} wins of {} candidate(s){}",
                g.identifier,
                g.winner,
                g.candidates,
                if g.locked { " (final lock)" } else { "" }
            ));
        }
        for c in &self.conflicts {
            let indices: Vec<String> = c.rule_indices.iter().map(|i| format!("#{i}")).collect();
            lines.push(format!(
                "conflict id={}: final rules {} disagree, chose #{}",
                c.identifier,
                indices.join(", "),
                c.chosen
            ));
        }
        lines.push(self.final_resolution.clone());
        lines
    }
}
