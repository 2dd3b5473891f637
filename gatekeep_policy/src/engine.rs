//! Decision engine: picks the governing rule for a request.
//!
//! Applicable rules are grouped by identifier. Inside a group a final rule
//! cannot be overridden; otherwise the most specific rule wins. Group winners
//! then compete the same way for the overall decision. With no applicable
//! rule the answer is deny.

use std::cmp::Ordering;

use tracing::{Level, debug, instrument, trace, warn};

use crate::attribute::RequestContext;
use crate::error::PolicyError;
use crate::ir::{DecisionTrace, FinalConflict, GroupResolution, PolicyDecision, RuleMatch, RuleSkip};
use crate::rule::{Effect, PolicyRule, RuleRecord};

/// Effect returned when no rule applies.
pub const DEFAULT_EFFECT: Effect = Effect::Deny;

/// An immutable, compiled rule set.
#[derive(Debug, Default)]
pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
}

impl PolicyEngine {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Compile every record; the first failure aborts the whole set.
    #[instrument(level = Level::TRACE, skip(records))]
    pub fn compile<'a>(
        records: impl IntoIterator<Item = &'a RuleRecord>,
    ) -> Result<Self, PolicyError> {
        let rules = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                PolicyRule::from_record(record).map_err(|source| PolicyError::Rule { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(rule_count = rules.len(), "compiled rule set");
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn decide(&self, ctx: &RequestContext) -> PolicyDecision {
        decide(&self.rules, ctx)
    }
}

/// Evaluate `rules` (in supplied order) against a request.
#[instrument(level = Level::TRACE, skip_all, fields(rules = rules.len(), attributes = ctx.len()))]
pub fn decide(rules: &[PolicyRule], ctx: &RequestContext) -> PolicyDecision {
    let mut trace = DecisionTrace::default();
    // Identifier groups in first-encountered order.
    let mut groups: Vec<(i64, Vec<usize>)> = Vec::new();

    for (idx, rule) in rules.iter().enumerate() {
        if let Some(attribute) = rule.first_mismatch(ctx) {
            trace!(idx, attribute, "rule skipped");
            trace.skipped_rules.push(RuleSkip {
                rule_index: idx,
                description: rule.description(),
                reason: format!("'{attribute}' did not match"),
            });
            continue;
        }

        trace!(idx, id = rule.identifier(), effect = %rule.effect(), "rule applies");
        trace.matched_rules.push(RuleMatch {
            rule_index: idx,
            identifier: rule.identifier(),
            description: rule.description(),
            effect: rule.effect(),
            is_final: rule.is_final(),
            specificity: rule.specificity(),
        });
        match groups.iter_mut().find(|(id, _)| *id == rule.identifier()) {
            Some((_, members)) => members.push(idx),
            None => groups.push((rule.identifier(), vec![idx])),
        }
    }

    let mut winners = Vec::with_capacity(groups.len());
    for (id, members) in &groups {
        let finals: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&i| rules[i].is_final())
            .collect();
        let locked = !finals.is_empty();
        let pool = if locked { &finals } else { members };
        let Some(winner) = most_specific(rules, pool) else {
            continue;
        };

        if finals
            .iter()
            .any(|&i| rules[i].effect() != rules[winner].effect())
        {
            warn!(
                id,
                rules = ?finals,
                chosen = winner,
                "final rules with different effects share an identifier"
            );
            trace.conflicts.push(FinalConflict {
                identifier: *id,
                rule_indices: finals.clone(),
                chosen: winner,
            });
        }

        trace.groups.push(GroupResolution {
            identifier: *id,
            winner,
            candidates: members.len(),
            locked,
        });
        winners.push(winner);
    }

    // Final locks hold across groups too.
    let final_winners: Vec<usize> = winners
        .iter()
        .copied()
        .filter(|&i| rules[i].is_final())
        .collect();
    let pool = if final_winners.is_empty() {
        &winners
    } else {
        &final_winners
    };

    let Some(idx) = most_specific(rules, pool) else {
        trace.final_resolution = format!("no applicable rule, default: {DEFAULT_EFFECT}");
        debug!(effect = %DEFAULT_EFFECT, "no rule applies");
        return PolicyDecision {
            effect: DEFAULT_EFFECT,
            reason: None,
            rule_index: None,
            rule_id: None,
            trace,
        };
    };

    let rule = &rules[idx];
    trace.final_resolution = format!(
        "result: {} (rule #{}, id {}{})",
        rule.effect(),
        idx,
        rule.identifier(),
        if rule.is_final() { ", final" } else { "" }
    );
    debug!(idx, effect = %rule.effect(), specificity = rule.specificity(), "decision");
    PolicyDecision {
        effect: rule.effect(),
        reason: Some(rule.description()),
        rule_index: Some(idx),
        rule_id: Some(rule.identifier()),
        trace,
    }
}

/// Most specific rule among `candidates`; ties keep the earliest.
fn most_specific(rules: &[PolicyRule], candidates: &[usize]) -> Option<usize> {
    candidates.iter().copied().reduce(|best, i| {
        if rules[i].compare(&rules[best]) == Ordering::Greater {
            i
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeMap;

    fn record(id: i64, effect: &str, is_final: bool) -> RuleRecord {
        RuleRecord::new()
            .with("id", id)
            .with("effect", effect)
            .with("final", is_final)
            .with("description", format!("{effect} {id}"))
    }

    fn engine(records: Vec<RuleRecord>) -> PolicyEngine {
        PolicyEngine::compile(&records).unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new()
            .with("subject", AttributeMap::new("alice").with("role", "admin"))
            .with("resource", "reports/q3")
            .with("action", "read")
    }

    #[test]
    fn no_rules_default_deny() {
        let d = PolicyEngine::default().decide(&ctx());
        assert_eq!(d.effect, Effect::Deny);
        assert!(d.reason.is_none());
        assert!(d.trace.final_resolution.contains("default: deny"));
    }

    #[test]
    fn no_applicable_rule_default_deny() {
        let e = engine(vec![
            record(1, "ALLOW", false).with("action", "write"),
            record(2, "ALLOW", false).with("resource", "invoices/*"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Deny);
        assert_eq!(d.rule_index, None);
        assert_eq!(d.trace.skipped_rules.len(), 2);
        assert!(d.trace.matched_rules.is_empty());
    }

    #[test]
    fn higher_specificity_wins() {
        // 0.5 deny vs 0.8-ish allow, same id, neither final
        let e = engine(vec![
            record(1, "DENY", false).with("resource", "reports/*"),
            record(1, "ALLOW", false)
                .with("resource", "reports/*")
                .with("action", "read"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Allow);
        assert_eq!(d.rule_index, Some(1));
        assert_eq!(d.reason.as_deref(), Some("ALLOW 1 (score = 1.50)"));
    }

    #[test]
    fn final_rule_beats_more_specific_rule() {
        let e = engine(vec![
            // specificity 1/3 (two stars)
            record(1, "ALLOW", true).with("resource", "*orts*"),
            // specificity 2.0
            record(1, "DENY", false)
                .with("resource", "reports/q3")
                .with("action", "read"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Allow);
        assert_eq!(d.rule_index, Some(0));
        assert!(d.trace.groups[0].locked);
    }

    #[test]
    fn final_lock_holds_across_groups() {
        let e = engine(vec![
            record(1, "DENY", false)
                .with("resource", "reports/q3")
                .with("action", "read"),
            record(2, "ALLOW", true).with("action", "*"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Allow);
        assert_eq!(d.rule_id, Some(2));
    }

    #[test]
    fn conflicting_finals_resolve_by_specificity() {
        let e = engine(vec![
            record(3, "ALLOW", true).with("resource", "reports/*"),
            record(3, "DENY", true).with("resource", "reports/q3"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Deny);
        assert_eq!(d.trace.conflicts.len(), 1);
        assert_eq!(d.trace.conflicts[0].rule_indices, vec![0, 1]);
        assert_eq!(d.trace.conflicts[0].chosen, 1);
    }

    #[test]
    fn agreeing_finals_are_not_a_conflict() {
        let e = engine(vec![
            record(3, "DENY", true).with("resource", "reports/*"),
            record(3, "DENY", true).with("resource", "reports/q3"),
        ]);
        assert!(e.decide(&ctx()).trace.conflicts.is_empty());
    }

    #[test]
    fn ties_keep_first_encountered() {
        let e = engine(vec![
            record(1, "DENY", false).with("action", "read"),
            record(1, "ALLOW", false).with("action", "read"),
        ]);
        assert_eq!(e.decide(&ctx()).rule_index, Some(0));

        let e = engine(vec![
            record(5, "ALLOW", false).with("action", "read"),
            record(2, "DENY", false).with("action", "read"),
        ]);
        assert_eq!(e.decide(&ctx()).effect, Effect::Allow);
    }

    #[test]
    fn most_specific_group_winner_decides() {
        let e = engine(vec![
            record(1, "ALLOW", false).with("subject", "*"),
            record(2, "DENY", false).with("subject", ".role IS admin"),
            record(3, "ALLOW", false).with("subject", ".role IS guest"),
        ]);
        let d = e.decide(&ctx());
        assert_eq!(d.effect, Effect::Deny);
        assert_eq!(d.trace.groups.len(), 2);
        assert_eq!(d.trace.skipped_rules[0].rule_index, 2);
    }

    #[test]
    fn vacuous_rule_applies() {
        let e = engine(vec![record(1, "ALLOW", false).with("tenant", "acme")]);
        assert!(e.decide(&ctx()).is_allowed());
    }

    #[test]
    fn compile_reports_failing_index() {
        let records = vec![
            record(1, "ALLOW", false).with("action", "read"),
            record(2, "ALLOW", false).with("action", "read AND"),
        ];
        let err = PolicyEngine::compile(&records).unwrap_err();
        assert!(matches!(err, PolicyError::Rule { index: 1, .. }));
    }

    #[test]
    fn decide_is_repeatable_and_shareable() {
        let e = std::sync::Arc::new(engine(vec![
            record(1, "ALLOW", false).with("action", "read"),
        ]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let e = e.clone();
                std::thread::spawn(move || e.decide(&ctx()).effect)
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), Effect::Allow);
        }
    }

    #[test]
    fn rules_are_never_mutated_by_decisions() {
        let e = engine(vec![record(1, "ALLOW", false).with("resource", "reports/*")]);
        let before = e.rules()[0].description();
        e.decide(&ctx());
        e.decide(&RequestContext::new());
        assert_eq!(e.rules()[0].description(), before);
    }
}
