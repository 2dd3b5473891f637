//! `check` and `explain`: decide one request against a rule file.

use std::path::Path;

use anyhow::Result;
use gatekeep_policy::PolicyDecision;
use tracing::{Level, info, instrument, warn};

use crate::loader;
use crate::request::RequestArgs;

/// Evaluate the request and print the decision. Returns whether it was allowed.
#[instrument(level = Level::TRACE, skip(request))]
pub fn run(rules: &Path, request: &RequestArgs, explain: bool, json: bool) -> Result<bool> {
    let engine = loader::load_engine(rules)?;
    let ctx = request.to_context()?;
    if ctx.is_empty() {
        warn!("empty request: every rule applies vacuously");
    }

    let decision = engine.decide(&ctx);
    info!(
        effect = %decision.effect,
        rule = ?decision.rule_index,
        "decision"
    );

    if json {
        println!("{}", render_json(&decision, explain)?);
    } else {
        for line in render_text(&decision, explain) {
            println!("{line}");
        }
    }
    Ok(decision.is_allowed())
}

fn render_json(decision: &PolicyDecision, explain: bool) -> Result<String> {
    let value = if explain {
        serde_json::to_value(decision)?
    } else {
        serde_json::json!({
            "effect": decision.effect,
            "reason": decision.reason,
            "rule_index": decision.rule_index,
            "rule_id": decision.rule_id,
        })
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

fn render_text(decision: &PolicyDecision, explain: bool) -> Vec<String> {
    let mut lines = vec![match decision.reason {
        Some(ref reason) => format!("{}: {}", decision.effect, reason),
        None => format!("{}: no applicable rule", decision.effect),
    }];
    if explain {
        lines.extend(decision.explanation().into_iter().map(|l| format!("  {l}")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_policy::{PolicyEngine, RequestContext, RuleRecord};

    fn decision(action: &str) -> PolicyDecision {
        let records = vec![
            RuleRecord::new()
                .with("effect", "ALLOW")
                .with("description", "readers")
                .with("action", "read"),
        ];
        PolicyEngine::compile(&records)
            .unwrap()
            .decide(&RequestContext::new().with("action", action))
    }

    #[test]
    fn text_output() {
        assert_eq!(
            render_text(&decision("read"), false),
            vec!["allow: readers (score = 1.00)"]
        );
        assert_eq!(
            render_text(&decision("write"), false),
            vec!["deny: no applicable rule"]
        );
        let explained = render_text(&decision("write"), true);
        assert!(explained.iter().any(|l| l.contains("skipped #0")));
    }

    #[test]
    fn json_output() {
        let out = render_json(&decision("read"), false).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["effect"], "allow");
        assert_eq!(v["rule_index"], 0);

        let out = render_json(&decision("read"), true).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["trace"]["matched_rules"][0]["rule_index"], 0);
    }

    #[test]
    fn run_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"[{"effect": "ALLOW", "action": "read"}]"#).unwrap();
        let request = RequestArgs {
            sets: vec![("action".into(), "read".into())],
            ..Default::default()
        };
        assert!(run(&path, &request, false, false).unwrap());
        let request = RequestArgs {
            sets: vec![("action".into(), "write".into())],
            ..Default::default()
        };
        assert!(!run(&path, &request, true, true).unwrap());
    }
}
