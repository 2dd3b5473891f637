//! `validate`: compile a rule file and list each rule's score.

use std::path::Path;

use anyhow::Result;
use gatekeep_policy::PolicyEngine;
use tracing::{Level, instrument};

use crate::loader;

#[instrument(level = Level::TRACE)]
pub fn run(rules: &Path, json: bool) -> Result<()> {
    let engine = loader::load_engine(rules)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&engine))?);
    } else {
        for line in summary_text(&engine) {
            println!("{line}");
        }
    }
    Ok(())
}

fn summary_text(engine: &PolicyEngine) -> Vec<String> {
    let mut lines = vec![format!("{} rule(s) compiled", engine.rules().len())];
    for (idx, rule) in engine.rules().iter().enumerate() {
        let names: Vec<&str> = rule.matcher_names().collect();
        lines.push(format!(
            "  #{idx} id={} {}{}: {} [{}]",
            rule.identifier(),
            rule.effect(),
            if rule.is_final() { " final" } else { "" },
            rule.description(),
            names.join(", ")
        ));
    }
    lines
}

fn summary_json(engine: &PolicyEngine) -> serde_json::Value {
    let rules: Vec<serde_json::Value> = engine
        .rules()
        .iter()
        .map(|rule| {
            let matchers: serde_json::Map<String, serde_json::Value> = rule
                .matcher_names()
                .filter_map(|name| {
                    rule.matcher(name)
                        .map(|m| (name.to_string(), serde_json::json!(m.to_string())))
                })
                .collect();
            serde_json::json!({
                "id": rule.identifier(),
                "effect": rule.effect(),
                "final": rule.is_final(),
                "description": rule.raw_description(),
                "specificity": rule.specificity(),
                "matchers": matchers,
            })
        })
        .collect();
    serde_json::json!({ "valid": true, "rules": rules })
}
