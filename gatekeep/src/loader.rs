//! Reading rule files from disk.
//!
//! A rule file is JSON or YAML (chosen by extension, JSON otherwise) holding
//! either a list of rule records or a document with a `rules` list.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use gatekeep_policy::{PolicyEngine, RuleRecord};
use serde::Deserialize;
use tracing::{Level, info, instrument};

#[derive(Deserialize)]
#[serde(untagged)]
enum RulesFile {
    List(Vec<RuleRecord>),
    Document { rules: Vec<RuleRecord> },
}

impl RulesFile {
    fn into_records(self) -> Vec<RuleRecord> {
        match self {
            RulesFile::List(records) | RulesFile::Document { rules: records } => records,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesFormat {
    Json,
    Yaml,
}

impl RulesFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => RulesFormat::Yaml,
            _ => RulesFormat::Json,
        }
    }
}

pub fn parse_records(text: &str, format: RulesFormat) -> Result<Vec<RuleRecord>> {
    let file: RulesFile = match format {
        RulesFormat::Json => serde_json::from_str(text).context("invalid JSON rule file")?,
        RulesFormat::Yaml => serde_yaml::from_str(text).context("invalid YAML rule file")?,
    };
    Ok(file.into_records())
}

#[instrument(level = Level::TRACE)]
pub fn read_records(path: &Path) -> Result<Vec<RuleRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules from {}", path.display()))?;
    parse_records(&text, RulesFormat::for_path(path))
        .with_context(|| format!("failed to parse rules from {}", path.display()))
}

/// Read and compile a rule file. Any invalid rule rejects the whole file.
#[instrument(level = Level::TRACE)]
pub fn load_engine(path: &Path) -> Result<PolicyEngine> {
    let records = read_records(path)?;
    let engine = PolicyEngine::compile(&records).map_err(|e| {
        let help = e.help().map(|h| format!("\n  help: {h}")).unwrap_or_default();
        anyhow!("{}: {e}{help}", path.display())
    })?;
    info!(path = %path.display(), rules = engine.rules().len(), "loaded rules");
    Ok(engine)
}
