//! Policy rules: compiled matchers plus effect, identifier and final flag.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{Level, debug, instrument, trace, warn};

use crate::attribute::RequestContext;
use crate::error::RuleError;
use crate::expr::Expr;
use crate::parse;

/// The effect a rule produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    #[default]
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(Effect::Allow),
            "DENY" => Ok(Effect::Deny),
            _ => Err(format!("unknown effect: {s:?}")),
        }
    }
}

/// A value in a rule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl RecordValue {
    fn kind(&self) -> &'static str {
        match self {
            RecordValue::Bool(_) => "a boolean",
            RecordValue::Int(_) => "an integer",
            RecordValue::Str(_) => "a string",
            RecordValue::List(_) => "a list",
        }
    }

    fn as_text(&self) -> String {
        match self {
            RecordValue::Bool(b) => b.to_string(),
            RecordValue::Int(i) => i.to_string(),
            RecordValue::Str(s) => s.clone(),
            RecordValue::List(items) => items.join(","),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            RecordValue::Bool(b) => *b,
            RecordValue::Int(i) => *i != 0,
            RecordValue::Str(s) => matches!(
                s.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            RecordValue::List(items) => !items.is_empty(),
        }
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Bool(b)
    }
}

impl From<i64> for RecordValue {
    fn from(i: i64) -> Self {
        RecordValue::Int(i)
    }
}

impl From<i32> for RecordValue {
    fn from(i: i32) -> Self {
        RecordValue::Int(i64::from(i))
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::Str(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::Str(s)
    }
}

impl From<Vec<&str>> for RecordValue {
    fn from(items: Vec<&str>) -> Self {
        RecordValue::List(items.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for RecordValue {
    fn from(items: Vec<String>) -> Self {
        RecordValue::List(items)
    }
}

/// Ordered property bag a rule is built from.
///
/// `id`, `description`, `effect` and `final` are reserved; every other key
/// names an attribute matcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleRecord {
    entries: Vec<(String, RecordValue)>,
}

impl RuleRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'de> Deserialize<'de> for RuleRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = RuleRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of rule properties")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RuleRecord, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, RecordValue>()? {
                    entries.push((key, value));
                }
                Ok(RuleRecord { entries })
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// A compiled authorization rule.
///
/// Immutable after construction; the specificity is computed on first use
/// and cached.
#[derive(Debug)]
pub struct PolicyRule {
    id: i64,
    effect: Effect,
    description: String,
    is_final: bool,
    matchers: BTreeMap<String, Expr>,
    specificity: OnceLock<f64>,
}

impl PolicyRule {
    /// Compile a rule from its property bag.
    ///
    /// Keys are lower-cased. A later duplicate key replaces an earlier one.
    #[instrument(level = Level::TRACE, skip(record))]
    pub fn from_record(record: &RuleRecord) -> Result<Self, RuleError> {
        let mut rule = PolicyRule {
            id: 0,
            effect: Effect::Deny,
            description: String::new(),
            is_final: false,
            matchers: BTreeMap::new(),
            specificity: OnceLock::new(),
        };

        for (key, value) in record.iter() {
            let key = key.to_lowercase();
            match key.as_str() {
                "id" => rule.id = parse_identifier(value)?,
                "description" => rule.description = value.as_text(),
                "effect" => rule.effect = parse_effect(value),
                "final" => rule.is_final = value.is_truthy(),
                _ => {
                    let matcher = compile_matcher(&key, value)?;
                    rule.matchers.insert(key, matcher);
                }
            }
        }

        debug!(
            id = rule.id,
            effect = %rule.effect,
            is_final = rule.is_final,
            matchers = rule.matchers.len(),
            "compiled rule"
        );
        Ok(rule)
    }

    pub fn identifier(&self) -> i64 {
        self.id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn is_allow(&self) -> bool {
        self.effect == Effect::Allow
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Description with the specificity score appended.
    pub fn description(&self) -> String {
        format!("{} (score = {:.2})", self.description, self.specificity())
    }

    pub fn raw_description(&self) -> &str {
        &self.description
    }

    pub fn matcher(&self, name: &str) -> Option<&Expr> {
        self.matchers.get(&name.to_lowercase())
    }

    pub fn matcher_names(&self) -> impl Iterator<Item = &str> {
        self.matchers.keys().map(String::as_str)
    }

    /// Sum of the matcher specificities.
    pub fn specificity(&self) -> f64 {
        *self
            .specificity
            .get_or_init(|| self.matchers.values().map(Expr::specificity).sum())
    }

    /// Order by specificity alone; equal scores tie.
    pub fn compare(&self, other: &PolicyRule) -> Ordering {
        self.specificity()
            .partial_cmp(&other.specificity())
            .unwrap_or(Ordering::Equal)
    }

    pub fn is_applicable_to(&self, ctx: &RequestContext) -> bool {
        self.first_mismatch(ctx).is_none()
    }

    /// Name of the first request attribute whose matcher rejects the request.
    ///
    /// Only names present in the request are checked; matchers for names the
    /// caller did not supply are never evaluated.
    pub fn first_mismatch<'c>(&self, ctx: &'c RequestContext) -> Option<&'c str> {
        for (name, provider) in ctx.iter() {
            let Some(matcher) = self.matchers.get(name) else {
                continue;
            };
            if !matcher.matches(provider) {
                trace!(id = self.id, attribute = name, "matcher rejected request");
                return Some(name);
            }
        }
        None
    }
}

fn parse_identifier(value: &RecordValue) -> Result<i64, RuleError> {
    match value {
        RecordValue::Int(i) => Ok(*i),
        RecordValue::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| RuleError::InvalidIdentifier(s.clone())),
        other => Err(RuleError::InvalidIdentifier(other.as_text())),
    }
}

fn parse_effect(value: &RecordValue) -> Effect {
    let text = value.as_text();
    text.parse().unwrap_or_else(|_| {
        warn!(effect = %text, "unknown rule effect, falling back to deny");
        Effect::Deny
    })
}

fn compile_matcher(attribute: &str, value: &RecordValue) -> Result<Expr, RuleError> {
    let compiled = match value {
        RecordValue::Str(s) => parse::compile(s),
        RecordValue::List(items) => parse::compile_list(items),
        other => {
            return Err(RuleError::InvalidMatcherValue {
                attribute: attribute.to_string(),
                found: other.kind().to_string(),
            });
        }
    };
    compiled.map_err(|source| RuleError::Matcher {
        attribute: attribute.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeMap, AttributeProvider};

    fn rule(record: RuleRecord) -> PolicyRule {
        PolicyRule::from_record(&record).unwrap()
    }

    #[test]
    fn defaults() {
        let r = rule(RuleRecord::new());
        assert_eq!(r.identifier(), 0);
        assert_eq!(r.effect(), Effect::Deny);
        assert!(!r.is_final());
        assert_eq!(r.specificity(), 0.0);
        assert_eq!(r.description(), " (score = 0.00)");
    }

    #[test]
    fn reserved_keys_are_consumed() {
        let r = rule(
            RuleRecord::new()
                .with("Id", 7)
                .with("DESCRIPTION", "admins may write")
                .with("effect", "allow")
                .with("Final", true)
                .with("Subject", ".role IS admin")
                .with("action", "write"),
        );
        assert_eq!(r.identifier(), 7);
        assert!(r.is_allow());
        assert!(r.is_final());
        assert_eq!(r.raw_description(), "admins may write");
        assert_eq!(r.matcher_names().collect::<Vec<_>>(), vec!["action", "subject"]);
        assert_eq!(r.description(), "admins may write (score = 2.00)");
    }

    #[test]
    fn unknown_effect_falls_back_to_deny() {
        let r = rule(RuleRecord::new().with("effect", "maybe"));
        assert_eq!(r.effect(), Effect::Deny);
    }

    #[test]
    fn identifier_accepts_numeric_strings() {
        assert_eq!(rule(RuleRecord::new().with("id", " 12 ")).identifier(), 12);
        let err = PolicyRule::from_record(&RuleRecord::new().with("id", "twelve")).unwrap_err();
        assert!(matches!(err, RuleError::InvalidIdentifier(_)));
    }

    #[test]
    fn final_accepts_truthy_values() {
        assert!(rule(RuleRecord::new().with("final", 1)).is_final());
        assert!(rule(RuleRecord::new().with("final", "TRUE")).is_final());
        assert!(!rule(RuleRecord::new().with("final", "no")).is_final());
    }

    #[test]
    fn matcher_must_be_string_or_list() {
        let err = PolicyRule::from_record(&RuleRecord::new().with("action", 3)).unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatcherValue { ref attribute, .. } if attribute == "action"));
    }

    #[test]
    fn syntax_error_names_attribute() {
        let err =
            PolicyRule::from_record(&RuleRecord::new().with("subject", ".role IS")).unwrap_err();
        assert!(err.to_string().contains("'subject'"));
        assert!(err.to_string().contains("{!}"));
    }

    #[test]
    fn specificity_is_sum_of_matchers() {
        let r = rule(
            RuleRecord::new()
                .with("subject", "*")
                .with("resource", "doc*")
                .with("action", vec!["read", "write"]),
        );
        assert_eq!(r.specificity(), 0.0 + 0.5 + 1.0);
        // cached value is stable
        assert_eq!(r.specificity(), 1.5);
    }

    #[test]
    fn empty_list_matcher_blocks_request() {
        let r = rule(RuleRecord::new().with("action", Vec::<String>::new()));
        assert_eq!(r.specificity(), 1.0);
        assert!(!r.is_applicable_to(&RequestContext::new().with("action", "read")));
        assert!(r.is_applicable_to(&RequestContext::new().with("subject", "alice")));
    }

    #[test]
    fn applicability_checks_only_supplied_names() {
        let r = rule(
            RuleRecord::new()
                .with("subject", ".role IS admin")
                .with("action", "write"),
        );
        let admin: AttributeProvider = AttributeMap::new("alice").with("role", "admin").into();

        let ctx = RequestContext::new().with("subject", admin.clone()).with("action", "write");
        assert!(r.is_applicable_to(&ctx));

        let ctx = RequestContext::new().with("subject", admin).with("action", "read");
        assert!(!r.is_applicable_to(&ctx));
        assert_eq!(r.first_mismatch(&ctx), Some("action"));

        // `subject` is never evaluated when absent
        let ctx = RequestContext::new().with("action", "write");
        assert!(r.is_applicable_to(&ctx));
    }

    #[test]
    fn disjoint_context_is_vacuously_applicable() {
        let r = rule(RuleRecord::new().with("subject", "nobody"));
        let ctx = RequestContext::new().with("resource", "doc").with("action", "read");
        assert!(r.is_applicable_to(&ctx));
        assert!(r.is_applicable_to(&RequestContext::new()));
    }

    #[test]
    fn string_provider_fails_attribute_matchers() {
        let r = rule(RuleRecord::new().with("subject", ".role IS admin"));
        assert!(!r.is_applicable_to(&RequestContext::new().with("subject", "admin")));
    }

    #[test]
    fn compare_uses_specificity_only() {
        let general = rule(RuleRecord::new().with("id", 1).with("subject", "*"));
        let narrow = rule(RuleRecord::new().with("id", 0).with("subject", "alice"));
        let twin = rule(RuleRecord::new().with("id", 9).with("subject", "bob"));
        assert_eq!(narrow.compare(&general), Ordering::Greater);
        assert_eq!(general.compare(&narrow), Ordering::Less);
        assert_eq!(narrow.compare(&twin), Ordering::Equal);
    }

    #[test]
    fn later_duplicate_key_wins() {
        let r = rule(
            RuleRecord::new()
                .with("action", "read")
                .with("ACTION", "write"),
        );
        assert!(r.is_applicable_to(&RequestContext::new().with("action", "write")));
    }

    #[test]
    fn record_deserializes_in_order() {
        let record: RuleRecord = serde_json::from_str(
            r#"{"id": 3, "effect": "ALLOW", "final": false, "subject": ["alice", "bob"], "action": "read"}"#,
        )
        .unwrap();
        let keys: Vec<&str> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["id", "effect", "final", "subject", "action"]);
        assert!(rule(record).is_allow());
    }

    #[test]
    fn record_deserializes_from_yaml() {
        let record: RuleRecord = serde_yaml::from_str(
            "id: 1\neffect: deny\nfinal: true\nresource: 'secret*'\n",
        )
        .unwrap();
        let r = rule(record);
        assert!(r.is_final());
        assert_eq!(r.effect(), Effect::Deny);
        assert_eq!(r.specificity(), 0.5);
    }
}
