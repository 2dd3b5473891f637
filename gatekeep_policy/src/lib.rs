//! # gatekeep_policy
//!
//! Authorization rules ranked by specificity.
//!
//! A rule pairs an effect (`ALLOW`/`DENY`) with per-attribute matchers written
//! in a small boolean grammar:
//!
//! ```text
//! .role IS admin AND NOT .suspended IS true
//! reports/* OR invoices/*
//! .groups HAS (ops OR wheel)
//! ```
//!
//! Rules are not applied in declaration order. Each matcher reports how
//! narrowly it constrains its values (its specificity, `0.0` for `*`, `1.0`
//! for an exact literal); the most specific applicable rule decides, unless a
//! `final` rule sharing its identifier locks the decision.
//!
//! ```
//! use gatekeep_policy::{AttributeMap, Effect, PolicyEngine, RequestContext, RuleRecord};
//!
//! let records = vec![
//!     RuleRecord::new().with("id", 1).with("effect", "DENY").with("resource", "reports/*"),
//!     RuleRecord::new()
//!         .with("id", 1)
//!         .with("effect", "ALLOW")
//!         .with("description", "admins read reports")
//!         .with("subject", ".role IS admin")
//!         .with("resource", "reports/*"),
//! ];
//! let engine = PolicyEngine::compile(&records).unwrap();
//!
//! let ctx = RequestContext::new()
//!     .with("subject", AttributeMap::new("alice").with("role", "admin"))
//!     .with("resource", "reports/q3");
//! let decision = engine.decide(&ctx);
//! assert_eq!(decision.effect, Effect::Allow);
//! assert_eq!(decision.reason.as_deref(), Some("admins read reports (score = 1.50)"));
//! ```
//!
//! # Modules
//!
//! - [`attribute`]: values, attribute providers and request contexts.
//! - [`expr`]: the matcher expression tree and its specificity semantics.
//! - [`parse`]: tokenizer and recursive-descent compiler for matchers.
//! - [`rule`]: rule records and compiled [`PolicyRule`]s.
//! - [`engine`]: the decision engine.
//! - [`ir`]: decision and trace types.

pub mod attribute;
pub mod engine;
pub mod error;
pub mod expr;
pub mod ir;
pub mod parse;
pub mod rule;

pub use attribute::{AttributeMap, AttributeProvider, Attributes, RequestContext, Value};
pub use engine::{DEFAULT_EFFECT, PolicyEngine, decide};
pub use error::{MatcherError, ParseError, PolicyError, RuleError, TokenKind};
pub use expr::{Expr, StringPattern};
pub use ir::{DecisionTrace, FinalConflict, GroupResolution, PolicyDecision, RuleMatch, RuleSkip};
pub use parse::{MAX_NESTING, compile, compile_list};
pub use rule::{Effect, PolicyRule, RecordValue, RuleRecord};
