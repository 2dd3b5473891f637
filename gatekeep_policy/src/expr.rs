//! Matcher expression tree.
//!
//! Every node evaluates against an [`AttributeProvider`] and reports a
//! specificity in `[0, 1]`: how narrowly the predicate constrains the values
//! it accepts. Specificity orders competing rules; it never affects truth.

use std::fmt;

use regex::Regex;

use crate::attribute::{AttributeProvider, Value};
use crate::error::MatcherError;

/// A compiled matcher expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Constant(bool),
    Pattern(StringPattern),
    Attribute(String),
    Is(Box<Expr>, Box<Expr>),
    Has(Box<Expr>, Box<Expr>),
    AnyOf(Box<Expr>, Box<Expr>),
    AllOf(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn pattern(pattern: &str) -> Result<Self, MatcherError> {
        Ok(Expr::Pattern(StringPattern::new(pattern)?))
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Expr::Attribute(name.into())
    }

    pub fn is(a: Expr, b: Expr) -> Self {
        Expr::Is(Box::new(a), Box::new(b))
    }

    pub fn has(a: Expr, b: Expr) -> Self {
        Expr::Has(Box::new(a), Box::new(b))
    }

    pub fn any_of(a: Expr, b: Expr) -> Self {
        Expr::AnyOf(Box::new(a), Box::new(b))
    }

    pub fn all_of(a: Expr, b: Expr) -> Self {
        Expr::AllOf(Box::new(a), Box::new(b))
    }

    pub fn negate(x: Expr) -> Self {
        Expr::Not(Box::new(x))
    }

    /// The matcher no value satisfies: `NOT *`.
    pub fn never() -> Self {
        Expr::negate(Expr::Pattern(StringPattern::any()))
    }

    pub fn evaluate(&self, provider: &AttributeProvider) -> Value {
        match self {
            Expr::Constant(b) => Value::Bool(*b),
            Expr::Pattern(p) => Value::Bool(p.matches(&provider.as_string())),
            Expr::Attribute(name) => provider.get_attribute(name),
            Expr::Is(a, b) => {
                let lhs = a.evaluate(provider).to_match_string();
                b.evaluate(&AttributeProvider::Str(lhs))
            }
            Expr::Has(a, b) => match a.evaluate(provider) {
                Value::List(items) => Value::Bool(
                    items
                        .into_iter()
                        .any(|item| b.evaluate(&AttributeProvider::Str(item)) == Value::Bool(true)),
                ),
                _ => Value::Bool(false),
            },
            Expr::AnyOf(..) => Value::Bool(self.operands().any(|e| e.matches(provider))),
            Expr::AllOf(..) => Value::Bool(self.operands().all(|e| e.matches(provider))),
            Expr::Not(x) => Value::Bool(!x.evaluate(provider).is_truthy()),
        }
    }

    /// Shorthand for `evaluate(..).is_truthy()`.
    pub fn matches(&self, provider: &AttributeProvider) -> bool {
        self.evaluate(provider).is_truthy()
    }

    pub fn specificity(&self) -> f64 {
        match self {
            Expr::Constant(_) => 0.0,
            Expr::Pattern(p) => p.specificity(),
            Expr::Attribute(_) => 0.5,
            Expr::Is(_, b) | Expr::Has(_, b) => b.specificity(),
            // An OR is only as specific as its most general branch.
            Expr::AnyOf(..) => self
                .operands()
                .map(Expr::specificity)
                .fold(f64::INFINITY, f64::min),
            Expr::AllOf(..) => self
                .operands()
                .map(Expr::specificity)
                .fold(f64::NEG_INFINITY, f64::max),
            Expr::Not(x) => 1.0 - x.specificity(),
        }
    }

    /// Operands of the right-nested run of `self`'s operator, left to right.
    ///
    /// `a OR b OR c` is `AnyOf(a, AnyOf(b, c))`; walking the run in a loop
    /// keeps long flat chains off the call stack. Only meaningful for
    /// `AnyOf`/`AllOf`; any other node yields itself.
    fn operands(&self) -> impl Iterator<Item = &Expr> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            match (self, current) {
                (Expr::AnyOf(..), Expr::AnyOf(a, b)) | (Expr::AllOf(..), Expr::AllOf(a, b)) => {
                    next = Some(&**b);
                    Some(&**a)
                }
                _ => {
                    next = None;
                    Some(current)
                }
            }
        })
    }

    /// Move the children out, leaving constants behind.
    fn detach_children(&mut self, out: &mut Vec<Expr>) {
        let take = |child: &mut Box<Expr>| std::mem::replace(&mut **child, Expr::Constant(false));
        match self {
            Expr::Is(a, b) | Expr::Has(a, b) | Expr::AnyOf(a, b) | Expr::AllOf(a, b) => {
                out.push(take(a));
                out.push(take(b));
            }
            Expr::Not(x) => out.push(take(x)),
            Expr::Constant(_) | Expr::Pattern(_) | Expr::Attribute(_) => {}
        }
    }

    /// Binding strength used when rendering; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Expr::AnyOf(..) => 1,
            Expr::AllOf(..) => 2,
            Expr::Not(_) => 3,
            Expr::Is(..) | Expr::Has(..) => 4,
            Expr::Constant(_) | Expr::Pattern(_) | Expr::Attribute(_) => 5,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

/// Renders the expression back to matcher grammar.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(true) => f.write_str("TRUE"),
            Expr::Constant(false) => f.write_str("FALSE"),
            Expr::Pattern(p) => f.write_str(p.as_str()),
            Expr::Attribute(name) => write!(f, ".{name}"),
            Expr::Is(a, b) | Expr::Has(a, b) => {
                let op = if matches!(self, Expr::Is(..)) { "IS" } else { "HAS" };
                a.fmt_operand(f, 5)?;
                write!(f, " {op} ")?;
                b.fmt_operand(f, 5)
            }
            Expr::AnyOf(..) | Expr::AllOf(..) => {
                let op = if matches!(self, Expr::AnyOf(..)) { " OR " } else { " AND " };
                for (i, operand) in self.operands().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    operand.fmt_operand(f, self.precedence() + 1)?;
                }
                Ok(())
            }
            Expr::Not(x) => {
                f.write_str("NOT ")?;
                x.fmt_operand(f, 4)
            }
        }
    }
}

/// Tears the tree down with an explicit stack so deep chains cannot
/// overflow the call stack.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut node) = pending.pop() {
            node.detach_children(&mut pending);
        }
    }
}

/// A literal or `*`-wildcard string pattern.
#[derive(Debug, Clone)]
pub struct StringPattern {
    pattern: String,
    stars: usize,
    regex: Option<Regex>,
}

impl StringPattern {
    pub fn new(pattern: &str) -> Result<Self, MatcherError> {
        let stars = pattern.matches('*').count();
        let regex = if stars == 0 {
            None
        } else {
            Some(glob_to_regex(pattern).map_err(|source| MatcherError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?)
        };
        Ok(Self {
            pattern: pattern.to_string(),
            stars,
            regex,
        })
    }

    /// The all-matching wildcard `*`.
    pub fn any() -> Self {
        Self {
            pattern: "*".to_string(),
            stars: 1,
            regex: None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, value: &str) -> bool {
        match &self.regex {
            _ if self.stars == 0 => value == self.pattern,
            Some(re) => re.is_match(value),
            None => true, // bare `*`
        }
    }

    pub fn specificity(&self) -> f64 {
        if self.stars == 0 {
            1.0
        } else if self.pattern == "*" {
            0.0
        } else {
            1.0 / (1.0 + self.stars as f64)
        }
    }
}

/// Anchored regex for a `*` glob; every other character matches literally.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^(?s:{body})$"))
}
