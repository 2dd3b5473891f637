//! Error types for matcher compilation and rule construction.

use std::fmt;

/// Kind of token the matcher tokenizer produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Literal,
    Attribute,
    And,
    Or,
    Not,
    Is,
    Has,
    True,
    False,
    LeftParen,
    RightParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Eof => "end of input",
            TokenKind::Literal => "literal",
            TokenKind::Attribute => "attribute",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Is => "IS",
            TokenKind::Has => "HAS",
            TokenKind::True => "TRUE",
            TokenKind::False => "FALSE",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
        };
        f.write_str(name)
    }
}

/// Grammar violation in a matcher string.
///
/// `consumed` and `remaining` split the input at the byte offset of the
/// unexpected token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected token {token}; `{consumed}` {{!}} `{remaining}`")]
pub struct ParseError {
    pub token: TokenKind,
    pub offset: usize,
    pub consumed: String,
    pub remaining: String,
}

impl ParseError {
    pub(crate) fn at(input: &str, offset: usize, token: TokenKind) -> Self {
        let offset = offset.min(input.len());
        Self {
            token,
            offset,
            consumed: input[..offset].to_string(),
            remaining: input[offset..].to_string(),
        }
    }
}

/// Error compiling a single matcher.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Error while turning a rule record into a [`PolicyRule`](crate::PolicyRule).
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid matcher for attribute '{attribute}': {source}")]
    Matcher {
        attribute: String,
        #[source]
        source: MatcherError,
    },

    #[error("matcher for attribute '{attribute}' must be a string or a list of strings, found {found}")]
    InvalidMatcherValue { attribute: String, found: String },

    #[error("invalid rule identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Error compiling a whole rule set.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("rule #{index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: RuleError,
    },
}

impl PolicyError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            PolicyError::Rule { source, .. } => match source {
                RuleError::Matcher { .. } => Some(
                    "matchers combine literals, `.attribute` lookups, TRUE/FALSE and parentheses \
                     with IS, HAS, NOT, AND, OR (e.g. `.role IS admin OR guest*`)"
                        .into(),
                ),
                RuleError::InvalidMatcherValue { .. } => {
                    Some("use a matcher string or a list of matcher strings".into())
                }
                RuleError::InvalidIdentifier(_) => Some("rule `id` must be an integer".into()),
            },
        }
    }
}
