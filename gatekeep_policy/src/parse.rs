//! Matcher grammar: tokenizer and recursive-descent compiler.
//!
//! Grammar (precedence low to high: OR, AND, NOT, IS/HAS, operand):
//!
//! ```text
//! expression := orExp
//! orExp      := andExp ( "OR" orExp )?
//! andExp     := andOp ( "AND" andExp )?
//! andOp      := "NOT" matchExp | matchExp
//! matchExp   := operand ( "IS" operand | "HAS" operand )?
//! operand    := LITERAL | ATTRIBUTE | "(" expression ")" | "TRUE" | "FALSE"
//! ```
//!
//! Literals are bare words (`*` is a wildcard); adjacent words merge into one
//! literal. Attributes are `.name`. Keywords are upper-case whole words.

use tracing::{Level, instrument, trace};

use crate::error::{MatcherError, ParseError, TokenKind};
use crate::expr::Expr;

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    /// Byte range in the source text.
    start: usize,
    end: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        "IS" => Some(TokenKind::Is),
        "HAS" => Some(TokenKind::Has),
        "TRUE" => Some(TokenKind::True),
        "FALSE" => Some(TokenKind::False),
        _ => None,
    }
}

/// `.` followed by a letter, then letters, digits, `_` or `-`.
fn is_attribute(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next() == Some('.')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }

        let kind = match ch {
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            _ => None,
        };
        if let Some(kind) = kind {
            tokens.push(Token {
                kind,
                start: i,
                end: i + 1,
            });
            continue;
        }

        // A word runs up to whitespace or a parenthesis.
        let start = i;
        let mut end = i + ch.len_utf8();
        while let Some(&(j, c)) = chars.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            end = j + c.len_utf8();
            chars.next();
        }
        let word = &input[start..end];

        let kind = keyword(word).unwrap_or(if is_attribute(word) {
            TokenKind::Attribute
        } else {
            TokenKind::Literal
        });

        // Adjacent literal words form one literal, spaces included.
        if kind == TokenKind::Literal
            && let Some(prev) = tokens.last_mut()
            && prev.kind == TokenKind::Literal
        {
            prev.end = end;
            continue;
        }

        tokens.push(Token { kind, start, end });
    }

    tokens
}

// ---------------------------------------------------------------------------
// Recursive descent
// ---------------------------------------------------------------------------

/// Deepest parenthesis nesting accepted; the parser recurses once per level.
pub const MAX_NESTING: usize = 64;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses around the cursor.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            tokens: tokenize(input),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn text(&self) -> &'a str {
        match self.tokens.get(self.pos) {
            Some(t) => &self.input[t.start..t.end],
            None => "",
        }
    }

    fn error(&self) -> ParseError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.input.len());
        ParseError::at(self.input, offset, self.peek())
    }

    fn eat(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.peek() != kind {
            return Err(self.error());
        }
        self.pos += 1;
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, MatcherError> {
        let expr = self.or_exp()?;
        if self.peek() != TokenKind::Eof {
            return Err(self.error().into());
        }
        Ok(expr)
    }

    // `or_exp`/`and_exp` loop over their operands instead of recursing on
    // the right-hand side, then fold into the same right-nested tree.
    fn or_exp(&mut self) -> Result<Expr, MatcherError> {
        let first = self.and_exp()?;
        let mut rest = Vec::new();
        while self.peek() == TokenKind::Or {
            self.eat(TokenKind::Or)?;
            rest.push(self.and_exp()?);
        }
        Ok(fold_right(first, rest, Expr::any_of))
    }

    fn and_exp(&mut self) -> Result<Expr, MatcherError> {
        let first = self.and_op()?;
        let mut rest = Vec::new();
        while self.peek() == TokenKind::And {
            self.eat(TokenKind::And)?;
            rest.push(self.and_op()?);
        }
        Ok(fold_right(first, rest, Expr::all_of))
    }

    fn and_op(&mut self) -> Result<Expr, MatcherError> {
        if self.peek() == TokenKind::Not {
            self.eat(TokenKind::Not)?;
            return Ok(Expr::negate(self.match_exp()?));
        }
        self.match_exp()
    }

    fn match_exp(&mut self) -> Result<Expr, MatcherError> {
        let lhs = self.operand()?;
        match self.peek() {
            TokenKind::Is => {
                self.eat(TokenKind::Is)?;
                Ok(Expr::is(lhs, self.operand()?))
            }
            TokenKind::Has => {
                self.eat(TokenKind::Has)?;
                Ok(Expr::has(lhs, self.operand()?))
            }
            _ => Ok(lhs),
        }
    }

    fn operand(&mut self) -> Result<Expr, MatcherError> {
        match self.peek() {
            TokenKind::Attribute => {
                let expr = Expr::attribute(&self.text()[1..]);
                self.eat(TokenKind::Attribute)?;
                Ok(expr)
            }
            TokenKind::Literal => {
                let expr = Expr::pattern(self.text())?;
                self.eat(TokenKind::Literal)?;
                Ok(expr)
            }
            TokenKind::LeftParen => {
                if self.depth >= MAX_NESTING {
                    return Err(self.error().into());
                }
                self.eat(TokenKind::LeftParen)?;
                self.depth += 1;
                let expr = self.or_exp()?;
                self.depth -= 1;
                self.eat(TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::True => {
                self.eat(TokenKind::True)?;
                Ok(Expr::Constant(true))
            }
            TokenKind::False => {
                self.eat(TokenKind::False)?;
                Ok(Expr::Constant(false))
            }
            _ => Err(self.error().into()),
        }
    }
}

/// `a, [b, c]` becomes `join(a, join(b, c))`.
fn fold_right(first: Expr, mut rest: Vec<Expr>, join: fn(Expr, Expr) -> Expr) -> Expr {
    let Some(mut acc) = rest.pop() else {
        return first;
    };
    while let Some(operand) = rest.pop() {
        acc = join(operand, acc);
    }
    join(first, acc)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compile one matcher string into an expression tree.
#[instrument(level = Level::TRACE)]
pub fn compile(input: &str) -> Result<Expr, MatcherError> {
    let expr = Parser::new(input).expression()?;
    trace!(%expr, specificity = expr.specificity(), "compiled matcher");
    Ok(expr)
}

/// Compile a list matcher: any element may match.
///
/// Elements are folded right into a chain of ORs. An empty list yields a
/// matcher nothing satisfies.
#[instrument(level = Level::TRACE)]
pub fn compile_list<S: AsRef<str> + std::fmt::Debug>(items: &[S]) -> Result<Expr, MatcherError> {
    let Some((first, rest)) = items.split_first() else {
        return Ok(Expr::never());
    };
    let first = compile(first.as_ref())?;
    let rest = rest
        .iter()
        .map(|item| compile(item.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fold_right(first, rest, Expr::any_of))
}
