//! Build configuration class expressions.
//!
//! An expression is a whitespace-separated sequence of terms, optionally
//! preceded by an underlying class set and a `:` separator. Each term is an
//! operation (`+`, `-`, or `&`), an optional `!` inversion, and either a
//! class name or a parenthesized nested expression. Matching evaluates the
//! terms left to right against a boolean accumulator, with class names
//! matching directly or through the inheritance map.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PkgmetaError, Result};

/// Map of derived build classes to their bases.
pub type BuildClassInheritanceMap = BTreeMap<String, String>;

fn expr_error(description: impl Into<String>) -> PkgmetaError {
    PkgmetaError::BuildClassExpr(description.into())
}

/// Check that the string is a valid class name: non-empty, alpha-numeric
/// plus `_`, `+`, `-`, `.` (the last three not as the first character).
/// Return whether the name is reserved (starts with `_`).
pub fn validate_class_name(s: &str) -> Result<bool> {
    if s.is_empty() {
        return Err(expr_error("empty class name"));
    }

    let bytes = s.as_bytes();
    let c = bytes[0] as char;

    if !c.is_ascii_alphanumeric() && c != '_' {
        return Err(expr_error(format!(
            "class name '{s}' starts with '{c}'"
        )));
    }

    for &b in &bytes[1..] {
        let c = b as char;
        if !c.is_ascii_alphanumeric() && !matches!(c, '+' | '-' | '_' | '.') {
            return Err(expr_error(format!(
                "class name '{s}' contains '{c}'"
            )));
        }
    }

    Ok(s.starts_with('_'))
}

/// A term operand: a simple class name or a nested expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildClassOperand {
    Name(String),
    Expr(Vec<BuildClassTerm>),
}

/// One term of a build class expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildClassTerm {
    /// `'+'`, `'-'`, or `'&'`.
    pub operation: char,
    /// Whether the operation is followed by `!`.
    pub inverted: bool,
    pub operand: BuildClassOperand,
}

// Parse a term sequence from the token stream. Nested sequences are
// terminated by the closing parenthesis token.
fn parse_terms(
    tokens: &[&str],
    pos: &mut usize,
    root: bool,
) -> Result<Vec<BuildClassTerm>> {
    let mut r = Vec::new();

    loop {
        let t = match tokens.get(*pos) {
            Some(&t) => t,
            None => {
                if !root {
                    return Err(expr_error(
                        "nested class expression must be closed with ')'",
                    ));
                }
                break;
            }
        };
        *pos += 1;

        if t == ")" {
            if root {
                return Err(expr_error(
                    "class term expected instead of ')'",
                ));
            }

            if r.is_empty() {
                return Err(expr_error("empty nested class expression"));
            }

            return Ok(r);
        }

        let op = t.as_bytes()[0] as char;

        if op != '+' {
            if op != '-' && op != '&' {
                return Err(expr_error(format!(
                    "class term '{t}' must start with '+', '-', or '&'"
                )));
            }

            // Only the root expression may start with a term having the
            // '-' or '&' operation.
            if r.is_empty() && !root {
                return Err(expr_error(format!(
                    "class term '{t}' must start with '+'"
                )));
            }
        }

        let inverted = t.as_bytes().get(1) == Some(&b'!');
        let name = &t[if inverted { 2 } else { 1 }..];

        let operand = if name == "(" {
            BuildClassOperand::Expr(parse_terms(tokens, pos, false)?)
        } else {
            validate_class_name(name)?;
            BuildClassOperand::Name(name.to_string())
        };

        r.push(BuildClassTerm {
            operation: op,
            inverted,
            operand,
        });
    }

    Ok(r)
}

fn terms_to_string(expr: &[BuildClassTerm]) -> String {
    let mut r = String::new();

    for t in expr {
        if !r.is_empty() {
            r.push(' ');
        }

        r.push(t.operation);

        if t.inverted {
            r.push('!');
        }

        match &t.operand {
            BuildClassOperand::Name(n) => r.push_str(n),
            BuildClassOperand::Expr(e) => {
                r.push_str("( ");
                r.push_str(&terms_to_string(e));
                r.push_str(" )");
            }
        }
    }

    r
}

// Match the configuration classes against a term sequence, updating the
// accumulated result. A term that cannot change the accumulator is skipped
// ('+' can only flip false to true, '-' and '&' true to false); this is
// observationally equivalent to full evaluation.
fn match_terms(
    classes: &[String],
    inheritance: &BuildClassInheritanceMap,
    expr: &[BuildClassTerm],
    result: &mut bool,
) {
    for t in expr {
        if (t.operation == '+') == *result {
            continue;
        }

        let mut m = false;

        match &t.operand {
            BuildClassOperand::Name(name) => {
                // Check whether any of the classes or their bases match.
                for c in classes {
                    m = c == name;

                    if !m {
                        let mut base = inheritance.get(c);
                        while let Some(b) = base {
                            if b == name {
                                m = true;
                                break;
                            }
                            base = inheritance.get(b);
                        }
                    }

                    if m {
                        break;
                    }
                }
            }
            BuildClassOperand::Expr(e) => {
                match_terms(classes, inheritance, e, &mut m);
            }
        }

        if t.inverted {
            m = !m;
        }

        match t.operation {
            '+' => {
                if m {
                    *result = true;
                }
            }
            '-' => {
                if m {
                    *result = false;
                }
            }
            '&' => *result &= m,
            _ => unreachable!(),
        }
    }
}

/// Build configuration class expression with a comment and an optional
/// underlying class set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildClassExpr {
    pub comment: String,
    pub underlying_classes: Vec<String>,
    pub expr: Vec<BuildClassTerm>,
}

impl BuildClassExpr {
    /// Parse the space-separated expression representation, potentially
    /// prepended with a space-separated underlying class set, separated
    /// from the expression with `:`.
    ///
    /// Examples: `+gcc`, `-msvc -clang`, `default legacy`,
    /// `default legacy : -msvc`.
    pub fn parse(s: &str, comment: impl Into<String>) -> Result<Self> {
        let tokens: Vec<&str> = s.split_whitespace().collect();

        let mut underlying_classes = Vec::new();
        let mut pos = 0;

        // Parse the underlying classes until an expression term, ':', or
        // the end of the input.
        while let Some(&t) = tokens.get(pos) {
            let c = t.as_bytes()[0] as char;

            if c == '+' || c == '-' || c == '&' {
                // The expression must be separated with ':' from the
                // underlying classes.
                if !underlying_classes.is_empty() {
                    return Err(expr_error(
                        "class expression separator ':' expected",
                    ));
                }
                break;
            } else if t == ":" {
                // The ':' separator must follow the underlying class set.
                if underlying_classes.is_empty() {
                    return Err(expr_error("underlying class set expected"));
                }
                pos += 1;
                break;
            }

            validate_class_name(t)?;
            underlying_classes.push(t.to_string());
            pos += 1;
        }

        let expr = parse_terms(&tokens, &mut pos, true)?;

        if expr.is_empty() && underlying_classes.is_empty() {
            return Err(expr_error("empty class expression"));
        }

        Ok(Self {
            comment: comment.into(),
            underlying_classes,
            expr,
        })
    }

    /// Create an expression from a class list using the specified
    /// operation: `+` and `-` produce per-class terms; `&` produces a
    /// single term with a nested per-class `+` expression.
    ///
    /// The class names are assumed valid.
    pub fn from_classes(
        classes: &[String],
        operation: char,
        comment: impl Into<String>,
    ) -> Self {
        let mut terms: Vec<BuildClassTerm> = classes
            .iter()
            .map(|c| BuildClassTerm {
                operation: if operation == '-' { '-' } else { '+' },
                inverted: false,
                operand: BuildClassOperand::Name(c.clone()),
            })
            .collect();

        if operation == '&' && !terms.is_empty() {
            terms = vec![BuildClassTerm {
                operation: '&',
                inverted: false,
                operand: BuildClassOperand::Expr(terms),
            }];
        }

        Self {
            comment: comment.into(),
            underlying_classes: Vec::new(),
            expr: terms,
        }
    }

    /// Match a build configuration that belongs to the specified classes
    /// (and recursively to their bases) against the expression, updating
    /// the accumulated result.
    ///
    /// The underlying class set does not affect the match; the
    /// inheritance map is not verified for cycles.
    pub fn match_classes(
        &self,
        classes: &[String],
        inheritance: &BuildClassInheritanceMap,
        result: &mut bool,
    ) {
        match_terms(classes, inheritance, &self.expr, result);
    }

    /// Match with an initially-false accumulator.
    pub fn matches(
        &self,
        classes: &[String],
        inheritance: &BuildClassInheritanceMap,
    ) -> bool {
        let mut r = false;
        self.match_classes(classes, inheritance, &mut r);
        r
    }
}

impl fmt::Display for BuildClassExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut r = self.underlying_classes.join(" ");

        if !self.expr.is_empty() {
            if !r.is_empty() {
                r.push_str(" : ");
            }
            r.push_str(&terms_to_string(&self.expr));
        }

        write!(f, "{r}")
    }
}
