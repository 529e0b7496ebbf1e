//! Display formatting for transformed values
//!
//! Three pattern forms are recognized:
//!
//! - Decimal patterns (`0`, `00`, `0.00`): the integer zeros set the
//!   minimum width, the fractional zeros set the decimal places. A
//!   pattern with no decimal places truncates toward negative infinity,
//!   so `0` on `1922.91` gives `"1922"`.
//! - `{value}`: substitutes the value's plain string form.
//! - `{<expr>}`: substitutes the result of a transform expression with
//!   `value` bound, embedded in surrounding literal text. Multiple
//!   groups are allowed.
//!
//! Anything else fails to compile; callers fall back to the value's
//! plain string form. Formatting itself is total and never fails.

use crate::transform::expr::{CompiledExpr, ExprError};
use crate::types::Value;
use thiserror::Error;

/// Errors from compiling a format pattern
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// The pattern is empty
    #[error("empty format pattern")]
    Empty,

    /// The pattern is neither a decimal pattern nor a brace template
    #[error("'{0}' is not a recognized format pattern")]
    NotAPattern(String),

    /// A `{` without a matching `}` (or the reverse)
    #[error("unmatched brace in format pattern")]
    UnmatchedBrace,

    /// An embedded expression failed to compile
    #[error("bad expression in format pattern: {0}")]
    BadExpr(#[from] ExprError),
}

/// One piece of a compiled brace template
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    /// Literal text copied through
    Literal(String),
    /// The `{value}` placeholder, keeping text values textual
    ValueRef,
    /// An embedded expression over `value`
    Expr(CompiledExpr),
}

/// A compiled format pattern
#[derive(Debug, Clone, PartialEq)]
pub enum FormatSpec {
    /// A `0` / `0.00` style decimal pattern
    Decimal {
        /// Minimum digits in the integer part (zero padded)
        width: usize,
        /// Decimal places; `None` truncates to an integer
        places: Option<usize>,
    },
    /// Literal text with embedded `{...}` groups
    Template(Vec<Segment>),
}

impl FormatSpec {
    /// Compile a format pattern string
    pub fn compile(pattern: &str) -> Result<FormatSpec, FormatError> {
        if pattern.is_empty() {
            return Err(FormatError::Empty);
        }
        if let Some(spec) = parse_decimal_pattern(pattern) {
            return Ok(spec);
        }
        if pattern.contains('{') || pattern.contains('}') {
            return parse_template(pattern);
        }
        Err(FormatError::NotAPattern(pattern.to_string()))
    }

    /// Render a value through this pattern; total, never fails
    pub fn format(&self, value: &Value) -> String {
        match self {
            FormatSpec::Decimal { width, places } => {
                let n = value.as_number();
                match places {
                    None => {
                        // saturating cast keeps huge and non-finite inputs total
                        let whole = n.floor() as i64;
                        format!("{:0width$}", whole, width = width)
                    }
                    Some(places) => format!(
                        "{:0total$.places$}",
                        n,
                        total = width + 1 + places,
                        places = places
                    ),
                }
            }
            FormatSpec::Template(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::ValueRef => out.push_str(&value.to_string()),
                        Segment::Expr(expr) => {
                            let result = expr.eval(value.as_number());
                            out.push_str(&Value::Number(result).to_string());
                        }
                    }
                }
                out
            }
        }
    }
}

/// Parse `0`, `000`, `0.00` style patterns
fn parse_decimal_pattern(pattern: &str) -> Option<FormatSpec> {
    let (int_part, frac_part) = match pattern.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (pattern, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b == b'0') {
        return None;
    }
    let places = match frac_part {
        None => None,
        Some(f) if !f.is_empty() && f.bytes().all(|b| b == b'0') => Some(f.len()),
        Some(_) => return None,
    };

    Some(FormatSpec::Decimal {
        width: int_part.len(),
        places,
    })
}

/// Parse a template with embedded `{...}` groups
fn parse_template(pattern: &str) -> Result<FormatSpec, FormatError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(FormatError::UnmatchedBrace),
                        Some(c) => inner.push(c),
                        None => return Err(FormatError::UnmatchedBrace),
                    }
                }
                if inner.trim() == "value" {
                    segments.push(Segment::ValueRef);
                } else {
                    segments.push(Segment::Expr(CompiledExpr::compile(&inner)?));
                }
            }
            '}' => return Err(FormatError::UnmatchedBrace),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    if segments.is_empty() {
        return Err(FormatError::Empty);
    }
    Ok(FormatSpec::Template(segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(pattern: &str, value: f64) -> String {
        FormatSpec::compile(pattern)
            .unwrap()
            .format(&Value::Number(value))
    }

    #[test]
    fn test_bare_zero_truncates() {
        assert_eq!(fmt("0", 1922.91), "1922");
        assert_eq!(fmt("0", 0.99), "0");
        assert_eq!(fmt("0", -1922.91), "-1923");
    }

    #[test]
    fn test_decimal_places_round() {
        assert_eq!(fmt("0.00", 1922.91), "1922.91");
        assert_eq!(fmt("0.0", 1922.91), "1922.9");
        assert_eq!(fmt("0.00", 5.0), "5.00");
        assert_eq!(fmt("0.0", 0.25), "0.2");
        assert_eq!(fmt("0.0", 0.35), "0.3");
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(fmt("000", 42.0), "042");
        assert_eq!(fmt("000", 1234.0), "1234");
        assert_eq!(fmt("00.0", 5.25), "05.2");
    }

    #[test]
    fn test_value_placeholder() {
        assert_eq!(fmt("{value}", 1922.91), "1922.91");
        assert_eq!(fmt("{value}", 1922.0), "1922");
    }

    #[test]
    fn test_value_placeholder_keeps_text() {
        let spec = FormatSpec::compile("{value}").unwrap();
        assert_eq!(spec.format(&Value::Text("3rd".to_string())), "3rd");
    }

    #[test]
    fn test_embedded_expression() {
        assert_eq!(fmt("{floor(value)}", 3.7), "3");
        assert_eq!(fmt("{value * 2}", 21.0), "42");
    }

    #[test]
    fn test_template_with_literals() {
        assert_eq!(fmt("gear {floor(value)} of 6", 3.9), "gear 3 of 6");
        assert_eq!(fmt("{value}%", 85.0), "85%");
    }

    #[test]
    fn test_multiple_groups() {
        assert_eq!(fmt("{floor(value)}:{value % 10}", 42.0), "42:2");
    }

    #[test]
    fn test_text_coerces_for_decimal_patterns() {
        let spec = FormatSpec::compile("0.0").unwrap();
        assert_eq!(spec.format(&Value::Text("12.34".to_string())), "12.3");
        assert_eq!(spec.format(&Value::Text("junk".to_string())), "0.0");
    }

    #[test]
    fn test_non_pattern_rejected() {
        assert_eq!(
            FormatSpec::compile("RPM"),
            Err(FormatError::NotAPattern("RPM".to_string()))
        );
        assert_eq!(FormatSpec::compile(""), Err(FormatError::Empty));
    }

    #[test]
    fn test_unmatched_braces_rejected() {
        assert_eq!(
            FormatSpec::compile("{value"),
            Err(FormatError::UnmatchedBrace)
        );
        assert_eq!(
            FormatSpec::compile("value}"),
            Err(FormatError::UnmatchedBrace)
        );
        assert_eq!(
            FormatSpec::compile("{{value}}"),
            Err(FormatError::UnmatchedBrace)
        );
    }

    #[test]
    fn test_bad_expression_rejected() {
        assert!(matches!(
            FormatSpec::compile("{rpm * 2}"),
            Err(FormatError::BadExpr(_))
        ));
    }

    #[test]
    fn test_non_finite_is_total() {
        assert_eq!(fmt("0", f64::NAN), "0");
        let spec = FormatSpec::compile("{value / 0}").unwrap();
        // Still produces a string, never panics
        let _ = spec.format(&Value::Number(1.0));
    }

    #[test]
    fn test_mixed_pattern_is_not_decimal() {
        // "0x0" has a non-zero char, so it is not a decimal pattern
        assert_eq!(
            FormatSpec::compile("0x0"),
            Err(FormatError::NotAPattern("0x0".to_string()))
        );
    }
}
