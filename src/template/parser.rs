//! Tokenizer for template expressions.
//!
//! Splits a string into literal text and placeholder segments. Parsing is
//! purely syntactic; lookups happen in [`super::Template::render`].

use crate::error::ResolutionError;

/// Operator attached to an environment placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOp {
    /// `${VAR}`
    Plain,
    /// `${VAR:-default}`
    Default(String),
    /// `${VAR:?message}`
    Required(String),
    /// `${VAR:+value}`
    Alternate(String),
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Instance {
        path: String,
        default: Option<String>,
    },
    Cli {
        name: String,
        default: Option<String>,
    },
    Env {
        var: String,
        op: EnvOp,
    },
}

/// Parses an expression into segments, left to right.
pub fn parse(expr: &str) -> Result<Vec<Segment>, ResolutionError> {
    let bytes = expr.as_bytes();
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let placeholder = if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let close = find_close(expr, i + 2, i)?;
            Some((parse_env(&expr[i + 2..close], &expr[i..=close])?, close))
        } else if bytes[i] == b'{' && has_scoped_prefix(&expr[i + 1..]) {
            let close = find_close(expr, i + 1, i)?;
            Some((parse_scoped(&expr[i + 1..close], &expr[i..=close])?, close))
        } else {
            None
        };

        match placeholder {
            Some((segment, close)) => {
                if literal_start < i {
                    segments.push(Segment::Literal(expr[literal_start..i].to_string()));
                }
                segments.push(segment);
                i = close + 1;
                literal_start = i;
            }
            None => i += 1,
        }
    }

    if literal_start < expr.len() {
        segments.push(Segment::Literal(expr[literal_start..].to_string()));
    }

    Ok(segments)
}

/// Finds the closing brace for a placeholder opened at `open`.
fn find_close(expr: &str, from: usize, open: usize) -> Result<usize, ResolutionError> {
    expr[from..]
        .find('}')
        .map(|offset| from + offset)
        .ok_or_else(|| ResolutionError::UnknownPlaceholderKind {
            placeholder: expr[open..].to_string(),
            reason: "unterminated placeholder".to_string(),
        })
}

/// True when text after `{` starts with `identifier.`; anything else is literal.
fn has_scoped_prefix(rest: &str) -> bool {
    let ident_len = identifier_len(rest);
    ident_len > 0 && rest.as_bytes().get(ident_len) == Some(&b'.')
}

fn identifier_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    if bytes.is_empty() || !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
        return 0;
    }
    bytes
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count()
}

/// Parses the inside of `{scope.rest}`.
fn parse_scoped(body: &str, raw: &str) -> Result<Segment, ResolutionError> {
    let (kind, rest) = body.split_once('.').unwrap_or((body, ""));
    let (target, default) = match rest.split_once(':') {
        Some((target, default)) => (target, Some(default.to_string())),
        None => (rest, None),
    };

    if target.is_empty() || target.split('.').any(str::is_empty) {
        return Err(ResolutionError::UnknownPlaceholderKind {
            placeholder: raw.to_string(),
            reason: "empty lookup path".to_string(),
        });
    }

    match kind {
        "instance" => Ok(Segment::Instance {
            path: target.to_string(),
            default,
        }),
        "cli" => Ok(Segment::Cli {
            name: target.to_string(),
            default,
        }),
        other => Err(ResolutionError::UnknownPlaceholderKind {
            placeholder: raw.to_string(),
            reason: format!("unknown scope '{}'", other),
        }),
    }
}

/// Parses the inside of `${...}`.
fn parse_env(body: &str, raw: &str) -> Result<Segment, ResolutionError> {
    let var_len = identifier_len(body);
    if var_len == 0 {
        return Err(ResolutionError::UnknownPlaceholderKind {
            placeholder: raw.to_string(),
            reason: "invalid variable name".to_string(),
        });
    }

    let var = body[..var_len].to_string();
    let rest = &body[var_len..];
    if rest.is_empty() {
        return Ok(Segment::Env {
            var,
            op: EnvOp::Plain,
        });
    }

    let op = match rest.get(..2) {
        Some(":-") => EnvOp::Default(rest[2..].to_string()),
        Some(":?") => EnvOp::Required(rest[2..].to_string()),
        Some(":+") => EnvOp::Alternate(rest[2..].to_string()),
        _ => {
            return Err(ResolutionError::UnknownPlaceholderKind {
                placeholder: raw.to_string(),
                reason: format!("unsupported operator in '{}'", rest),
            })
        }
    };

    Ok(Segment::Env { var, op })
}
