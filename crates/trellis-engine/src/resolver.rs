//! Variable resolution for prompt, context, and condition templates.
//!
//! A template contains `{nodeId.field.subfield}` tokens resolved against
//! the run's output store. Tokens follow a small grammar — `{` identifier
//! (`.` identifier)* `}` — parsed once per template; anything that does
//! not match stays literal text.

use serde_json::Value;

use crate::store::OutputStore;

/// A parsed template, ready to resolve against any output store.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Token {
        /// The original `{...}` span, emitted verbatim when unresolved.
        raw: String,
        node: String,
        path: Vec<String>,
    },
}

/// Outcome of resolving a template.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub text: String,
    /// Token spans left verbatim because the node output or a path
    /// segment was absent. Informational, never an error.
    pub unresolved: Vec<String>,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a token body against the grammar, splitting into node id and
/// field path.
fn parse_token_body(body: &str) -> Option<(String, Vec<String>)> {
    let mut segments = body.split('.');
    let node = segments.next()?;
    if node.is_empty() || !node.chars().all(is_ident_char) {
        return None;
    }
    let mut path = Vec::new();
    for segment in segments {
        if segment.is_empty() || !segment.chars().all(is_ident_char) {
            return None;
        }
        path.push(segment.to_string());
    }
    Some((node.to_string(), path))
}

impl Template {
    /// Parse a template string into literal and token parts.
    pub fn parse(input: &str) -> Self {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            let (before, from_brace) = rest.split_at(open);
            literal.push_str(before);

            match from_brace.find('}') {
                Some(close) => {
                    let body = &from_brace[1..close];
                    match parse_token_body(body) {
                        Some((node, path)) => {
                            if !literal.is_empty() {
                                parts.push(Part::Literal(std::mem::take(&mut literal)));
                            }
                            parts.push(Part::Token {
                                raw: from_brace[..=close].to_string(),
                                node,
                                path,
                            });
                        }
                        None => {
                            // Malformed span stays literal
                            literal.push_str(&from_brace[..=close]);
                        }
                    }
                    rest = &from_brace[close + 1..];
                }
                None => {
                    // Unclosed brace: the remainder is literal
                    literal.push_str(from_brace);
                    rest = "";
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Self { parts }
    }

    /// Resolve the template against an output store.
    ///
    /// String values are wrapped in double quotes so they compose as
    /// operands in equality comparisons; other values use their canonical
    /// JSON text form. Pure: the store is never mutated.
    pub fn resolve(&self, store: &OutputStore) -> Resolution {
        let mut out = Resolution::default();

        for part in &self.parts {
            match part {
                Part::Literal(text) => out.text.push_str(text),
                Part::Token { raw, node, path } => {
                    // A bare `{node}` token carries no field path and is
                    // never substituted.
                    let value = if path.is_empty() {
                        None
                    } else {
                        store.lookup(node, path)
                    };
                    match value {
                        Some(value) => out.text.push_str(&render(value)),
                        None => {
                            out.text.push_str(raw);
                            out.unresolved.push(raw.clone());
                        }
                    }
                }
            }
        }

        out
    }

    pub fn has_tokens(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Token { .. }))
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// Parse and resolve in one step.
pub fn resolve_template(input: &str, store: &OutputStore) -> Resolution {
    Template::parse(input).resolve(store)
}
