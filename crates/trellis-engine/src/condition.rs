//! Branch-condition evaluation.
//!
//! Conditions are resolved through the variable resolver and then matched
//! against a restricted equality grammar: `"A" == "B"` (both operands
//! quoted) or `A == "B"` (bare left operand). Anything else is
//! unsupported and treated as false.

use crate::resolver::resolve_template;
use crate::store::OutputStore;

/// Result of matching a resolved condition against the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    True,
    False,
    /// The resolved text matched neither supported comparison shape.
    Unsupported,
}

impl Verdict {
    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

/// A condition evaluation, carrying the resolved text for logging.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub resolved: String,
    /// Token spans the resolver left verbatim.
    pub unresolved: Vec<String>,
}

/// Evaluate a raw condition string against the output store.
pub fn evaluate_condition(condition: &str, store: &OutputStore) -> Evaluation {
    let resolution = resolve_template(condition, store);
    let text = resolution.text.trim();

    let verdict = match compare(text) {
        Some(equal) => {
            if equal {
                Verdict::True
            } else {
                Verdict::False
            }
        }
        None => Verdict::Unsupported,
    };

    Evaluation {
        verdict,
        resolved: text.to_string(),
        unresolved: resolution.unresolved,
    }
}

/// Match the two supported comparison shapes, returning the equality
/// outcome, or `None` when the text fits neither.
fn compare(text: &str) -> Option<bool> {
    let (lhs, rhs) = text.split_once(" == ")?;
    let rhs = strip_quoted(rhs)?;

    // `"A" == "B"`
    if let Some(lhs) = strip_quoted(lhs) {
        return Some(lhs == rhs);
    }

    // `A == "B"` — bare left operand, no whitespace or `=` in it
    if !lhs.is_empty() && !lhs.contains(['=', ' ', '\t']) {
        return Some(lhs == rhs);
    }

    None
}

/// Strip one pair of surrounding double quotes, rejecting interior quotes.
fn strip_quoted(s: &str) -> Option<&str> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    if inner.contains('"') {
        None
    } else {
        Some(inner)
    }
}
