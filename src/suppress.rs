//! Diff-suppression rules.
//!
//! The Service does not round-trip every representation it accepts: it
//! case-folds unquoted identifiers, reflows statement text, and echoes
//! defaults it assigned itself. Each rule here is a pure, total predicate
//! `suppress(prior, planned, remote) -> bool`; when any rule in an
//! attribute's chain fires, the planner treats the two values as equal.
//!
//! Rules compose by logical OR and are reflexive (`suppress(x, x)` is
//! always true through [`SuppressionChain::suppressed`], which short-circuits
//! on raw equality) and symmetric in their two compared arguments.

use serde_json::Value;

use crate::ident::ObjectIdentifier;
use crate::value::{eq_ignore_case, statements_equal};

/// A diff-suppression predicate. `remote` is the last-read remote value for
/// the attribute, where one is available.
pub type SuppressFn = fn(prior: &Value, planned: &Value, remote: Option<&Value>) -> bool;

/// A conditional force-recreate predicate, evaluated on a detected change.
pub type RecreateFn = fn(prior: &Value, planned: &Value) -> bool;

/// An ordered, OR-reduced list of suppression predicates.
#[derive(Debug, Clone, Default)]
pub struct SuppressionChain {
    rules: Vec<SuppressFn>,
}

impl SuppressionChain {
    /// An empty chain: only raw equality suppresses.
    pub fn none() -> Self {
        Self::default()
    }

    /// A chain with a single rule.
    pub fn of(rule: SuppressFn) -> Self {
        Self { rules: vec![rule] }
    }

    /// Append a rule to the chain.
    pub fn or(mut self, rule: SuppressFn) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the chain: raw equality first, then each rule in order.
    pub fn suppressed(&self, prior: &Value, planned: &Value, remote: Option<&Value>) -> bool {
        if prior == planned {
            return true;
        }
        self.rules
            .iter()
            .any(|rule| rule(prior, planned, remote))
    }
}

/// Suppress quoting-only differences between identifiers: both sides parse
/// as qualified names and their canonical forms match.
pub fn identifier_quoting(prior: &Value, planned: &Value, _remote: Option<&Value>) -> bool {
    match (prior.as_str(), planned.as_str()) {
        (Some(a), Some(b)) => match (ObjectIdentifier::parse(a), ObjectIdentifier::parse(b)) {
            (Ok(a), Ok(b)) => a.same_object(&b),
            _ => false,
        },
        _ => false,
    }
}

/// Suppress whitespace-and-case-only differences in SQL text.
pub fn statement_whitespace(prior: &Value, planned: &Value, _remote: Option<&Value>) -> bool {
    match (prior.as_str(), planned.as_str()) {
        (Some(a), Some(b)) => statements_equal(a, b),
        _ => false,
    }
}

/// Suppress case-only differences in enum spellings.
pub fn enum_normalization(prior: &Value, planned: &Value, _remote: Option<&Value>) -> bool {
    match (prior.as_str(), planned.as_str()) {
        (Some(a), Some(b)) => eq_ignore_case(a, b),
        _ => false,
    }
}

/// Suppress a planned change whose new value already matches the remote
/// snapshot. Applied to fields whose value the Service assigns itself, so
/// an adopted default does not produce an eternal diff.
pub fn ignore_change_to_remote_value(
    _prior: &Value,
    planned: &Value,
    remote: Option<&Value>,
) -> bool {
    remote.map(|r| r == planned).unwrap_or(false)
}

/// Conditional recreate: the Service offers SET but no UNSET for this
/// field, so clearing a previously non-empty string requires replacement.
pub fn recreate_on_empty_string(prior: &Value, planned: &Value) -> bool {
    let prior_set = prior.as_str().map(|s| !s.is_empty()).unwrap_or(false);
    let planned_empty = match planned {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    prior_set && planned_empty
}

/// Conditional recreate for set-valued fields the Service cannot unset:
/// fires on the non-empty → empty transition.
pub fn recreate_on_empty_set(prior: &Value, planned: &Value) -> bool {
    let prior_set = prior.as_array().map(|a| !a.is_empty()).unwrap_or(false);
    let planned_empty = match planned {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        _ => false,
    };
    prior_set && planned_empty
}
