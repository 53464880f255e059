//! Recursive validation of merged settings against per-kind rule trees.
//!
//! A rule tree is walked in lock-step with the settings document, depth-first
//! and in rule-declaration order. Validation is non-fail-fast: a single
//! [`validate`] call collects every problem in the document. The engine is
//! pure and total; it never mutates the settings and always returns a
//! (possibly empty) error list.
//!
//! Rule trees are static trees that may contain *dynamic* nodes
//! ([`RuleNode::NestedDynamic`]) whose child rule set is resolved at
//! evaluation time from sibling or parent state. This is how cross-field
//! rules (password-vs-key authentication, cross-reference checks) are
//! expressed without the evaluator ever reflecting over value shapes.

pub mod check;

use std::fmt::Display;

use serde_json::Value;

/// Outcome of a single leaf predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    /// `Pass` if `valid`, otherwise `Fail` with `message`.
    pub fn require(valid: bool, message: impl Into<String>) -> Self {
        if valid {
            Self::Pass
        } else {
            Self::Fail(message.into())
        }
    }
}

/// A leaf predicate, evaluated as `(value, parent object)`.
///
/// Absent fields are presented as [`Value::Null`]; predicates that do not
/// explicitly require presence must pass on null so that missing optional
/// fields short-circuit to "no error".
pub type Predicate = Box<dyn Fn(&Value, &Value) -> Verdict>;

/// Resolves a child rule set at evaluation time from `(value, parent)`.
pub type RuleThunk = Box<dyn Fn(&Value, &Value) -> RuleSet>;

/// One node of a rule tree.
pub enum RuleNode {
    /// Evaluate a predicate against the field's value.
    Leaf(Predicate),

    /// Descend into an object field with a fixed child rule set.
    Nested(RuleSet),

    /// Descend with a child rule set resolved at evaluation time. Applied to
    /// an object field like [`RuleNode::Nested`], or to every element of an
    /// array field like [`RuleNode::Each`].
    NestedDynamic(RuleThunk),

    /// Apply the same child rule set to every element of an array field,
    /// appending `[index]` to the path.
    Each(RuleSet),
}

/// An ordered set of rules for the fields of one object.
///
/// A field may carry several rules (for example an array-level cardinality
/// leaf next to an [`RuleNode::Each`] over its elements); they are evaluated
/// in declaration order.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<(String, RuleNode)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, field: impl Into<String>, node: RuleNode) -> Self {
        self.rules.push((field.into(), node));
        self
    }

    pub fn leaf(
        self,
        field: impl Into<String>,
        predicate: impl Fn(&Value, &Value) -> Verdict + 'static,
    ) -> Self {
        self.rule(field, RuleNode::Leaf(Box::new(predicate)))
    }

    pub fn nested(self, field: impl Into<String>, rules: Self) -> Self {
        self.rule(field, RuleNode::Nested(rules))
    }

    pub fn each(self, field: impl Into<String>, rules: Self) -> Self {
        self.rule(field, RuleNode::Each(rules))
    }

    pub fn dynamic(
        self,
        field: impl Into<String>,
        thunk: impl Fn(&Value, &Value) -> Self + 'static,
    ) -> Self {
        self.rule(field, RuleNode::NestedDynamic(Box::new(thunk)))
    }

    /// Registers a dynamic rule set over the *current* object rather than a
    /// child field: the thunk receives the object itself and its parent, and
    /// the resolved rules are evaluated at the current path.
    ///
    /// This is how rule sets whose shape depends on a sibling discriminant
    /// (password-vs-key authentication, use-existing flags) are attached at
    /// the level where the discriminant lives.
    pub fn dynamic_self(self, thunk: impl Fn(&Value, &Value) -> Self + 'static) -> Self {
        self.rule("", RuleNode::NestedDynamic(Box::new(thunk)))
    }
}

/// A single rule violation at a dot/bracket-qualified path, for example
/// `.nics[0].subnetName`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates `settings` against `rules`, returning every violation.
///
/// An empty result means the document is valid. The root object acts as its
/// own parent for top-level predicates.
pub fn validate(settings: &Value, rules: &RuleSet) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    walk(settings, settings, rules, "", &mut errors);
    tracing::debug!(error_count = errors.len(), "validated settings document");
    errors
}

fn walk(
    object: &Value,
    parent: &Value,
    rules: &RuleSet,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (field, node) in &rules.rules {
        // The empty field name addresses the current object itself
        // (see `RuleSet::dynamic_self`).
        let (value, field_path) = if field.is_empty() {
            (object, path.to_owned())
        } else {
            (
                object.get(field.as_str()).unwrap_or(&Value::Null),
                format!("{path}.{field}"),
            )
        };

        match node {
            RuleNode::Leaf(predicate) => {
                if let Verdict::Fail(message) = predicate(value, object) {
                    errors.push(ValidationError {
                        path: field_path,
                        message,
                    });
                }
            }
            RuleNode::Nested(child) => {
                if !value.is_null() {
                    walk(value, object, child, &field_path, errors);
                }
            }
            RuleNode::NestedDynamic(thunk) => {
                if value.is_null() {
                    continue;
                }
                // For a field node the thunk's parent is the containing
                // object; for a self node it is the object's own parent.
                let thunk_parent = if field.is_empty() { parent } else { object };
                let child = thunk(value, thunk_parent);
                match value {
                    Value::Array(elements) => {
                        walk_elements(elements, value, &child, &field_path, errors);
                    }
                    _ => walk(value, thunk_parent, &child, &field_path, errors),
                }
            }
            RuleNode::Each(child) => {
                if let Value::Array(elements) = value {
                    walk_elements(elements, value, child, &field_path, errors);
                }
            }
        }
    }
}

fn walk_elements(
    elements: &[Value],
    array: &Value,
    rules: &RuleSet,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (index, element) in elements.iter().enumerate() {
        walk(element, array, rules, &format!("{path}[{index}]"), errors);
    }
}
