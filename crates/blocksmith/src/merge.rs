//! Deep-merging of partial settings documents with per-kind default templates.
//!
//! Settings come from callers as arbitrarily nested, partially specified
//! trees. Each building block supplies a default template of the same shape;
//! [`merge`] combines the two so that validation and transformation always
//! observe a fully defaulted document. The caller's document is never
//! mutated; merging operates on copies.
//!
//! Merge semantics:
//! - object fields merge key-by-key, recursively
//! - scalar fields: the caller's value wins, the default fills gaps
//! - array fields are replaced wholesale by the caller's array (never
//!   concatenated or zipped), unless a [`Customizers`] entry for that field
//!   decides otherwise
//!
//! Per-element defaults for arrays (per-NIC, per-listener, ...) are applied
//! through customizers using [`merge_each`], because the array-level decision
//! alone would discard the element template along with the default array.

use std::collections::HashMap;

use serde_json::{Map, Value};
use snafu::Snafu;

/// Raised when a required shape-selecting discriminant is missing before the
/// merge can even determine which default template applies (for example an
/// OS-type discriminant selecting the windows or linux sub-template).
///
/// This is fatal and aborts the pipeline; it is never collected alongside
/// validation errors because validation cannot run without a defaulted shape.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "settings are missing the discriminant field {field:?} required to select defaults"
    ))]
    MissingDiscriminant { field: String },

    #[snafu(display(
        "discriminant field {field:?} holds unrecognized value {value:?} (expected one of {expected:?})"
    ))]
    UnknownDiscriminant {
        field: String,
        value: String,
        expected: &'static [&'static str],
    },
}

/// A per-field merge override: `(default, caller, field) -> Option<merged>`.
///
/// Returning [`None`] keeps the standard merge behavior for that field.
pub type Customizer = Box<dyn Fn(&Value, &Value, &str) -> Option<Value>>;

/// Per-field merge overrides, keyed by field name.
#[derive(Default)]
pub struct Customizers {
    by_field: HashMap<String, Customizer>,
}

impl Customizers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `customizer` for every field named `field`, at any depth.
    pub fn with(
        mut self,
        field: impl Into<String>,
        customizer: impl Fn(&Value, &Value, &str) -> Option<Value> + 'static,
    ) -> Self {
        self.by_field.insert(field.into(), Box::new(customizer));
        self
    }

    fn get(&self, field: &str) -> Option<&Customizer> {
        self.by_field.get(field)
    }
}

/// Deep-merges `settings` over `defaults`, honoring per-field `customizers`.
///
/// Every path present in `defaults` survives into the result unless a
/// customizer suppresses it; every path present in `settings` survives unless
/// a customizer overrides it. The operation is idempotent:
/// `merge(&merge(s, d, c), d, c) == merge(s, d, c)`.
pub fn merge(settings: &Value, defaults: &Value, customizers: &Customizers) -> Value {
    tracing::trace!("merging settings with default template");
    merge_field(settings, defaults, "", customizers)
}

fn merge_field(caller: &Value, default: &Value, field: &str, customizers: &Customizers) -> Value {
    if !field.is_empty() {
        if let Some(customizer) = customizers.get(field) {
            if let Some(merged) = customizer(default, caller, field) {
                return merged;
            }
        }
    }

    match (caller, default) {
        // Absent caller value: the default (subtree) applies as-is.
        (Value::Null, default) => default.clone(),
        (Value::Object(caller_map), Value::Object(default_map)) => {
            let mut merged = Map::new();
            // Template fields first (template declaration order), then
            // caller-only fields in caller order.
            for (key, default_value) in default_map {
                let caller_value = caller_map.get(key).unwrap_or(&Value::Null);
                merged.insert(
                    key.clone(),
                    merge_field(caller_value, default_value, key, customizers),
                );
            }
            for (key, caller_value) in caller_map {
                if !default_map.contains_key(key) {
                    merged.insert(
                        key.clone(),
                        merge_field(caller_value, &Value::Null, key, customizers),
                    );
                }
            }
            Value::Object(merged)
        }
        // Arrays are replaced wholesale; scalars: the caller wins.
        (caller, _) => caller.clone(),
    }
}

/// Deep-merges every element of `array` against a per-element default
/// template. Intended to be called from array-field customizers.
///
/// Non-array input is returned unchanged so that rule evaluation (not the
/// merge) reports the type mismatch at the right path.
pub fn merge_each(array: &Value, element_template: &Value, customizers: &Customizers) -> Value {
    match array {
        Value::Array(elements) => Value::Array(
            elements
                .iter()
                .map(|element| merge_field(element, element_template, "", customizers))
                .collect(),
        ),
        other => other.clone(),
    }
}
