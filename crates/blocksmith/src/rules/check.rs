//! Shared validator predicates.
//!
//! Plain functions match the [`Predicate`](super::Predicate) signature and
//! can be passed to [`RuleSet::leaf`](super::RuleSet::leaf) directly;
//! factories (`one_of`, `member_of`, ...) return capturing closures.
//!
//! Predicates that do not require presence pass on [`Value::Null`], so that
//! missing optional fields never produce errors.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::Verdict;

/// Resource names: alphanumerics, dashes, underscores and dots, starting
/// with an alphanumeric.
const NAME_FMT: &str = "[a-zA-Z0-9][-._a-zA-Z0-9]*";
const NAME_ERROR_MSG: &str = "must consist of alphanumeric characters, '-', '_' or '.', and start with an alphanumeric character";

const CIDR_FMT: &str = r"(\d{1,3}\.){3}\d{1,3}/\d{1,2}";
const CIDR_ERROR_MSG: &str = "must be an IPv4 CIDR block such as 10.0.0.0/24";

static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{NAME_FMT}$")).expect("failed to compile resource name regex")
});

static CIDR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{CIDR_FMT}$")).expect("failed to compile CIDR regex")
});

/// Requires the field to be present (any non-null value).
pub fn required(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(!value.is_null(), "field is required")
}

/// Requires a present, non-empty string.
pub fn non_empty_string(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(
        value.as_str().is_some_and(|s| !s.is_empty()),
        "must be a non-empty string",
    )
}

/// Requires a present, well-formed resource name.
pub fn valid_name(value: &Value, parent: &Value) -> Verdict {
    match non_empty_string(value, parent) {
        Verdict::Pass => Verdict::require(
            value.as_str().is_some_and(|s| NAME_REGEX.is_match(s)),
            NAME_ERROR_MSG,
        ),
        fail => fail,
    }
}

/// Requires a present integer >= 1.
pub fn positive_integer(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(
        value.as_u64().is_some_and(|n| n >= 1),
        "must be an integer greater than or equal to 1",
    )
}

/// Requires a present integer >= 0.
pub fn non_negative_integer(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(
        value.as_u64().is_some(),
        "must be an integer greater than or equal to 0",
    )
}

/// Requires a present boolean.
pub fn boolean(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(value.is_boolean(), "must be a boolean")
}

/// Requires a present TCP port (1..=65535).
pub fn valid_port(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(
        value.as_u64().is_some_and(|port| (1..=65535).contains(&port)),
        "must be a port between 1 and 65535",
    )
}

/// Requires a present IPv4 CIDR block.
pub fn valid_cidr(value: &Value, _parent: &Value) -> Verdict {
    Verdict::require(
        value.as_str().is_some_and(|s| CIDR_REGEX.is_match(s)),
        CIDR_ERROR_MSG,
    )
}

/// Requires a present string out of `allowed` (typically the variant names
/// of a discriminant enum).
pub fn one_of(allowed: &'static [&'static str]) -> impl Fn(&Value, &Value) -> Verdict {
    move |value, _parent| {
        Verdict::require(
            value.as_str().is_some_and(|s| allowed.contains(&s)),
            format!("must be one of {allowed:?}"),
        )
    }
}

/// Passes on absent fields, otherwise defers to `predicate`.
pub fn optional(
    predicate: impl Fn(&Value, &Value) -> Verdict,
) -> impl Fn(&Value, &Value) -> Verdict {
    move |value, parent| {
        if value.is_null() {
            Verdict::Pass
        } else {
            predicate(value, parent)
        }
    }
}

/// All predicates must pass; the first failure wins.
pub fn all_of(
    predicates: Vec<Box<dyn Fn(&Value, &Value) -> Verdict>>,
) -> impl Fn(&Value, &Value) -> Verdict {
    move |value, parent| {
        for predicate in &predicates {
            if let Verdict::Fail(message) = predicate(value, parent) {
                return Verdict::Fail(message);
            }
        }
        Verdict::Pass
    }
}

/// Requires the string value to name one of `declared` (the `name` fields of
/// a sibling collection). `target` is the collection being referenced, used
/// in the error message.
pub fn member_of(
    declared: Vec<String>,
    target: &'static str,
) -> impl Fn(&Value, &Value) -> Verdict {
    move |value, _parent| {
        Verdict::require(
            value
                .as_str()
                .is_some_and(|name| declared.iter().any(|d| d.as_str() == name)),
            format!("does not reference a declared {target} entry"),
        )
    }
}

/// The `name` fields declared by the array at `object[field]`, in order.
/// Entries without a string name are skipped; their own rules report them.
pub fn declared_names(object: &Value, field: &str) -> Vec<String> {
    object
        .get(field)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("name"))
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
