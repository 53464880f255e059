//! Building blocks: per-kind schema modules and the generic pipeline.
//!
//! A building block supplies the per-kind data the three generic engines
//! consume: a default template (plus merge customizers), a rule tree, and the
//! transform that expands merged settings into resource stamps. The pipeline
//! itself is kind-agnostic: merge, validate, and only on zero errors
//! transform.
//!
//! Blocks may compose: a transform can synthesize a settings object for
//! another kind and run that kind's full pipeline as a sub-pipeline (a
//! gateway's Public front end implies a public IP address, for example),
//! splicing the resulting stamps into its own output.

pub mod application_gateway;
pub mod public_ip;
pub mod virtual_machine;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use snafu::Snafu;

use crate::{
    context::BuildingBlockContext,
    merge::{self, Customizers},
    rules::{self, RuleSet, ValidationError},
    stamp::ResourceStamp,
};

/// Fatal pipeline errors.
///
/// Rule violations are *not* errors in this sense; they are collected on
/// [`PipelineRun::errors`]. Everything here aborts the pipeline and is never
/// retried: retrying a deterministic, side-effect-free computation with the
/// same input cannot succeed.
#[derive(Debug, Snafu)]
pub enum Error {
    /// See [`merge::Error`]: the settings are too incomplete to even select
    /// the default template.
    #[snafu(transparent)]
    Defaults { source: merge::Error },

    /// A transform was invoked against settings that break an internal
    /// invariant. Transforms must only run on settings that passed
    /// validation with zero errors, so this indicates a caller bug.
    #[snafu(display("settings invariant violated in transform: {detail}"))]
    InvariantViolated { detail: String },

    /// A synthesized child-kind settings object failed its own validation.
    /// The parent kind constructed those settings itself, so this too is a
    /// bug in the synthesizing transform, not a data problem.
    #[snafu(display("synthesized {kind} settings failed validation: {errors:?}"))]
    SynthesizedInvalid {
        kind: &'static str,
        errors: Vec<ValidationError>,
    },
}

/// One resource kind's configuration unit end to end.
pub trait BuildingBlock {
    /// Human-readable kind name, used in logs and synthesized-settings
    /// errors.
    const KIND: &'static str;

    /// The default template for this kind. May inspect `settings` where the
    /// shape of the defaults depends on a discriminant (and fail fatally if
    /// that discriminant is absent).
    fn defaults(&self, settings: &Value) -> Result<Value, merge::Error>;

    /// Per-field merge overrides; element templates for array fields live
    /// here.
    fn customizers(&self) -> Customizers {
        Customizers::new()
    }

    /// The rule tree validated against the *merged* settings.
    fn rules(&self) -> RuleSet;

    /// Expands merged, validated settings into resource stamps.
    ///
    /// Must only be invoked on settings that passed [`rules()`](Self::rules)
    /// with zero errors; behavior on invalid input is a contract violation
    /// surfaced as [`Error::InvariantViolated`].
    fn transform(
        &self,
        merged: &Value,
        context: &BuildingBlockContext,
    ) -> Result<TransformOutput, Error>;
}

/// Transform result: stamp collections keyed by resource kind, plus the
/// secret side channel.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct TransformOutput {
    /// Stamps keyed by output kind (`virtualMachines`, `nics`, `pips`,
    /// `applicationGateway`, `publicIpAddresses`, ...), in emission order.
    #[serde(flatten)]
    pub resources: IndexMap<&'static str, Vec<ResourceStamp>>,

    /// The one place a secret's plaintext survives, for secure downstream
    /// injection. Every stamp carries the redaction token instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl TransformOutput {
    pub fn push(&mut self, kind: &'static str, stamp: ResourceStamp) {
        self.resources.entry(kind).or_default().push(stamp);
    }

    pub fn extend(&mut self, kind: &'static str, stamps: impl IntoIterator<Item = ResourceStamp>) {
        self.resources.entry(kind).or_default().extend(stamps);
    }

    /// Splices a sub-pipeline's stamps from `from_kind` into this output
    /// under `to_kind`, returning the spliced stamps for reference wiring.
    pub fn splice(
        &mut self,
        other: Self,
        from_kind: &'static str,
        to_kind: &'static str,
    ) -> Vec<ResourceStamp> {
        let mut spliced = Vec::new();
        for (kind, stamps) in other.resources {
            if kind == from_kind {
                spliced.extend(stamps.iter().cloned());
                self.extend(to_kind, stamps);
            } else {
                self.extend(kind, stamps);
            }
        }
        spliced
    }

    pub fn stamps(&self, kind: &str) -> &[ResourceStamp] {
        self.resources.get(kind).map_or(&[], Vec::as_slice)
    }
}

/// Result of one pipeline run. `merged` and `errors` are always inspectable;
/// `output` is present exactly when `errors` is empty.
#[derive(Debug)]
pub struct PipelineRun {
    pub merged: Value,
    pub errors: Vec<ValidationError>,
    pub output: Option<TransformOutput>,
}

/// Runs the merge → validate → transform pipeline for one settings document.
///
/// Each invocation operates on private copies; concurrent runs for different
/// documents are independent.
pub fn process<B: BuildingBlock>(
    block: &B,
    settings: &Value,
    context: &BuildingBlockContext,
) -> Result<PipelineRun, Error> {
    tracing::debug!(kind = B::KIND, "processing building block settings");
    let defaults = block.defaults(settings)?;
    let merged = merge::merge(settings, &defaults, &block.customizers());
    let errors = rules::validate(&merged, &block.rules());
    let output = if errors.is_empty() {
        Some(block.transform(&merged, context)?)
    } else {
        tracing::debug!(
            kind = B::KIND,
            error_count = errors.len(),
            "skipping transform for invalid settings"
        );
        None
    };
    Ok(PipelineRun {
        merged,
        errors,
        output,
    })
}

/// Runs a full child-kind pipeline from inside a parent transform.
///
/// The parent synthesized `settings` itself, so validation errors are
/// escalated to [`Error::SynthesizedInvalid`] instead of being collected.
pub(crate) fn process_synthesized<B: BuildingBlock>(
    block: &B,
    settings: &Value,
    context: &BuildingBlockContext,
) -> Result<TransformOutput, Error> {
    let run = process(block, settings, context)?;
    if !run.errors.is_empty() {
        return SynthesizedInvalidSnafu {
            kind: B::KIND,
            errors: run.errors,
        }
        .fail();
    }
    run.output.ok_or_else(|| Error::InvariantViolated {
        detail: format!("validated {} sub-pipeline produced no output", B::KIND),
    })
}

// Typed accessors for fields that validation has already guaranteed. A miss
// here is a contract violation, not a data problem.

pub(crate) fn str_field<'a>(object: &'a Value, path: &str) -> Result<&'a str, Error> {
    object
        .pointer(path)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvariantViolated {
            detail: format!("expected string at {path}"),
        })
}

pub(crate) fn u64_field(object: &Value, path: &str) -> Result<u64, Error> {
    object
        .pointer(path)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::InvariantViolated {
            detail: format!("expected unsigned integer at {path}"),
        })
}

pub(crate) fn bool_field(object: &Value, path: &str) -> Result<bool, Error> {
    object
        .pointer(path)
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::InvariantViolated {
            detail: format!("expected boolean at {path}"),
        })
}

pub(crate) fn array_field<'a>(object: &'a Value, path: &str) -> Result<&'a [Value], Error> {
    object
        .pointer(path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| Error::InvariantViolated {
            detail: format!("expected array at {path}"),
        })
}

/// Existing-resource name lists (`accounts`, ...): absent is the same as
/// empty, anything present must be strings.
pub(crate) fn string_list(object: &Value, path: &str) -> Result<Vec<String>, Error> {
    match object.pointer(path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| Error::InvariantViolated {
                        detail: format!("expected string entries at {path}"),
                    })
            })
            .collect(),
        Some(_) => InvariantViolatedSnafu {
            detail: format!("expected array at {path}"),
        }
        .fail(),
    }
}
