//! Blocksmith compiles minimal, partially-specified descriptions of cloud
//! resources ("2 virtual machines", "one application gateway") into fully
//! specified, internally consistent resource graphs ready for submission to
//! a provider.
//!
//! The heart of the crate is a generic resolve engine shared by every
//! resource kind:
//!
//! - [`merge`] deep-merges a caller's partial settings tree with a per-kind
//!   default template, honoring per-field merge overrides
//! - [`rules`] validates the merged tree against a per-kind rule tree,
//!   collecting *every* violation with a dot/bracket-qualified path
//! - [`blocks`] expands validated settings into concrete
//!   [resource stamps](stamp::ResourceStamp): count-driven instance
//!   expansion, round-robin [pooled resources](pool::Pool), synthesized
//!   child resources and canonical [cross-references](resource_id)
//!
//! The pipeline is a single-threaded, synchronous, pure-function chain:
//! merge → validate → transform. No stage performs I/O, and each invocation
//! operates on private copies, so concurrent runs for different documents
//! need no locking. The only blocking operation, submitting the result via
//! the provider's CLI, lives behind the explicit [`deploy`] boundary the
//! orchestrator calls afterwards.
//!
//! ```
//! use blocksmith::{
//!     blocks::{process, virtual_machine::VirtualMachineBlock},
//!     context::BuildingBlockContext,
//! };
//! use serde_json::json;
//!
//! let context = BuildingBlockContext {
//!     subscription_id: "00000000-0000-0000-0000-000000000000".to_owned(),
//!     resource_group_name: "demo-rg".to_owned(),
//!     location: "westus".to_owned(),
//! };
//! let settings = json!({
//!     "vmCount": 2,
//!     "namePrefix": "demo",
//!     "adminUsername": "ops",
//!     "adminPassword": "correct horse battery staple",
//!     "osDisk": { "osType": "linux" },
//!     "virtualNetwork": { "name": "demo-vnet" },
//! });
//!
//! let run = process(&VirtualMachineBlock, &settings, &context)?;
//! assert!(run.errors.is_empty());
//! let output = run.output.expect("valid settings produce output");
//! assert_eq!(output.stamps("virtualMachines").len(), 2);
//! # Ok::<(), blocksmith::blocks::Error>(())
//! ```

pub mod blocks;
pub mod context;
pub mod deploy;
pub mod merge;
pub mod pool;
pub mod resource_id;
pub mod rules;
pub mod stamp;
