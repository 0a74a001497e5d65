//! The insert/replace/patch mutation pipeline (spec §4.3): defaulting, type
//! and permission gating, link validation, and `linked_at` side-effects.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod link_checks;
mod patch;
mod pipeline;
mod type_schema;

pub use link_checks::{linked_at_side_effects, validate_link_contract};
pub use patch::{apply as apply_patch_ops, discard_immutable_ops};
pub use pipeline::MutationPipeline;
pub use type_schema::load_type_schema;
