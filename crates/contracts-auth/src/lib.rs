//! Role/marker/scope authorization resolution.
//!
//! Computes a session's effective read schema (spec §4.2) and gates both
//! queries (link-masked) and mutation candidates against it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod eval;
mod lookup;
mod markers;
mod mask;
mod resolver;
mod roles;
mod validate;

pub use eval::eval_schema;
pub use lookup::ContractLookup;
pub use markers::marker_based_schema;
pub use mask::gate_query;
pub use resolver::AuthorizationResolver;
pub use roles::role_based_schema;
pub use validate::{validate_permission_gate, validate_type_gate};
