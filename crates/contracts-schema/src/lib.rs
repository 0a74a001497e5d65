//! JSON-schema to parameterized-SQL query compiler.
//!
//! Walks a contract type's JSON-schema (already authorization-conjoined by
//! `contracts-auth`) and produces a parameterized `SELECT` against the
//! relational contracts table: column/JSON-path resolution through a strict
//! allow-list (no identifier ever reaches emitted SQL unescaped), a
//! select-map for post-fetch projection/redaction, and a plan for fetching
//! `$$links` subtrees.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod compiler;
mod ident;
mod links;
mod options;
mod predicate;
mod select_map;
mod value;

pub use compiler::{compile_query, compile_stream_predicate, CompiledQuery, ROOT_ALIAS};
pub use ident::{ColumnRef, JsonBase, KnownColumn};
pub use links::{compile_projection_query, derive_link_projections, JoinLinkResolver, LinkProjection, PARENT_ID_COLUMN};
pub use options::{LinkOptions, QueryOptions, SortDir, ValidatedOptions, HARD_MAX_LIMIT};
pub use predicate::{compile as compile_predicate, compile_regex, LinkResolver, Scope, MAX_LINK_DEPTH};
pub use select_map::{
    derive as derive_select_map, merge as merge_select_map, project as project_select_map,
    prune as prune_select_map, SelectNode,
};
pub use value::{Binder, SqlValue};
