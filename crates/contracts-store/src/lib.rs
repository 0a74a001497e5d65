//! Postgres-backed relational store facade (spec §2 "Relational backend
//! facade"): schema bootstrap, per-type index creation, the row codec, and
//! the change-notification trigger that feeds `contracts-stream`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
mod bootstrap;
mod codec;
mod type_index;

pub use backend::{
    augment_linked_at, execute_compiled_query, fetch_by_id, fetch_by_slug_version, fetch_latest_by_slug,
    fetch_link_projection, insert_contract, replace_contract, update_contract_by_id, PgBackend,
};
pub use bootstrap::{bootstrap, CHANGE_CHANNEL};
pub use codec::decode_row;
pub use type_index::{discover_full_text_fields, plan_type_indexes, IndexPlan};
