#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **contracts-types** – Shared data model and error taxonomy for the
//! contract store core.
//!
//! The crate is dependency-light and sits at the bottom of the crate graph:
//! the query compiler, authorization resolver, mutation pipeline, stream
//! manager and backend facade all depend on it, and it depends on none of
//! them. It intentionally makes no assumptions about SQL, HTTP, or any
//! particular relational driver.

pub mod contract;
pub mod defaults;
pub mod error;
pub mod link;
pub mod session;
pub mod slug;
pub mod typeref;
pub mod version;

pub use contract::{Contract, LinkedContract, IMMUTABLE_PATHS};
pub use defaults::{apply_defaults, PartialContract};
pub use error::{ContractError, Result};
pub use link::{relationship_permits, LinkData, LinkEndpoint, Relationship, RelationshipTable};
pub use session::Session;
pub use typeref::{SlugRef, TypeRef};
pub use version::Version;
