//! **contracts-kernel** – the composed facade (spec §4.7): one
//! [`ContractStore`] per deployment, built from the query compiler
//! (`contracts-schema`), authorization resolver (`contracts-auth`),
//! mutation pipeline (`contracts-mutate`), stream manager
//! (`contracts-stream`), and relational backend (`contracts-store`).
//!
//! Everything downstream of connection setup is plain delegation: the
//! facade's job is wiring, not policy.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod lookup;
mod store;
pub mod testing;

pub use config::Config;
pub use lookup::PgContractLookup;
pub use store::{ContractStore, Status};
