//! Read-through cache for by-id/by-slug contract lookups (spec §5 "Shared
//! resources": "The cache is opt-in; when absent, every by-id/by-slug lookup
//! goes to the backend").
//!
//! The cache client proper is treated by the core as an opaque
//! key/value-with-TTL store (spec §1 "Out of scope") — only the
//! [`ContractCache`] trait is part of the public surface. [`InMemoryCache`]
//! is a default implementation for tests and single-process deployments,
//! shaped like `toka-store-memory`'s `Arc<RwLock<HashMap<...>>>` backend.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use contracts_types::{Contract, Version};

pub use memory::InMemoryCache;

/// The key space the cache is addressed by: either a contract's opaque id,
/// or its `(slug, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// By opaque id.
    ById(Uuid),
    /// By `(slug, version)`.
    BySlug(String, Version),
}

/// An opaque read-through cache. Implementations decide eviction, TTL
/// enforcement, and backing storage; the core only ever `get`s, `put`s, and
/// `invalidate`s by [`CacheKey`].
#[async_trait]
pub trait ContractCache: Send + Sync {
    /// Look up a cached contract, if present and unexpired.
    async fn get(&self, key: &CacheKey) -> Option<Contract>;

    /// Cache `contract` under `key` for `ttl`.
    async fn put(&self, key: CacheKey, contract: Contract, ttl: std::time::Duration);

    /// Drop any cached entry for `key` (e.g. after a mutation).
    async fn invalidate(&self, key: &CacheKey);
}
