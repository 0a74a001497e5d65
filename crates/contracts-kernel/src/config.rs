//! Kernel configuration (spec §1 ambient-stack clarification, §4.7): pool
//! size, statement timeout, cache TTL, debounce interval, notify channel.

use std::time::Duration;

/// The small typed configuration surface the kernel facade takes, the way
/// `toka-store-sqlite::SqliteBackend::open` takes a path rather than a
/// general-purpose config-file layer.
#[derive(Debug, Clone)]
pub struct Config {
    /// The table name backing the contract store (normally `"contracts"`).
    pub table: String,
    /// Maximum pooled Postgres connections.
    pub pool_size: u32,
    /// Per-statement timeout, enforced server-side via `statement_timeout`.
    pub statement_timeout: Duration,
    /// TTL applied to entries written into an optional [`contracts_cache::ContractCache`].
    pub cache_ttl: Duration,
    /// Debounce window for inverse-link stream re-matching.
    pub debounce_interval: Duration,
    /// The `LISTEN`/`NOTIFY` channel name.
    pub notify_channel: String,
    /// The slug treated as the built-in admin actor (spec §4.2 step 2, §9
    /// Open Question (a): kept as a configured slug rather than a pluggable
    /// predicate — see DESIGN.md).
    pub builtin_admin_slug: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table: "contracts".to_string(),
            pool_size: 10,
            statement_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
            debounce_interval: Duration::from_millis(8),
            notify_channel: contracts_store::CHANGE_CHANNEL.to_string(),
            builtin_admin_slug: "user-admin".to_string(),
        }
    }
}
