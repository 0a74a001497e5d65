//! The backend-facing interface the resolver needs (spec §4.2 "Pipeline").
//!
//! Mirrors the pluggable-validator shape `toka-auth` uses for capability
//! tokens: the resolver is generic over a small async trait rather than
//! calling the store directly, so it can be tested against a fixture
//! without a database.

use async_trait::async_trait;
use serde_json::Value;

use contracts_types::ContractError;

/// Backend facts the authorization resolver needs, independent of how
/// they're actually stored.
#[async_trait]
pub trait ContractLookup: Send + Sync {
    /// Load `role-<slug>@1.0.0`'s `data.read` clause, if that role contract
    /// exists.
    async fn role_read_schema(&self, role_slug: &str) -> Result<Option<Value>, ContractError>;

    /// `true` if `actor_slug` is the built-in admin (spec §4.2 step 2: "If
    /// the actor is the built-in admin, this step produces the trivially-true
    /// schema").
    async fn is_builtin_admin(&self, actor_slug: &str) -> Result<bool, ContractError>;

    /// The slugs of every org-contract that has `actor_slug` as a member.
    async fn org_slugs_for_actor(&self, actor_slug: &str) -> Result<Vec<String>, ContractError>;
}
