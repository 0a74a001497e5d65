//! The contract store error taxonomy.
//!
//! Every fallible operation across the core returns [`ContractError`].
//! Variant names are domain-stable (spec §6): callers may match on them
//! across releases. Each variant carries a human message; [`ContractError::expected`]
//! distinguishes user-reportable conditions from internal faults per spec §7.

use thiserror::Error;

/// The unified error type returned by every contract-store operation.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract matched the requested id/slug/version.
    #[error("no element: {0}")]
    NoElement(String),

    /// A `(slug, version)` pair already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A slug failed the `^[a-z0-9-]+$` grammar.
    #[error("invalid slug: {0}")]
    InvalidSlug(String),

    /// A version string failed the `MAJOR.MINOR.PATCH[-PRE][+BUILD]` grammar.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// A schema `pattern`/`regexp` keyword held a malformed regex.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    /// A JSON schema was structurally invalid or used an unsupported keyword.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// `limit`/`skip`/`sortBy`/`sortDir` failed validation before compilation.
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    /// A JSON-Patch operation failed to apply.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// The candidate contract failed a JSON-schema validation gate.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The actor's effective read schema rejected the candidate/query.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A link's `from`/`to` endpoint could not be resolved by the actor.
    #[error("no link target: {0}")]
    NoLinkTarget(String),

    /// A `type` reference did not resolve to an existing type-contract.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// No relationship permits the given `(from.type, name, to.type)` triple.
    #[error("unknown relationship: {0}")]
    UnknownRelationship(String),

    /// A backend statement exceeded its timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// An unclassified relational-backend fault.
    #[error("backend error: {0}")]
    Backend(String),

    /// An unclassified cache fault (cache is opt-in; callers may ignore this).
    #[error("cache error: {0}")]
    Cache(String),
}

impl ContractError {
    /// `true` for user-reportable conditions, `false` for internal/system faults.
    ///
    /// Mirrors spec §6/§7: the boolean lets a caller decide whether to surface
    /// the message verbatim or log-and-generify it.
    pub fn expected(&self) -> bool {
        !matches!(
            self,
            ContractError::Timeout(_) | ContractError::Backend(_) | ContractError::Cache(_)
        )
    }

    /// The domain-stable variant name (e.g. `"no-element"`), as used in spec §6.
    pub fn kind(&self) -> &'static str {
        match self {
            ContractError::NoElement(_) => "no-element",
            ContractError::AlreadyExists(_) => "already-exists",
            ContractError::InvalidSlug(_) => "invalid-slug",
            ContractError::InvalidVersion(_) => "invalid-version",
            ContractError::InvalidRegex(_) => "invalid-regex",
            ContractError::InvalidSchema(_) => "invalid-schema",
            ContractError::InvalidLimit(_) => "invalid-limit",
            ContractError::InvalidPatch(_) => "invalid-patch",
            ContractError::SchemaMismatch(_) => "schema-mismatch",
            ContractError::Permission(_) => "permission",
            ContractError::NoLinkTarget(_) => "no-link-target",
            ContractError::UnknownType(_) => "unknown-type",
            ContractError::UnknownRelationship(_) => "unknown-relationship",
            ContractError::Timeout(_) => "timeout",
            ContractError::Backend(_) => "backend",
            ContractError::Cache(_) => "cache",
        }
    }

    /// Replace the message with a generic one, preserving the variant.
    ///
    /// Used by the mutation pipeline (spec §4.3 step 6, §7) to avoid leaking
    /// private field names from the unrestricted contract's validator output.
    pub fn generify(self) -> Self {
        match self {
            ContractError::SchemaMismatch(_) => {
                ContractError::SchemaMismatch("contract does not satisfy its type schema".into())
            }
            other => other,
        }
    }
}

/// Convenience alias used throughout the core.
pub type Result<T> = std::result::Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_flags_match_taxonomy() {
        assert!(ContractError::NoElement("x".into()).expected());
        assert!(ContractError::Permission("x".into()).expected());
        assert!(!ContractError::Timeout("x".into()).expected());
        assert!(!ContractError::Backend("x".into()).expected());
        assert!(!ContractError::Cache("x".into()).expected());
    }

    #[test]
    fn generify_hides_schema_mismatch_details() {
        let e = ContractError::SchemaMismatch("field `hash` must not be present".into())
            .generify();
        assert_eq!(e.to_string(), "schema mismatch: contract does not satisfy its type schema");
    }

    #[test]
    fn kind_is_domain_stable() {
        assert_eq!(ContractError::UnknownRelationship("x".into()).kind(), "unknown-relationship");
    }
}
