//! Slug grammar and generation (spec §3, §4.3).

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::ContractError;

fn slug_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("static slug pattern is valid"))
}

/// Validate a slug against `^[a-z0-9-]+$` (spec §3).
pub fn validate_slug(slug: &str) -> Result<(), ContractError> {
    if slug_pattern().is_match(slug) {
        Ok(())
    } else {
        Err(ContractError::InvalidSlug(slug.to_string()))
    }
}

/// English stopwords dropped when deriving a slug from a contract `name`
/// (spec §4.3). Deliberately fixed and non-pluggable: this is a narrow
/// formatting utility, not a localization subsystem.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "to", "for", "and", "or",
];

/// Generate a slug for a new contract per spec §4.3:
/// `<type>-<name-with-stopwords-removed-lowercased-hyphenated>-<7-hex>` when
/// `name` is present, else `<type>-<uuid>`.
pub fn generate_slug(type_slug: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => {
            let words: Vec<&str> = name
                .split_whitespace()
                .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
                .collect();
            let cleaned: String = words
                .iter()
                .map(|w| sanitize_word(w))
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join("-");
            let suffix = short_hex();
            if cleaned.is_empty() {
                format!("{type_slug}-{suffix}")
            } else {
                format!("{type_slug}-{cleaned}-{suffix}")
            }
        }
        _ => format!("{type_slug}-{}", Uuid::new_v4()),
    }
}

fn sanitize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn short_hex() -> String {
    let bytes = Uuid::new_v4().as_bytes().to_owned();
    let mut out = String::with_capacity(7);
    for b in &bytes[..4] {
        out.push_str(&format!("{b:02x}"));
    }
    out.truncate(7);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_slug_grammar() {
        assert!(validate_slug("example-1").is_ok());
        assert!(validate_slug("Example").is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn generates_slug_from_name_dropping_stopwords() {
        let slug = generate_slug("card", Some("The Quarterly Report of Sales"));
        assert!(slug.starts_with("card-quarterly-report-sales-"));
        assert_eq!(slug.split('-').last().unwrap().len(), 7);
        validate_slug(&slug).unwrap();
    }

    #[test]
    fn generates_slug_from_uuid_without_name() {
        let slug = generate_slug("card", None);
        assert!(slug.starts_with("card-"));
    }
}
