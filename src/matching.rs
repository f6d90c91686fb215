// src/matching.rs
//! Likely-match highlighting between a selected source record and a candidate
//! driver. Normalized equality and mutual substring checks only, no
//! similarity scoring. The result is advisory: it drives row highlighting,
//! never an assignment.

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::model::{Driver, Lead, ScoutRegistration};

/// The comparable fields of a source record. Leads carry no license, so that
/// criterion simply drops out of the OR for them.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFields {
    pub full_name: String,
    pub phone: String,
    pub license_number: Option<String>,
}

/// Source-side view used by the highlighter.
pub trait MatchSource {
    fn match_fields(&self) -> MatchFields;
}

impl MatchSource for Lead {
    fn match_fields(&self) -> MatchFields {
        MatchFields {
            full_name: self.full_name(),
            phone: self.phone.clone(),
            license_number: None,
        }
    }
}

impl MatchSource for ScoutRegistration {
    fn match_fields(&self) -> MatchFields {
        MatchFields {
            full_name: self.full_name(),
            phone: self.phone.clone(),
            license_number: Some(self.license_number.clone()),
        }
    }
}

/// Keep only ASCII digits: `"+52 (55) 1234-5678"` → `"525512345678"`.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Lower-case and collapse internal whitespace so `"JUAN  Perez "` and
/// `"juan perez"` compare equal.
pub fn norm_name(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s.trim(), " ").to_lowercase()
}

pub fn norm_license(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Phone criterion: digits-only equality, both sides non-empty.
pub fn phones_match(a: &str, b: &str) -> bool {
    let (da, db) = (digits_only(a), digits_only(b));
    !da.is_empty() && da == db
}

/// Name criterion: either normalized name contains the other, both non-empty.
/// Substring in both directions covers partial-name and alias entries.
pub fn names_match(a: &str, b: &str) -> bool {
    let (na, nb) = (norm_name(a), norm_name(b));
    !na.is_empty() && !nb.is_empty() && (na.contains(&nb) || nb.contains(&na))
}

/// License criterion: trimmed upper-case equality, both sides non-empty.
pub fn licenses_match(a: &str, b: &str) -> bool {
    let (la, lb) = (norm_license(a), norm_license(b));
    !la.is_empty() && la == lb
}

/// Any single criterion is sufficient to flag the row; absent criteria are
/// excluded from the OR, never treated as a match.
pub fn is_likely_match(source: &MatchFields, driver: &Driver) -> bool {
    let by_phone = phones_match(&source.phone, &driver.phone);
    let by_name = names_match(&source.full_name, &driver.full_name);
    let by_license = source
        .license_number
        .as_deref()
        .is_some_and(|lic| licenses_match(lic, &driver.license_number));

    let matched = by_phone || by_name || by_license;
    if matched && dev_logging_enabled() {
        // Never log raw phone numbers; only a short hash for correlation.
        debug!(
            target: "matching",
            phone_hash = %anon_hash(&source.phone),
            driver_id = %driver.id,
            by_phone,
            by_name,
            by_license,
            "likely match"
        );
    }
    matched
}

// Dev logging gate: RECONCILER_DEV_LOG=1 AND a debug build.
pub(crate) fn dev_logging_enabled() -> bool {
    std::env::var("RECONCILER_DEV_LOG").ok().as_deref() == Some("1") && cfg!(debug_assertions)
}

pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
