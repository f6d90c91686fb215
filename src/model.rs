//! model.rs — Core entities exchanged with the reconciliation service.
//!
//! Everything here is a plain serde value: records are read-only to this
//! engine and leave the unmatched pool only through a confirmed server
//! mutation, never through local edits.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A marketing lead awaiting a driver assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub created_at: NaiveDateTime,
}

impl Lead {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A scout-driven registration awaiting a driver assignment.
/// Unlike leads, registrations carry a license number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutRegistration {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub license_number: String,
    pub registered_at: NaiveDateTime,
}

impl ScoutRegistration {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A single payment-platform event. The free-text `comment` may embed a
/// driver name; when upstream parsing succeeded it is mirrored into
/// `driver_name_from_comment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub driver_name_from_comment: Option<String>,
    pub tx_date: NaiveDateTime,
    pub milestone_kind: String,
    pub amount: f64,
}

/// A canonical registry member eligible for assignment.
///
/// String fields are already normalized (missing upstream values become
/// empty strings) by [`crate::registry::canonicalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    pub license_number: String,
}

/// A driver's trip-count milestone achievement, fetched on driver selection
/// and optionally attached to a batch transaction assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneInstance {
    pub id: i64,
    pub milestone_kind: String,
    pub period_days: i32,
    pub fulfilled_at: NaiveDate,
}

/// Last-upload banner data, passed through verbatim to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMeta {
    #[serde(default)]
    pub last_upload_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub data_from: Option<NaiveDate>,
    #[serde(default)]
    pub data_to: Option<NaiveDate>,
    #[serde(default)]
    pub source_description: String,
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
}

/// Outcome counts of a server-side reprocess run over the unmatched
/// transaction pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReprocessSummary {
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
    #[serde(default)]
    pub message: String,
}

/// Outcome counts of a server-side duplicate cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub deleted: u64,
    pub duplicates_found: u64,
}

// --- tolerant wire shapes ---

/// Driver record as received from the registry service. Day snapshots come
/// from more than one upstream exporter, so the same field arrives under
/// alternate spellings and ids are sometimes numeric. Canonicalization into
/// [`Driver`] happens in one place, at the aggregator boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDriver {
    #[serde(default, alias = "driverId", alias = "driver_id")]
    pub id: Option<StringOrNumber>,
    #[serde(default, alias = "fullName", alias = "name", alias = "driver_name")]
    pub full_name: Option<String>,
    #[serde(default, alias = "phoneNumber", alias = "phone_number", alias = "mobile")]
    pub phone: Option<String>,
    #[serde(default, alias = "hireDate", alias = "hired_at")]
    pub hire_date: Option<NaiveDate>,
    #[serde(default, alias = "licenseNumber", alias = "license")]
    pub license_number: Option<String>,
}

/// Accepts `"123"` and `123` interchangeably.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    Str(String),
    Num(i64),
}

impl StringOrNumber {
    pub fn into_string(self) -> String {
        match self {
            StringOrNumber::Str(s) => s,
            StringOrNumber::Num(n) => n.to_string(),
        }
    }
}
