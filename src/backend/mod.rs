// src/backend/mod.rs
//! Contract with the remote reconciliation service. Everything the engine
//! knows about the outside world goes through [`ReconcileBackend`], so tests
//! can stub it and the HTTP wiring stays in one module.

pub mod http;

use anyhow::Result;
use chrono::NaiveDate;

use crate::model::{
    CleanupSummary, Lead, MilestoneInstance, RawDriver, ReprocessSummary, ScoutRegistration,
    Transaction, UploadMeta,
};

pub use http::HttpBackend;

/// Remote operations consumed by the engine.
///
/// Each method maps to exactly one server call; batching and atomicity are
/// the server's responsibility. Driver snapshots are returned in their
/// tolerant wire shape ([`RawDriver`]) — canonicalization belongs to the
/// aggregator, not the transport.
#[async_trait::async_trait]
pub trait ReconcileBackend: Send + Sync {
    async fn fetch_unmatched_leads(&self) -> Result<Vec<Lead>>;
    async fn fetch_unmatched_registrations(&self) -> Result<Vec<ScoutRegistration>>;
    async fn fetch_unmatched_transactions(&self) -> Result<Vec<Transaction>>;

    /// One calendar day's snapshot of the driver registry for a scope.
    async fn fetch_drivers(&self, date: NaiveDate, scope_id: &str) -> Result<Vec<RawDriver>>;

    async fn fetch_milestones(&self, driver_id: &str) -> Result<Vec<MilestoneInstance>>;

    async fn assign_lead(&self, lead_id: &str, driver_id: &str) -> Result<()>;
    async fn assign_registration(&self, registration_id: &str, driver_id: &str) -> Result<()>;

    /// One atomic server-side operation over the whole id set.
    async fn assign_transactions(
        &self,
        transaction_ids: &[i64],
        driver_id: &str,
        milestone_ids: &[i64],
    ) -> Result<()>;

    async fn discard_lead(&self, lead_id: &str) -> Result<()>;

    async fn reprocess_transactions(&self) -> Result<ReprocessSummary>;
    async fn cleanup_duplicate_transactions(&self) -> Result<CleanupSummary>;

    async fn fetch_upload_meta(&self) -> Result<UploadMeta>;
}
