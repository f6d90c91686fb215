// src/backend/http.rs
//! reqwest-backed [`ReconcileBackend`] against the JSON reconciliation API.
//! Serialize, send, context-annotate, deserialize. Retry and auth policy
//! live in the gateway, not here.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use metrics::counter;
use serde::Serialize;

use crate::backend::ReconcileBackend;
use crate::model::{
    CleanupSummary, Lead, MilestoneInstance, RawDriver, ReprocessSummary, ScoutRegistration,
    Transaction, UploadMeta,
};

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = match self.client.get(self.url(path)).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, path, "backend http error");
                counter!("reconcile_backend_errors_total").increment(1);
                return Err(e).with_context(|| format!("GET {path}"));
            }
        };
        let resp = resp
            .error_for_status()
            .with_context(|| format!("GET {path} status"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("GET {path} body"))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = match self.client.post(self.url(path)).json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, path, "backend http error");
                counter!("reconcile_backend_errors_total").increment(1);
                return Err(e).with_context(|| format!("POST {path}"));
            }
        };
        let resp = resp
            .error_for_status()
            .with_context(|| format!("POST {path} status"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("POST {path} body"))
    }

    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let resp = match self.client.post(self.url(path)).json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, path, "backend http error");
                counter!("reconcile_backend_errors_total").increment(1);
                return Err(e).with_context(|| format!("POST {path}"));
            }
        };
        resp.error_for_status()
            .with_context(|| format!("POST {path} status"))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SingleAssignBody<'a> {
    source_id: &'a str,
    driver_id: &'a str,
}

#[derive(Serialize)]
struct BatchAssignBody<'a> {
    transaction_ids: &'a [i64],
    driver_id: &'a str,
    milestone_ids: &'a [i64],
}

#[async_trait::async_trait]
impl ReconcileBackend for HttpBackend {
    async fn fetch_unmatched_leads(&self) -> Result<Vec<Lead>> {
        self.get_json("/leads/unmatched").await
    }

    async fn fetch_unmatched_registrations(&self) -> Result<Vec<ScoutRegistration>> {
        self.get_json("/registrations/unmatched").await
    }

    async fn fetch_unmatched_transactions(&self) -> Result<Vec<Transaction>> {
        self.get_json("/transactions/unmatched").await
    }

    async fn fetch_drivers(&self, date: NaiveDate, scope_id: &str) -> Result<Vec<RawDriver>> {
        let path = format!("/drivers?date={date}&scope={scope_id}");
        self.get_json(&path).await
    }

    async fn fetch_milestones(&self, driver_id: &str) -> Result<Vec<MilestoneInstance>> {
        let path = format!("/drivers/{driver_id}/milestones");
        self.get_json(&path).await
    }

    async fn assign_lead(&self, lead_id: &str, driver_id: &str) -> Result<()> {
        self.post_unit(
            "/leads/assign",
            &SingleAssignBody {
                source_id: lead_id,
                driver_id,
            },
        )
        .await
    }

    async fn assign_registration(&self, registration_id: &str, driver_id: &str) -> Result<()> {
        self.post_unit(
            "/registrations/assign",
            &SingleAssignBody {
                source_id: registration_id,
                driver_id,
            },
        )
        .await
    }

    async fn assign_transactions(
        &self,
        transaction_ids: &[i64],
        driver_id: &str,
        milestone_ids: &[i64],
    ) -> Result<()> {
        self.post_unit(
            "/transactions/assign",
            &BatchAssignBody {
                transaction_ids,
                driver_id,
                milestone_ids,
            },
        )
        .await
    }

    async fn discard_lead(&self, lead_id: &str) -> Result<()> {
        let path = format!("/leads/{lead_id}/discard");
        self.post_unit(&path, &serde_json::json!({})).await
    }

    async fn reprocess_transactions(&self) -> Result<ReprocessSummary> {
        self.post_json("/transactions/reprocess", &serde_json::json!({}))
            .await
    }

    async fn cleanup_duplicate_transactions(&self) -> Result<CleanupSummary> {
        self.post_json("/transactions/cleanup-duplicates", &serde_json::json!({}))
            .await
    }

    async fn fetch_upload_meta(&self) -> Result<UploadMeta> {
        self.get_json("/uploads/meta").await
    }
}
