// tests/common/mod.rs
// In-memory ReconcileBackend stub: scriptable failures, call recording, and
// server-side pool mutation on successful assignments so reload-after-mutation
// paths can be asserted end to end.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};

use driver_reconciler::backend::ReconcileBackend;
use driver_reconciler::model::{
    CleanupSummary, Lead, MilestoneInstance, RawDriver, ReprocessSummary, ScoutRegistration,
    StringOrNumber, Transaction, UploadMeta,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchAssignCall {
    pub transaction_ids: Vec<i64>,
    pub driver_id: String,
    pub milestone_ids: Vec<i64>,
}

#[derive(Default)]
pub struct Inner {
    pub leads: Mutex<Vec<Lead>>,
    pub registrations: Mutex<Vec<ScoutRegistration>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub driver_days: Mutex<HashMap<NaiveDate, Vec<RawDriver>>>,
    pub failing_days: Mutex<HashSet<NaiveDate>>,
    pub milestones: Mutex<Vec<MilestoneInstance>>,
    pub upload_meta: Mutex<Option<UploadMeta>>,
    pub reprocess_summary: Mutex<Option<ReprocessSummary>>,
    pub cleanup_summary: Mutex<Option<CleanupSummary>>,

    /// Operation names scripted to fail: "fetch_leads", "fetch_registrations",
    /// "fetch_transactions", "fetch_milestones", "assign", "discard",
    /// "reprocess", "cleanup", "upload_meta".
    pub failing_ops: Mutex<HashSet<&'static str>>,

    pub driver_fetches: Mutex<Vec<(NaiveDate, String)>>,
    pub single_assigns: Mutex<Vec<(String, String)>>,
    pub batch_assigns: Mutex<Vec<BatchAssignCall>>,
    pub discards: Mutex<Vec<String>>,
    pub reprocess_calls: Mutex<usize>,
    pub cleanup_calls: Mutex<usize>,
}

#[derive(Clone, Default)]
pub struct MockBackend(pub Arc<Inner>);

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leads(self, leads: Vec<Lead>) -> Self {
        *self.0.leads.lock().unwrap() = leads;
        self
    }

    pub fn with_registrations(self, regs: Vec<ScoutRegistration>) -> Self {
        *self.0.registrations.lock().unwrap() = regs;
        self
    }

    pub fn with_transactions(self, txs: Vec<Transaction>) -> Self {
        *self.0.transactions.lock().unwrap() = txs;
        self
    }

    pub fn with_driver_day(self, date: NaiveDate, drivers: Vec<RawDriver>) -> Self {
        self.0.driver_days.lock().unwrap().insert(date, drivers);
        self
    }

    pub fn with_milestones(self, ms: Vec<MilestoneInstance>) -> Self {
        *self.0.milestones.lock().unwrap() = ms;
        self
    }

    pub fn fail_day(&self, date: NaiveDate) {
        self.0.failing_days.lock().unwrap().insert(date);
    }

    pub fn fail_op(&self, op: &'static str) {
        self.0.failing_ops.lock().unwrap().insert(op);
    }

    pub fn recover_op(&self, op: &'static str) {
        self.0.failing_ops.lock().unwrap().remove(op);
    }

    fn failing(&self, op: &'static str) -> bool {
        self.0.failing_ops.lock().unwrap().contains(op)
    }
}

// --- fixture builders ---

pub fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn lead(id: &str, name: &str, phone: &str) -> Lead {
    let (first, last) = name.split_once(' ').unwrap_or((name, ""));
    Lead {
        id: id.into(),
        first_name: first.into(),
        last_name: last.into(),
        phone: phone.into(),
        created_at: dt(2024, 1, 10, 9, 0, 0),
    }
}

pub fn registration(id: &str, name: &str, phone: &str, license: &str) -> ScoutRegistration {
    let (first, last) = name.split_once(' ').unwrap_or((name, ""));
    ScoutRegistration {
        id: id.into(),
        first_name: first.into(),
        last_name: last.into(),
        phone: phone.into(),
        license_number: license.into(),
        registered_at: dt(2024, 1, 12, 14, 30, 0),
    }
}

pub fn tx(id: i64, name: Option<&str>) -> Transaction {
    Transaction {
        id,
        comment: name.map(|n| format!("pago {n}")),
        driver_name_from_comment: name.map(str::to_string),
        tx_date: dt(2024, 3, 1, 12, 0, 0),
        milestone_kind: "trips_50".into(),
        amount: 150.0,
    }
}

pub fn raw_driver(id: &str, name: &str, phone: &str) -> RawDriver {
    RawDriver {
        id: Some(StringOrNumber::Str(id.to_string())),
        full_name: Some(name.to_string()),
        phone: Some(phone.to_string()),
        hire_date: None,
        license_number: None,
    }
}

pub fn milestone(id: i64) -> MilestoneInstance {
    MilestoneInstance {
        id,
        milestone_kind: "trips_50".into(),
        period_days: 30,
        fulfilled_at: date(2024, 2, 20),
    }
}

#[async_trait::async_trait]
impl ReconcileBackend for MockBackend {
    async fn fetch_unmatched_leads(&self) -> Result<Vec<Lead>> {
        if self.failing("fetch_leads") {
            bail!("mock: leads endpoint down");
        }
        Ok(self.0.leads.lock().unwrap().clone())
    }

    async fn fetch_unmatched_registrations(&self) -> Result<Vec<ScoutRegistration>> {
        if self.failing("fetch_registrations") {
            bail!("mock: registrations endpoint down");
        }
        Ok(self.0.registrations.lock().unwrap().clone())
    }

    async fn fetch_unmatched_transactions(&self) -> Result<Vec<Transaction>> {
        if self.failing("fetch_transactions") {
            bail!("mock: transactions endpoint down");
        }
        Ok(self.0.transactions.lock().unwrap().clone())
    }

    async fn fetch_drivers(&self, date: NaiveDate, scope_id: &str) -> Result<Vec<RawDriver>> {
        self.0
            .driver_fetches
            .lock()
            .unwrap()
            .push((date, scope_id.to_string()));
        if self.0.failing_days.lock().unwrap().contains(&date) {
            bail!("mock: snapshot for {date} unavailable");
        }
        Ok(self
            .0
            .driver_days
            .lock()
            .unwrap()
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_milestones(&self, _driver_id: &str) -> Result<Vec<MilestoneInstance>> {
        if self.failing("fetch_milestones") {
            bail!("mock: milestones endpoint down");
        }
        Ok(self.0.milestones.lock().unwrap().clone())
    }

    async fn assign_lead(&self, lead_id: &str, driver_id: &str) -> Result<()> {
        self.0
            .single_assigns
            .lock()
            .unwrap()
            .push((lead_id.to_string(), driver_id.to_string()));
        if self.failing("assign") {
            bail!("mock: assignment rejected");
        }
        self.0.leads.lock().unwrap().retain(|l| l.id != lead_id);
        Ok(())
    }

    async fn assign_registration(&self, registration_id: &str, driver_id: &str) -> Result<()> {
        self.0
            .single_assigns
            .lock()
            .unwrap()
            .push((registration_id.to_string(), driver_id.to_string()));
        if self.failing("assign") {
            bail!("mock: assignment rejected");
        }
        self.0
            .registrations
            .lock()
            .unwrap()
            .retain(|r| r.id != registration_id);
        Ok(())
    }

    async fn assign_transactions(
        &self,
        transaction_ids: &[i64],
        driver_id: &str,
        milestone_ids: &[i64],
    ) -> Result<()> {
        self.0.batch_assigns.lock().unwrap().push(BatchAssignCall {
            transaction_ids: transaction_ids.to_vec(),
            driver_id: driver_id.to_string(),
            milestone_ids: milestone_ids.to_vec(),
        });
        if self.failing("assign") {
            bail!("mock: assignment rejected");
        }
        self.0
            .transactions
            .lock()
            .unwrap()
            .retain(|t| !transaction_ids.contains(&t.id));
        Ok(())
    }

    async fn discard_lead(&self, lead_id: &str) -> Result<()> {
        self.0.discards.lock().unwrap().push(lead_id.to_string());
        if self.failing("discard") {
            bail!("mock: discard rejected");
        }
        self.0.leads.lock().unwrap().retain(|l| l.id != lead_id);
        Ok(())
    }

    async fn reprocess_transactions(&self) -> Result<ReprocessSummary> {
        *self.0.reprocess_calls.lock().unwrap() += 1;
        if self.failing("reprocess") {
            bail!("mock: reprocess failed");
        }
        Ok(self
            .0
            .reprocess_summary
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ReprocessSummary {
                total: 0,
                matched: 0,
                unmatched: 0,
                message: String::new(),
            }))
    }

    async fn cleanup_duplicate_transactions(&self) -> Result<CleanupSummary> {
        *self.0.cleanup_calls.lock().unwrap() += 1;
        if self.failing("cleanup") {
            bail!("mock: cleanup failed");
        }
        Ok(self
            .0
            .cleanup_summary
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(CleanupSummary {
                deleted: 0,
                duplicates_found: 0,
            }))
    }

    async fn fetch_upload_meta(&self) -> Result<UploadMeta> {
        if self.failing("upload_meta") {
            bail!("mock: upload meta endpoint down");
        }
        Ok(self
            .0
            .upload_meta
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(UploadMeta {
                last_upload_at: None,
                data_from: None,
                data_to: None,
                source_description: "mock".into(),
                total: 0,
                matched: 0,
                unmatched: 0,
            }))
    }
}
