//! # Selection & Assignment Workflow
//! The operator-facing state machine: an explicit, serializable state value
//! ([`ConsoleState`]) mutated by reducer-style transitions, plus a thin async
//! orchestrator ([`Reconciler`]) that talks to the backend and applies the
//! transitions. Keeping the transitions free of I/O makes the state machine
//! testable without a rendering surface.
//!
//! Pool invariant: a record leaves an unmatched pool only after the server
//! confirmed the mutation — every success path reloads from the backend
//! instead of patching the pool locally.

use std::collections::BTreeSet;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::backend::ReconcileBackend;
use crate::filter::{self, FilterParams};
use crate::grouping::{self, TransactionGroup};
use crate::matching::{self, MatchFields, MatchSource};
use crate::model::{
    CleanupSummary, Driver, Lead, MilestoneInstance, ReprocessSummary, ScoutRegistration,
    Transaction,
};
use crate::registry;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "reconcile_assignments_total",
            "Confirmed assignment operations (single and batch)."
        );
        describe_counter!(
            "reconcile_assignment_errors_total",
            "Assignment operations rejected by the backend."
        );
        describe_counter!("reconcile_discards_total", "Confirmed lead discards.");
        describe_counter!(
            "reconcile_reprocess_runs_total",
            "Confirmed reprocess runs over the unmatched transaction pool."
        );
        describe_counter!(
            "reconcile_cleanup_runs_total",
            "Confirmed duplicate cleanup runs."
        );
    });
}

/// What the operator currently has selected on the source side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceSelection {
    #[default]
    None,
    Lead(String),
    Registration(String),
    Transactions(BTreeSet<i64>),
}

impl SourceSelection {
    pub fn is_none(&self) -> bool {
        matches!(self, SourceSelection::None)
    }
}

/// Observable workflow stage, derived from the state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    SourceSelected,
    DriverSelected,
    ReadyToAssign,
    Assigning,
}

/// Operator answer to the confirmation step guarding destructive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// The whole engine state: pools, derived groups, filters, selection and the
/// single user-visible error slot. Serializable so the UI can snapshot it.
#[derive(Debug, Default, Serialize)]
pub struct ConsoleState {
    pub leads: Vec<Lead>,
    pub registrations: Vec<ScoutRegistration>,
    pub transactions: Vec<Transaction>,
    pub groups: Vec<TransactionGroup>,
    pub drivers: Vec<Driver>,

    pub selection: SourceSelection,
    pub selected_driver: Option<Driver>,
    /// Milestone cache for the selected driver; cleared on deselection and
    /// after a successful batch assignment.
    pub milestones: Vec<MilestoneInstance>,
    pub expanded_groups: BTreeSet<String>,

    pub lead_filter: FilterParams,
    pub registration_filter: FilterParams,
    pub transaction_filter: FilterParams,
    pub driver_filter: FilterParams,

    /// Single error slot; cleared at the start of every attempt.
    pub last_error: Option<String>,
    pub assigning: bool,

    /// Request-generation token for the driver pool: a range load that
    /// resolves after a newer one started is discarded instead of
    /// overwriting the fresher pool.
    #[serde(skip)]
    driver_generation: u64,
}

impl ConsoleState {
    pub fn stage(&self) -> Stage {
        if self.assigning {
            return Stage::Assigning;
        }
        match (!self.selection.is_none(), self.selected_driver.is_some()) {
            (true, true) => Stage::ReadyToAssign,
            (true, false) => Stage::SourceSelected,
            (false, true) => Stage::DriverSelected,
            (false, false) => Stage::Idle,
        }
    }

    // --- pool installation ---

    pub fn install_leads(&mut self, pool: Vec<Lead>) {
        self.leads = pool;
        if let SourceSelection::Lead(id) = &self.selection {
            if !self.leads.iter().any(|l| &l.id == id) {
                self.selection = SourceSelection::None;
            }
        }
    }

    pub fn install_registrations(&mut self, pool: Vec<ScoutRegistration>) {
        self.registrations = pool;
        if let SourceSelection::Registration(id) = &self.selection {
            if !self.registrations.iter().any(|r| &r.id == id) {
                self.selection = SourceSelection::None;
            }
        }
    }

    /// Replace the transaction pool and recompute groups from scratch.
    /// Selection ids that no longer exist in the pool are pruned.
    pub fn install_transactions(&mut self, pool: Vec<Transaction>) {
        self.transactions = pool;
        self.groups = grouping::group_transactions(&self.transactions);
        self.expanded_groups = grouping::all_expanded(&self.groups);
        if let SourceSelection::Transactions(ids) = &self.selection {
            let existing: BTreeSet<i64> = self.transactions.iter().map(|t| t.id).collect();
            let kept: BTreeSet<i64> = ids.intersection(&existing).copied().collect();
            self.selection = if kept.is_empty() {
                SourceSelection::None
            } else {
                SourceSelection::Transactions(kept)
            };
        }
    }

    pub fn begin_driver_load(&mut self) -> u64 {
        self.last_error = None;
        self.driver_generation += 1;
        self.driver_generation
    }

    /// Install a loaded driver pool unless a newer load started meanwhile.
    pub fn install_drivers(&mut self, token: u64, pool: Vec<Driver>) -> bool {
        if token != self.driver_generation {
            tracing::debug!(token, current = self.driver_generation, "stale driver load dropped");
            return false;
        }
        self.drivers = pool;
        true
    }

    // --- selection reducers ---

    pub fn select_lead(&mut self, id: &str) {
        if self.leads.iter().any(|l| l.id == id) {
            self.selection = SourceSelection::Lead(id.to_string());
        }
    }

    pub fn select_registration(&mut self, id: &str) {
        if self.registrations.iter().any(|r| r.id == id) {
            self.selection = SourceSelection::Registration(id.to_string());
        }
    }

    /// Toggle one transaction id in the selection set. Starting a transaction
    /// selection replaces any lead/registration selection; removing the last
    /// id returns to no selection.
    pub fn toggle_transaction(&mut self, id: i64) {
        if !self.transactions.iter().any(|t| t.id == id) {
            return;
        }
        let current = match &self.selection {
            SourceSelection::Transactions(ids) => ids.clone(),
            _ => BTreeSet::new(),
        };
        let mut next = current;
        if !next.remove(&id) {
            next.insert(id);
        }
        self.selection = if next.is_empty() {
            SourceSelection::None
        } else {
            SourceSelection::Transactions(next)
        };
    }

    pub fn clear_source(&mut self) {
        self.selection = SourceSelection::None;
    }

    pub fn set_driver(&mut self, driver: Driver, milestones: Vec<MilestoneInstance>) {
        self.selected_driver = Some(driver);
        self.milestones = milestones;
    }

    pub fn clear_driver(&mut self) {
        self.selected_driver = None;
        self.milestones.clear();
    }

    // --- group reducers ---

    pub fn toggle_group(&mut self, key: &str) {
        if !self.expanded_groups.remove(key) {
            self.expanded_groups.insert(key.to_string());
        }
    }

    pub fn select_all_in_group(&mut self, key: &str) {
        let Some(group) = self.groups.iter().find(|g| g.key == key) else {
            return;
        };
        let current = match &self.selection {
            SourceSelection::Transactions(ids) => ids.clone(),
            _ => BTreeSet::new(),
        };
        let next = grouping::select_all_in_group(&current, group);
        self.selection = if next.is_empty() {
            SourceSelection::None
        } else {
            SourceSelection::Transactions(next)
        };
    }

    pub fn deselect_all_in_group(&mut self, key: &str) {
        let Some(group) = self.groups.iter().find(|g| g.key == key) else {
            return;
        };
        let current = match &self.selection {
            SourceSelection::Transactions(ids) => ids.clone(),
            _ => return,
        };
        let next = grouping::deselect_all_in_group(&current, group);
        self.selection = if next.is_empty() {
            SourceSelection::None
        } else {
            SourceSelection::Transactions(next)
        };
    }

    // --- derived views ---

    /// Match fields of the selected source record, when one is selected.
    /// Transaction selections carry no comparable fields.
    pub fn current_match_fields(&self) -> Option<MatchFields> {
        match &self.selection {
            SourceSelection::Lead(id) => self
                .leads
                .iter()
                .find(|l| &l.id == id)
                .map(|l| l.match_fields()),
            SourceSelection::Registration(id) => self
                .registrations
                .iter()
                .find(|r| &r.id == id)
                .map(|r| r.match_fields()),
            _ => None,
        }
    }

    pub fn visible_leads(&self) -> Vec<Lead> {
        filter::apply(&self.leads, &self.lead_filter)
    }

    pub fn visible_registrations(&self) -> Vec<ScoutRegistration> {
        filter::apply(&self.registrations, &self.registration_filter)
    }

    pub fn visible_groups(&self) -> Vec<TransactionGroup> {
        filter::apply_to_groups(&self.groups, &self.transaction_filter)
    }

    /// Driver rows with the advisory likely-match highlight, recomputed
    /// against the current selection on every call.
    pub fn visible_drivers(&self) -> Vec<DriverRow> {
        let fields = self.current_match_fields();
        filter::apply(&self.drivers, &self.driver_filter)
            .into_iter()
            .map(|driver| DriverRow {
                likely_match: fields
                    .as_ref()
                    .is_some_and(|f| matching::is_likely_match(f, &driver)),
                driver,
            })
            .collect()
    }
}

/// One driver list row: the record plus its presentation-only highlight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRow {
    pub driver: Driver,
    pub likely_match: bool,
}

/// Orchestrates the workflow against a backend. All mutation goes through
/// `&mut self`, so a single owner (one mutex in the HTTP layer) gives the
/// engine its single-logical-thread model.
pub struct Reconciler<B> {
    backend: B,
    scope_id: String,
    pub state: ConsoleState,
}

impl<B: ReconcileBackend> Reconciler<B> {
    pub fn new(backend: B, scope_id: impl Into<String>) -> Self {
        ensure_metrics_described();
        Self {
            backend,
            scope_id: scope_id.into(),
            state: ConsoleState::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // --- pool loads ---

    pub async fn reload_leads(&mut self) {
        match self.backend.fetch_unmatched_leads().await {
            Ok(pool) => self.state.install_leads(pool),
            Err(e) => self.state.last_error = Some(format!("could not load leads: {e:#}")),
        }
    }

    pub async fn reload_registrations(&mut self) {
        match self.backend.fetch_unmatched_registrations().await {
            Ok(pool) => self.state.install_registrations(pool),
            Err(e) => {
                self.state.last_error = Some(format!("could not load registrations: {e:#}"))
            }
        }
    }

    pub async fn reload_transactions(&mut self) {
        match self.backend.fetch_unmatched_transactions().await {
            Ok(pool) => self.state.install_transactions(pool),
            Err(e) => {
                self.state.last_error = Some(format!("could not load transactions: {e:#}"))
            }
        }
    }

    /// Initial load of all three unmatched pools.
    pub async fn reload_all(&mut self) {
        self.reload_leads().await;
        self.reload_registrations().await;
        self.reload_transactions().await;
    }

    /// Load the candidate driver pool for `[from, to]`. Per-day gaps are
    /// absorbed by the aggregator; only a whole-operation failure surfaces.
    pub async fn load_drivers(
        &mut self,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) {
        let token = self.state.begin_driver_load();
        match registry::collect_range(&self.backend, &self.scope_id, from, to).await {
            Ok(pool) => {
                self.state.install_drivers(token, pool);
            }
            Err(e) => {
                tracing::warn!(error = ?e, "driver range load failed");
                self.state.last_error = Some("could not load drivers".to_string());
            }
        }
    }

    // --- driver selection (fetches the milestone cache) ---

    pub async fn select_driver(&mut self, driver_id: &str) {
        self.state.last_error = None;
        let Some(driver) = self
            .state
            .drivers
            .iter()
            .find(|d| d.id == driver_id)
            .cloned()
        else {
            return;
        };
        match self.backend.fetch_milestones(driver_id).await {
            Ok(milestones) => self.state.set_driver(driver, milestones),
            Err(e) => {
                // Selection still proceeds; the batch call just won't attach
                // milestone ids while the cache is empty.
                self.state.set_driver(driver, Vec::new());
                self.state.last_error = Some(format!("could not load milestones: {e:#}"));
            }
        }
    }

    // --- assignment ---

    /// Assign the current source selection to the selected driver.
    ///
    /// No-op (not an error) unless both selections are present. On success
    /// clears the selections and reloads the affected unmatched pool; on
    /// failure leaves every selection intact and fills the error slot so the
    /// operator can retry without re-selecting.
    pub async fn assign_selected(&mut self) -> bool {
        if self.state.selection.is_none() || self.state.selected_driver.is_none() {
            return false;
        }
        self.state.last_error = None;

        let driver_id = self
            .state
            .selected_driver
            .as_ref()
            .map(|d| d.id.clone())
            .unwrap_or_default();
        let selection = self.state.selection.clone();

        self.state.assigning = true;
        let result = match &selection {
            SourceSelection::Lead(id) => self.backend.assign_lead(id, &driver_id).await,
            SourceSelection::Registration(id) => {
                self.backend.assign_registration(id, &driver_id).await
            }
            SourceSelection::Transactions(ids) => {
                let tx_ids: Vec<i64> = ids.iter().copied().collect();
                let milestone_ids: Vec<i64> =
                    self.state.milestones.iter().map(|m| m.id).collect();
                self.backend
                    .assign_transactions(&tx_ids, &driver_id, &milestone_ids)
                    .await
            }
            SourceSelection::None => unreachable!("guarded above"),
        };
        self.state.assigning = false;

        match result {
            Ok(()) => {
                counter!("reconcile_assignments_total").increment(1);
                self.state.clear_source();
                self.state.clear_driver();
                match selection {
                    SourceSelection::Lead(_) => self.reload_leads().await,
                    SourceSelection::Registration(_) => self.reload_registrations().await,
                    SourceSelection::Transactions(_) => self.reload_transactions().await,
                    SourceSelection::None => {}
                }
                true
            }
            Err(e) => {
                counter!("reconcile_assignment_errors_total").increment(1);
                self.state.last_error = Some(format!("assignment failed: {e:#}"));
                false
            }
        }
    }

    // --- confirmation-gated destructive operations ---

    /// Discard one lead. Declined confirmation aborts silently.
    pub async fn discard_lead(&mut self, lead_id: &str, confirmation: Confirmation) -> bool {
        if confirmation == Confirmation::Declined {
            return false;
        }
        self.state.last_error = None;
        match self.backend.discard_lead(lead_id).await {
            Ok(()) => {
                counter!("reconcile_discards_total").increment(1);
                self.reload_leads().await;
                true
            }
            Err(e) => {
                self.state.last_error = Some(format!("discard failed: {e:#}"));
                false
            }
        }
    }

    /// Re-run the server-side matcher over every unmatched transaction.
    pub async fn reprocess_transactions(
        &mut self,
        confirmation: Confirmation,
    ) -> Option<ReprocessSummary> {
        if confirmation == Confirmation::Declined {
            return None;
        }
        self.state.last_error = None;
        match self.backend.reprocess_transactions().await {
            Ok(summary) => {
                counter!("reconcile_reprocess_runs_total").increment(1);
                self.reload_transactions().await;
                Some(summary)
            }
            Err(e) => {
                self.state.last_error = Some(format!("reprocess failed: {e:#}"));
                None
            }
        }
    }

    /// Delete duplicate transactions server-side.
    pub async fn cleanup_duplicates(
        &mut self,
        confirmation: Confirmation,
    ) -> Option<CleanupSummary> {
        if confirmation == Confirmation::Declined {
            return None;
        }
        self.state.last_error = None;
        match self.backend.cleanup_duplicate_transactions().await {
            Ok(summary) => {
                counter!("reconcile_cleanup_runs_total").increment(1);
                self.reload_transactions().await;
                Some(summary)
            }
            Err(e) => {
                self.state.last_error = Some(format!("cleanup failed: {e:#}"));
                None
            }
        }
    }
}
