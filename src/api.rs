// src/api.rs
//! HTTP surface for the operator UI. Handlers stay thin: lock the one
//! reconciler mutex, apply a transition or orchestrated call, return a state
//! snapshot. The single mutex is what serializes all engine mutation.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::backend::ReconcileBackend;
use crate::filter::FilterParams;
use crate::grouping::TransactionGroup;
use crate::model::{
    CleanupSummary, Driver, Lead, MilestoneInstance, ReprocessSummary, ScoutRegistration,
    UploadMeta,
};
use crate::workflow::{Confirmation, DriverRow, Reconciler, SourceSelection, Stage};

pub struct AppState<B> {
    reconciler: Arc<Mutex<Reconciler<B>>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

pub fn create_router<B>(reconciler: Reconciler<B>) -> Router
where
    B: ReconcileBackend + 'static,
{
    let state = AppState {
        reconciler: Arc::new(Mutex::new(reconciler)),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/state", get(state_snapshot))
        .route("/reload", post(reload_all))
        .route("/drivers/load", post(load_drivers))
        .route("/drivers/select", post(select_driver))
        .route("/drivers/clear", post(clear_driver))
        .route("/leads/select", post(select_lead))
        .route("/leads/discard", post(discard_lead))
        .route("/registrations/select", post(select_registration))
        .route("/transactions/toggle", post(toggle_transaction))
        .route("/transactions/reprocess", post(reprocess))
        .route("/transactions/cleanup", post(cleanup))
        .route("/source/clear", post(clear_source))
        .route("/groups/toggle", post(toggle_group))
        .route("/groups/select-all", post(group_select_all))
        .route("/groups/deselect-all", post(group_deselect_all))
        .route("/filters", post(set_filter))
        .route("/assign", post(assign))
        .route("/uploads/meta", get(upload_meta))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// What the UI renders: derived visible lists plus raw selection state.
#[derive(Serialize)]
pub struct StateView {
    pub stage: Stage,
    pub leads: Vec<Lead>,
    pub registrations: Vec<ScoutRegistration>,
    pub groups: Vec<TransactionGroup>,
    pub drivers: Vec<DriverRow>,
    pub selection: SourceSelection,
    pub selected_driver: Option<Driver>,
    pub milestones: Vec<MilestoneInstance>,
    pub expanded_groups: BTreeSet<String>,
    pub last_error: Option<String>,
    pub pool_counts: PoolCounts,
}

#[derive(Serialize)]
pub struct PoolCounts {
    pub leads: usize,
    pub registrations: usize,
    pub transactions: usize,
    pub drivers: usize,
}

fn view<B: ReconcileBackend>(rec: &Reconciler<B>) -> StateView {
    let st = &rec.state;
    StateView {
        stage: st.stage(),
        leads: st.visible_leads(),
        registrations: st.visible_registrations(),
        groups: st.visible_groups(),
        drivers: st.visible_drivers(),
        selection: st.selection.clone(),
        selected_driver: st.selected_driver.clone(),
        milestones: st.milestones.clone(),
        expanded_groups: st.expanded_groups.clone(),
        last_error: st.last_error.clone(),
        pool_counts: PoolCounts {
            leads: st.leads.len(),
            registrations: st.registrations.len(),
            transactions: st.transactions.len(),
            drivers: st.drivers.len(),
        },
    }
}

async fn state_snapshot<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<StateView> {
    let rec = state.reconciler.lock().await;
    Json(view(&rec))
}

async fn reload_all<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.reload_all().await;
    Json(view(&rec))
}

#[derive(Deserialize)]
struct LoadDriversReq {
    #[serde(default)]
    from: Option<NaiveDate>,
    #[serde(default)]
    to: Option<NaiveDate>,
}

async fn load_drivers<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<LoadDriversReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.load_drivers(body.from, body.to).await;
    Json(view(&rec))
}

#[derive(Deserialize)]
struct IdReq {
    id: String,
}

#[derive(Deserialize)]
struct TxIdReq {
    id: i64,
}

#[derive(Deserialize)]
struct KeyReq {
    key: String,
}

async fn select_driver<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<IdReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.select_driver(&body.id).await;
    Json(view(&rec))
}

async fn clear_driver<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.clear_driver();
    Json(view(&rec))
}

async fn select_lead<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<IdReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.select_lead(&body.id);
    Json(view(&rec))
}

async fn select_registration<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<IdReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.select_registration(&body.id);
    Json(view(&rec))
}

async fn toggle_transaction<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<TxIdReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.toggle_transaction(body.id);
    Json(view(&rec))
}

async fn clear_source<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.clear_source();
    Json(view(&rec))
}

async fn toggle_group<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<KeyReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.toggle_group(&body.key);
    Json(view(&rec))
}

async fn group_select_all<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<KeyReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.select_all_in_group(&body.key);
    Json(view(&rec))
}

async fn group_deselect_all<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<KeyReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    rec.state.deselect_all_in_group(&body.key);
    Json(view(&rec))
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum FilterTarget {
    Leads,
    Registrations,
    Transactions,
    Drivers,
}

#[derive(Deserialize)]
struct SetFilterReq {
    target: FilterTarget,
    #[serde(flatten)]
    params: FilterParams,
}

async fn set_filter<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<SetFilterReq>,
) -> Json<StateView> {
    let mut rec = state.reconciler.lock().await;
    match body.target {
        FilterTarget::Leads => rec.state.lead_filter = body.params,
        FilterTarget::Registrations => rec.state.registration_filter = body.params,
        FilterTarget::Transactions => rec.state.transaction_filter = body.params,
        FilterTarget::Drivers => rec.state.driver_filter = body.params,
    }
    Json(view(&rec))
}

#[derive(Serialize)]
struct AssignResp {
    assigned: bool,
    #[serde(flatten)]
    state: StateView,
}

async fn assign<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<AssignResp> {
    let mut rec = state.reconciler.lock().await;
    let assigned = rec.assign_selected().await;
    Json(AssignResp {
        assigned,
        state: view(&rec),
    })
}

#[derive(Deserialize)]
struct DiscardReq {
    id: String,
    confirm: bool,
}

fn confirmation(confirm: bool) -> Confirmation {
    if confirm {
        Confirmation::Confirmed
    } else {
        Confirmation::Declined
    }
}

#[derive(Serialize)]
struct DiscardResp {
    discarded: bool,
    #[serde(flatten)]
    state: StateView,
}

async fn discard_lead<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<DiscardReq>,
) -> Json<DiscardResp> {
    let mut rec = state.reconciler.lock().await;
    let discarded = rec.discard_lead(&body.id, confirmation(body.confirm)).await;
    Json(DiscardResp {
        discarded,
        state: view(&rec),
    })
}

#[derive(Deserialize)]
struct ConfirmReq {
    confirm: bool,
}

#[derive(Serialize)]
struct ReprocessResp {
    summary: Option<ReprocessSummary>,
    #[serde(flatten)]
    state: StateView,
}

async fn reprocess<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<ConfirmReq>,
) -> Json<ReprocessResp> {
    let mut rec = state.reconciler.lock().await;
    let summary = rec
        .reprocess_transactions(confirmation(body.confirm))
        .await;
    Json(ReprocessResp {
        summary,
        state: view(&rec),
    })
}

#[derive(Serialize)]
struct CleanupResp {
    summary: Option<CleanupSummary>,
    #[serde(flatten)]
    state: StateView,
}

async fn cleanup<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(body): Json<ConfirmReq>,
) -> Json<CleanupResp> {
    let mut rec = state.reconciler.lock().await;
    let summary = rec.cleanup_duplicates(confirmation(body.confirm)).await;
    Json(CleanupResp {
        summary,
        state: view(&rec),
    })
}

#[derive(Serialize)]
struct UploadMetaResp {
    meta: Option<UploadMeta>,
    error: Option<String>,
}

async fn upload_meta<B: ReconcileBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Json<UploadMetaResp> {
    let rec = state.reconciler.lock().await;
    match rec.backend().fetch_upload_meta().await {
        Ok(meta) => Json(UploadMetaResp {
            meta: Some(meta),
            error: None,
        }),
        Err(e) => Json(UploadMetaResp {
            meta: None,
            error: Some(format!("could not load upload metadata: {e:#}")),
        }),
    }
}
