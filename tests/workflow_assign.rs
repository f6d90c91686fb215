// tests/workflow_assign.rs
// The selection/assignment state machine end to end against the mock backend:
// guards, reload-after-mutation, failure preservation and confirmation gates.

mod common;

use std::collections::BTreeSet;

use common::{date, lead, milestone, raw_driver, registration, tx, MockBackend};
use driver_reconciler::workflow::{Confirmation, Reconciler, SourceSelection, Stage};

async fn reconciler_with(backend: MockBackend) -> Reconciler<MockBackend> {
    let mut rec = Reconciler::new(backend, "mx");
    rec.reload_all().await;
    rec
}

async fn load_day_pool(rec: &mut Reconciler<MockBackend>) {
    rec.load_drivers(Some(date(2024, 1, 1)), None).await;
}

#[tokio::test]
async fn assign_without_both_selections_is_a_silent_noop() {
    let backend = MockBackend::new().with_leads(vec![lead("L1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;

    // Nothing selected.
    assert!(!rec.assign_selected().await);

    // Source only.
    rec.state.select_lead("L1");
    assert!(!rec.assign_selected().await);

    assert!(rec.state.last_error.is_none());
    assert!(backend.0.single_assigns.lock().unwrap().is_empty());
}

#[tokio::test]
async fn lead_assignment_clears_selection_and_reloads_pool() {
    let backend = MockBackend::new()
        .with_leads(vec![lead("L1", "Juan Perez", "111"), lead("L2", "Ana Soto", "222")])
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.state.select_lead("L1");
    rec.select_driver("D1").await;
    assert_eq!(rec.state.stage(), Stage::ReadyToAssign);

    assert!(rec.assign_selected().await);

    assert_eq!(
        backend.0.single_assigns.lock().unwrap().as_slice(),
        &[("L1".to_string(), "D1".to_string())]
    );
    // Pool reloaded from the server: L1 is gone, L2 remains.
    assert_eq!(rec.state.leads.len(), 1);
    assert_eq!(rec.state.leads[0].id, "L2");
    assert_eq!(rec.state.stage(), Stage::Idle);
    assert!(rec.state.last_error.is_none());
}

#[tokio::test]
async fn failed_assignment_preserves_selection_and_sets_error() {
    let backend = MockBackend::new()
        .with_leads(vec![lead("L1", "Juan Perez", "111")])
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.state.select_lead("L1");
    rec.select_driver("D1").await;
    backend.fail_op("assign");

    let before_selection = rec.state.selection.clone();
    let before_driver = rec.state.selected_driver.clone();

    assert!(!rec.assign_selected().await);

    assert_eq!(rec.state.selection, before_selection);
    assert_eq!(rec.state.selected_driver, before_driver);
    assert!(rec.state.last_error.as_deref().unwrap().contains("assignment failed"));
    assert_eq!(rec.state.stage(), Stage::ReadyToAssign);

    // Retry after recovery succeeds without re-selecting, and the error slot
    // is cleared at the start of the attempt.
    backend.recover_op("assign");
    assert!(rec.assign_selected().await);
    assert!(rec.state.last_error.is_none());
}

#[tokio::test]
async fn batch_assignment_attaches_cached_milestones() {
    let backend = MockBackend::new()
        .with_transactions(vec![tx(1, Some("Juan Perez")), tx(2, Some("Juan Perez")), tx(3, None)])
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")])
        .with_milestones(vec![milestone(71), milestone(72)]);
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.state.select_all_in_group("Juan Perez");
    rec.select_driver("D1").await;
    assert_eq!(rec.state.milestones.len(), 2);

    assert!(rec.assign_selected().await);

    let calls = backend.0.batch_assigns.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].transaction_ids, vec![1, 2]);
    assert_eq!(calls[0].driver_id, "D1");
    assert_eq!(calls[0].milestone_ids, vec![71, 72]);
    drop(calls);

    // Selection set, driver and milestone cache all cleared; pool reloaded.
    assert_eq!(rec.state.selection, SourceSelection::None);
    assert!(rec.state.selected_driver.is_none());
    assert!(rec.state.milestones.is_empty());
    assert_eq!(rec.state.transactions.len(), 1);
    assert_eq!(rec.state.groups.len(), 1);
    assert_eq!(rec.state.groups[0].key, "single-3");
}

#[tokio::test]
async fn batch_assignment_without_milestones_sends_empty_list() {
    let backend = MockBackend::new()
        .with_transactions(vec![tx(1, None)])
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.state.toggle_transaction(1);
    rec.select_driver("D1").await;
    assert!(rec.state.milestones.is_empty());

    assert!(rec.assign_selected().await);
    let calls = backend.0.batch_assigns.lock().unwrap();
    assert!(calls[0].milestone_ids.is_empty());
}

#[tokio::test]
async fn milestone_fetch_failure_keeps_driver_selected_with_empty_cache() {
    let backend = MockBackend::new()
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")]);
    backend.fail_op("fetch_milestones");
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.select_driver("D1").await;
    assert!(rec.state.selected_driver.is_some());
    assert!(rec.state.milestones.is_empty());
    assert!(rec.state.last_error.as_deref().unwrap().contains("milestones"));
}

#[tokio::test]
async fn discard_declined_changes_nothing() {
    let backend = MockBackend::new().with_leads(vec![lead("L1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;

    assert!(!rec.discard_lead("L1", Confirmation::Declined).await);
    assert!(backend.0.discards.lock().unwrap().is_empty());
    assert_eq!(rec.state.leads.len(), 1);
    assert!(rec.state.last_error.is_none());
}

#[tokio::test]
async fn discard_confirmed_removes_the_lead_after_reload() {
    let backend = MockBackend::new()
        .with_leads(vec![lead("L1", "Juan Perez", "111"), lead("L2", "Ana Soto", "222")]);
    let mut rec = reconciler_with(backend.clone()).await;
    rec.state.select_lead("L1");

    assert!(rec.discard_lead("L1", Confirmation::Confirmed).await);
    assert_eq!(rec.state.leads.len(), 1);
    assert_eq!(rec.state.leads[0].id, "L2");
    // Selection referenced the discarded lead; reload pruned it.
    assert_eq!(rec.state.selection, SourceSelection::None);
}

#[tokio::test]
async fn reprocess_requires_confirmation_and_returns_counts() {
    let backend = MockBackend::new().with_transactions(vec![tx(1, None), tx(2, None)]);
    *backend.0.reprocess_summary.lock().unwrap() =
        Some(driver_reconciler::model::ReprocessSummary {
            total: 2,
            matched: 1,
            unmatched: 1,
            message: "1 of 2 matched".into(),
        });
    let mut rec = reconciler_with(backend.clone()).await;

    assert!(rec
        .reprocess_transactions(Confirmation::Declined)
        .await
        .is_none());
    assert_eq!(*backend.0.reprocess_calls.lock().unwrap(), 0);

    let summary = rec
        .reprocess_transactions(Confirmation::Confirmed)
        .await
        .unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(*backend.0.reprocess_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn cleanup_failure_surfaces_error_and_keeps_pool() {
    let backend = MockBackend::new().with_transactions(vec![tx(1, None)]);
    backend.fail_op("cleanup");
    let mut rec = reconciler_with(backend.clone()).await;

    assert!(rec.cleanup_duplicates(Confirmation::Confirmed).await.is_none());
    assert!(rec.state.last_error.as_deref().unwrap().contains("cleanup failed"));
    assert_eq!(rec.state.transactions.len(), 1);
}

#[tokio::test]
async fn whole_pool_fetch_failure_keeps_previous_pool() {
    let backend = MockBackend::new().with_leads(vec![lead("L1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;
    assert_eq!(rec.state.leads.len(), 1);

    backend.fail_op("fetch_leads");
    rec.reload_leads().await;

    assert_eq!(rec.state.leads.len(), 1, "pool must keep its previous value");
    assert!(rec.state.last_error.as_deref().unwrap().contains("could not load leads"));
}

#[tokio::test]
async fn registration_assignment_uses_the_single_variant() {
    let backend = MockBackend::new()
        .with_registrations(vec![registration("R1", "Juan Perez", "111", "LIC-1")])
        .with_driver_day(date(2024, 1, 1), vec![raw_driver("D1", "Juan Perez", "111")]);
    let mut rec = reconciler_with(backend.clone()).await;
    load_day_pool(&mut rec).await;

    rec.state.select_registration("R1");
    rec.select_driver("D1").await;
    assert!(rec.assign_selected().await);

    assert_eq!(
        backend.0.single_assigns.lock().unwrap().as_slice(),
        &[("R1".to_string(), "D1".to_string())]
    );
    assert!(rec.state.registrations.is_empty());
    assert!(backend.0.batch_assigns.lock().unwrap().is_empty());
}
