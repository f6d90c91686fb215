//! # Date-Range Driver Aggregator
//! Assembles the candidate driver pool for an operator-chosen date span from
//! the day-granular registry API: one fetch per calendar day, awaited
//! sequentially, per-day failures logged and skipped, then a last-day-wins
//! dedup by driver id.

use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::backend::ReconcileBackend;
use crate::model::{Driver, RawDriver};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "reconcile_days_fetched_total",
            "Registry day snapshots fetched successfully."
        );
        describe_counter!(
            "reconcile_day_fetch_errors_total",
            "Registry day snapshots skipped due to fetch errors."
        );
        describe_counter!(
            "reconcile_drivers_deduped_total",
            "Driver records replaced by a later day's snapshot."
        );
    });
}

/// Map a wire-shape driver record onto the one internal [`Driver`] shape.
/// Missing fields become empty strings; this is the only place alternate
/// upstream spellings are resolved.
pub fn canonicalize(raw: RawDriver) -> Driver {
    Driver {
        id: raw.id.map(|v| v.into_string()).unwrap_or_default(),
        full_name: raw.full_name.unwrap_or_default(),
        phone: raw.phone.unwrap_or_default(),
        hire_date: raw.hire_date,
        license_number: raw.license_number.unwrap_or_default(),
    }
}

/// Merge day snapshots, in iteration order, into one deduplicated pool.
///
/// When two records share an id the later snapshot wins ("most recent known
/// state wins") while the record keeps its first-seen position, so the
/// operator-facing ordering stays stable across overlapping days.
/// Returns the pool and the number of replaced records.
pub fn merge_snapshots<I>(snapshots: I) -> (Vec<Driver>, usize)
where
    I: IntoIterator<Item = Vec<RawDriver>>,
{
    let mut pool: Vec<Driver> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut replaced = 0usize;

    for day in snapshots {
        for raw in day {
            let driver = canonicalize(raw);
            match by_id.get(&driver.id) {
                Some(&idx) => {
                    pool[idx] = driver;
                    replaced += 1;
                }
                None => {
                    by_id.insert(driver.id.clone(), pool.len());
                    pool.push(driver);
                }
            }
        }
    }

    (pool, replaced)
}

/// Collect the candidate pool for a closed interval `[from, to]`.
///
/// - both bounds: one fetch per calendar day, awaited sequentially; a failed
///   day is logged and skipped, already-retrieved days are kept;
/// - one bound: exactly one fetch, its failure propagates to the caller;
/// - neither bound: idle, the empty pool (no calls issued).
pub async fn collect_range<B: ReconcileBackend + ?Sized>(
    backend: &B,
    scope_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Driver>> {
    ensure_metrics_described();

    let (from, to) = match (from, to) {
        (Some(f), Some(t)) => (f, t),
        (Some(single), None) | (None, Some(single)) => {
            let raw = backend.fetch_drivers(single, scope_id).await?;
            counter!("reconcile_days_fetched_total").increment(1);
            return Ok(raw.into_iter().map(canonicalize).collect());
        }
        (None, None) => return Ok(Vec::new()),
    };

    let mut days: Vec<Vec<RawDriver>> = Vec::new();
    let mut day = from;
    while day <= to {
        match backend.fetch_drivers(day, scope_id).await {
            Ok(snapshot) => {
                counter!("reconcile_days_fetched_total").increment(1);
                days.push(snapshot);
            }
            Err(e) => {
                tracing::warn!(error = ?e, %day, "driver snapshot fetch failed, skipping day");
                counter!("reconcile_day_fetch_errors_total").increment(1);
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break, // calendar overflow
        };
    }

    let (pool, replaced) = merge_snapshots(days);
    counter!("reconcile_drivers_deduped_total").increment(replaced as u64);
    Ok(pool)
}
