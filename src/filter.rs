// src/filter.rs
//! Text + date-range filtering over the browsable collections. One engine,
//! identical combination rules everywhere; only the searchable field set
//! differs per collection. All predicates are pure and AND-combined.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::grouping::TransactionGroup;
use crate::model::{Driver, Lead, ScoutRegistration, Transaction};

/// Operator-entered filter values. Each predicate is independently optional:
/// an empty term and unset bounds pass everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
}

impl FilterParams {
    pub fn is_empty(&self) -> bool {
        self.term.trim().is_empty() && self.date_from.is_none() && self.date_to.is_none()
    }
}

/// Per-collection searchable fields plus the date the range bounds apply to.
pub trait Searchable {
    fn search_fields(&self) -> Vec<String>;
    fn item_date(&self) -> Option<NaiveDateTime>;
}

impl Searchable for Lead {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.phone.clone(),
        ]
    }
    fn item_date(&self) -> Option<NaiveDateTime> {
        Some(self.created_at)
    }
}

impl Searchable for ScoutRegistration {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.phone.clone(),
            self.license_number.clone(),
        ]
    }
    fn item_date(&self) -> Option<NaiveDateTime> {
        Some(self.registered_at)
    }
}

impl Searchable for Driver {
    fn search_fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.full_name.clone(),
            self.phone.clone(),
            self.license_number.clone(),
        ]
    }
    fn item_date(&self) -> Option<NaiveDateTime> {
        self.hire_date.and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

impl Searchable for Transaction {
    fn search_fields(&self) -> Vec<String> {
        let mut fields = vec![self.id.to_string()];
        if let Some(c) = &self.comment {
            fields.push(c.clone());
        }
        if let Some(n) = &self.driver_name_from_comment {
            fields.push(n.clone());
        }
        fields
    }
    fn item_date(&self) -> Option<NaiveDateTime> {
        Some(self.tx_date)
    }
}

/// Extend the "to" bound to the end of that calendar day, making it inclusive
/// of the whole day rather than just midnight.
fn end_of_day(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_milli_opt(23, 59, 59, 999)
        .expect("23:59:59.999 is always a valid time")
}

fn passes_text<T: Searchable>(item: &T, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    item.search_fields()
        .iter()
        .any(|f| f.to_lowercase().contains(&term))
}

// Items without a date (e.g. a driver with no recorded hire date) are not
// rejected by the range bounds; there is nothing to compare against.
fn passes_date<T: Searchable>(
    item: &T,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> bool {
    let Some(date) = item.item_date() else {
        return true;
    };
    if let Some(from) = from {
        if date < from.and_hms_opt(0, 0, 0).expect("midnight is valid") {
            return false;
        }
    }
    if let Some(to) = to {
        if date > end_of_day(to) {
            return false;
        }
    }
    true
}

/// Keep items passing text AND date-from AND date-to.
pub fn apply<T: Searchable + Clone>(items: &[T], params: &FilterParams) -> Vec<T> {
    items
        .iter()
        .filter(|it| {
            passes_text(*it, &params.term)
                && passes_date(*it, params.date_from, params.date_to)
        })
        .cloned()
        .collect()
}

// For groups the text term is matched against member comments and parsed
// names only; transaction ids stay out of it.
fn member_text_matches(t: &Transaction, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    t.comment
        .as_deref()
        .into_iter()
        .chain(t.driver_name_from_comment.as_deref())
        .any(|f| f.to_lowercase().contains(&term))
}

/// Group semantics: a group passes a predicate if at least one member does.
/// The two predicates are evaluated independently, then AND-combined.
pub fn apply_to_groups(
    groups: &[TransactionGroup],
    params: &FilterParams,
) -> Vec<TransactionGroup> {
    groups
        .iter()
        .filter(|g| {
            let any_text = g
                .transactions
                .iter()
                .any(|t| member_text_matches(t, &params.term));
            let any_date = g
                .transactions
                .iter()
                .any(|t| passes_date(t, params.date_from, params.date_to));
            any_text && any_date
        })
        .cloned()
        .collect()
}
