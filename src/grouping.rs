// src/grouping.rs
//! Partition the flat unmatched-transaction pool into operator-actionable
//! groups keyed by the upstream-parsed driver-name token. Groups are derived
//! values: recomputed in full on every pool reload, never diffed or patched.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::model::Transaction;

/// A transient cluster of transactions sharing a parsed name token, or a
/// singleton when no name could be parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionGroup {
    pub key: String,
    pub transactions: Vec<Transaction>,
}

impl TransactionGroup {
    pub fn count(&self) -> usize {
        self.transactions.len()
    }

    pub fn transaction_ids(&self) -> Vec<i64> {
        self.transactions.iter().map(|t| t.id).collect()
    }
}

fn name_token(tx: &Transaction) -> Option<&str> {
    tx.driver_name_from_comment
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Cluster transactions by name token, in order of first appearance.
///
/// A transaction without a token becomes its own `single-<id>` group, so
/// every transaction belongs to exactly one group.
pub fn group_transactions(pool: &[Transaction]) -> Vec<TransactionGroup> {
    let mut groups: Vec<TransactionGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for tx in pool {
        let key = match name_token(tx) {
            Some(token) => token.to_string(),
            None => format!("single-{}", tx.id),
        };
        match by_key.get(&key) {
            Some(&idx) => groups[idx].transactions.push(tx.clone()),
            None => {
                by_key.insert(key.clone(), groups.len());
                groups.push(TransactionGroup {
                    key,
                    transactions: vec![tx.clone()],
                });
            }
        }
    }

    groups
}

/// Default UI state: every group starts expanded.
pub fn all_expanded(groups: &[TransactionGroup]) -> BTreeSet<String> {
    groups.iter().map(|g| g.key.clone()).collect()
}

// Selection-set operations are replace-on-write: they take the current set
// and return a new one touching only the given group's own transaction ids.

pub fn select_all_in_group(
    selection: &BTreeSet<i64>,
    group: &TransactionGroup,
) -> BTreeSet<i64> {
    let mut next = selection.clone();
    next.extend(group.transactions.iter().map(|t| t.id));
    next
}

pub fn deselect_all_in_group(
    selection: &BTreeSet<i64>,
    group: &TransactionGroup,
) -> BTreeSet<i64> {
    let own: BTreeSet<i64> = group.transactions.iter().map(|t| t.id).collect();
    selection.difference(&own).copied().collect()
}
