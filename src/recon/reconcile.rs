use crate::recon::model::{ReconciliationResult, Record};
use std::collections::HashSet;

/// Split two keyed record sets into left-only, right-only and shared buckets.
///
/// Both inputs must already have unique keys (see [`crate::recon::normalize`]).
/// Shared records are taken from `left`, so the left side's attributes win.
pub fn reconcile(left: &[Record], right: &[Record]) -> ReconciliationResult {
    let right_keys: HashSet<&str> = right.iter().map(|r| r.key.as_str()).collect();
    let left_keys: HashSet<&str> = left.iter().map(|r| r.key.as_str()).collect();

    let (both, left_only): (Vec<Record>, Vec<Record>) = left
        .iter()
        .cloned()
        .partition(|r| right_keys.contains(r.key.as_str()));

    let right_only: Vec<Record> = right
        .iter()
        .filter(|r| !left_keys.contains(r.key.as_str()))
        .cloned()
        .collect();

    ReconciliationResult {
        left_only,
        right_only,
        both,
        total_left: left.len(),
        total_right: right.len(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::recon::model::Origin;

    pub(crate) fn fixture_enterprise() -> Vec<Record> {
        [
            "alice_corp",
            "bob_corp",
            "charlie_corp",
            "diana_corp",
            "eve_corp",
            "frank_corp",
            "grace_corp",
            "henry_corp",
        ]
        .iter()
        .map(|login| Record::new(*login, Origin::Enterprise))
        .collect()
    }

    pub(crate) fn fixture_copilot() -> Vec<Record> {
        [
            "alice_corp",
            "charlie_corp",
            "eve_corp",
            "external_user",
            "grace_corp",
        ]
        .iter()
        .map(|login| Record::new(*login, Origin::Copilot))
        .collect()
    }

    fn keys(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.key.as_str()).collect()
    }

    #[test]
    fn enterprise_vs_copilot_fixture() {
        let result = reconcile(&fixture_enterprise(), &fixture_copilot());

        assert_eq!(
            keys(&result.left_only),
            vec!["bob_corp", "diana_corp", "frank_corp", "henry_corp"]
        );
        assert_eq!(keys(&result.right_only), vec!["external_user"]);
        assert_eq!(
            keys(&result.both),
            vec!["alice_corp", "charlie_corp", "eve_corp", "grace_corp"]
        );
        assert_eq!(result.total_left, 8);
        assert_eq!(result.total_right, 5);
    }

    #[test]
    fn shared_records_keep_left_attributes() {
        let result = reconcile(&fixture_enterprise(), &fixture_copilot());
        assert!(result.both.iter().all(|r| r.origin == Origin::Enterprise));
    }

    #[test]
    fn empty_right_puts_everything_left_only() {
        let left = fixture_enterprise();
        let result = reconcile(&left, &[]);
        assert_eq!(result.left_only, left);
        assert!(result.both.is_empty());
        assert!(result.right_only.is_empty());
    }

    #[test]
    fn empty_left_puts_everything_right_only() {
        let right = fixture_copilot();
        let result = reconcile(&[], &right);
        assert_eq!(result.right_only, right);
        assert!(result.both.is_empty());
        assert_eq!(result.total_left, 0);
    }

    #[test]
    fn partition_counts_add_up() {
        let result = reconcile(&fixture_enterprise(), &fixture_copilot());
        assert_eq!(result.left_only.len() + result.both.len(), result.total_left);
        assert_eq!(result.right_only.len() + result.both.len(), result.total_right);
    }

    #[test]
    fn shared_keys_are_symmetric() {
        let forward = reconcile(&fixture_enterprise(), &fixture_copilot());
        let backward = reconcile(&fixture_copilot(), &fixture_enterprise());
        assert_eq!(keys(&forward.both), keys(&backward.both));
        assert_eq!(keys(&forward.left_only), keys(&backward.right_only));
    }

    #[test]
    fn reconcile_is_deterministic() {
        let a = reconcile(&fixture_enterprise(), &fixture_copilot());
        let b = reconcile(&fixture_enterprise(), &fixture_copilot());
        assert_eq!(a, b);
    }
}
