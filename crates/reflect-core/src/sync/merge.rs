//! Local-wins merge of remote records into local collections.
//!
//! No remote record ever overwrites or removes a local one. Remote records
//! whose identity is absent locally are appended.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::model::{DayLog, Goal};

/// Merge goals by `id`. Returns the merged list and how many were added.
pub fn merge_goals(local: Vec<Goal>, remote: Vec<Goal>) -> (Vec<Goal>, usize) {
    let mut known: HashSet<String> = local.iter().map(|g| g.id.clone()).collect();
    let mut merged = local;
    let before = merged.len();
    for goal in remote {
        if known.insert(goal.id.clone()) {
            merged.push(goal);
        }
    }
    let added = merged.len() - before;
    (merged, added)
}

/// Merge logs by `(id, date)`, then order by date descending.
///
/// The sort is stable, so a local log precedes a remote one on the same date.
pub fn merge_logs(local: Vec<DayLog>, remote: Vec<DayLog>) -> (Vec<DayLog>, usize) {
    let mut known: HashSet<(String, NaiveDate)> =
        local.iter().map(|l| (l.id.clone(), l.date)).collect();
    let mut merged = local;
    let before = merged.len();
    for log in remote {
        if known.insert((log.id.clone(), log.date)) {
            merged.push(log);
        }
    }
    let added = merged.len() - before;
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    (merged, added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DayStatus;
    use proptest::prelude::*;

    fn goal(id: &str, name: &str) -> Goal {
        let mut g = Goal::new(name, "Q1-2025");
        g.id = id.to_string();
        g
    }

    fn log(id: &str, date: &str) -> DayLog {
        let mut l = DayLog::new(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap());
        l.id = id.to_string();
        l
    }

    #[test]
    fn local_goal_wins_on_id_collision() {
        let local = vec![goal("a", "Local A")];
        let remote = vec![goal("a", "Remote A"), goal("b", "Remote B")];

        let (merged, added) = merge_goals(local, remote);
        assert_eq!(added, 1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Local A");
        assert_eq!(merged[1].id, "b");
    }

    #[test]
    fn remote_duplicates_are_added_once() {
        let (merged, added) = merge_goals(Vec::new(), vec![goal("x", "1"), goal("x", "2")]);
        assert_eq!(added, 1);
        assert_eq!(merged[0].name, "1");
    }

    #[test]
    fn logs_sorted_descending_local_first_on_ties() {
        let mut local_log = log("l1", "2025-01-10");
        local_log.status = Some(DayStatus::Yes);
        let local = vec![local_log, log("l0", "2025-01-08")];
        let remote = vec![
            log("l1", "2025-01-10"),
            log("r1", "2025-01-10"),
            log("r2", "2025-01-12"),
        ];

        let (merged, added) = merge_logs(local, remote);
        assert_eq!(added, 2);
        let ids: Vec<&str> = merged.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "l1", "r1", "l0"]);
        assert_eq!(merged[1].status, Some(DayStatus::Yes));
    }

    #[test]
    fn same_id_on_another_date_is_a_distinct_log() {
        let (merged, added) = merge_logs(
            vec![log("x", "2025-01-10")],
            vec![log("x", "2025-01-11")],
        );
        assert_eq!(added, 1);
        assert_eq!(merged.len(), 2);
    }

    proptest! {
        #[test]
        fn goal_merge_cardinality(
            local_ids in prop::collection::hash_set("[a-f]", 0..6),
            remote_ids in prop::collection::hash_set("[a-f]", 0..6),
        ) {
            let local: Vec<Goal> = local_ids.iter().map(|id| goal(id, "local")).collect();
            let remote: Vec<Goal> = remote_ids.iter().map(|id| goal(id, "remote")).collect();
            let (merged, _) = merge_goals(local, remote);

            let union: HashSet<&String> = local_ids.iter().chain(remote_ids.iter()).collect();
            prop_assert_eq!(merged.len(), union.len());
            for g in &merged {
                if local_ids.contains(&g.id) {
                    prop_assert_eq!(g.name.as_str(), "local");
                }
            }
        }

        #[test]
        fn log_merge_keeps_every_local_log(
            local in prop::collection::vec(("[a-c]", 1u32..20), 0..8),
            remote in prop::collection::vec(("[a-c]", 1u32..20), 0..8),
        ) {
            let mk = |(id, day): &(String, u32)| {
                let mut l = DayLog::new(NaiveDate::from_ymd_opt(2025, 3, *day).unwrap());
                l.id = id.clone();
                l
            };
            let local: Vec<DayLog> = local.iter().map(mk).collect();
            let remote: Vec<DayLog> = remote.iter().map(mk).collect();
            let (merged, _) = merge_logs(local.clone(), remote);

            for l in &local {
                prop_assert!(merged.iter().any(|m| m == l));
            }
            prop_assert!(merged.windows(2).all(|w| w[0].date >= w[1].date));
        }
    }
}
