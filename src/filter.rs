use std::cmp::Ordering;

use crate::domain::{FilterConfig, NotificationThread};

/// Narrow a fetched batch down to what the feed should show, newest first.
///
/// Include-lists are allow-lists only when non-empty and always run before
/// the matching exclude-list.
pub fn apply(raw: Vec<NotificationThread>, cfg: &FilterConfig) -> Vec<NotificationThread> {
    let total = raw.len();
    let mut kept: Vec<NotificationThread> = raw
        .into_iter()
        .filter(|thread| !cfg.participating_only || thread.reason.is_participating())
        .filter(|thread| cfg.include_read || thread.unread)
        .filter(|thread| {
            cfg.reasons_include.is_empty() || cfg.reasons_include.contains(&thread.reason)
        })
        .filter(|thread| !cfg.reasons_exclude.contains(&thread.reason))
        .filter(|thread| {
            cfg.repos_include.is_empty()
                || thread
                    .repo_name()
                    .is_some_and(|repo| cfg.repos_include.contains(repo))
        })
        .filter(|thread| {
            thread
                .repo_name()
                .is_none_or(|repo| !cfg.repos_exclude.contains(repo))
        })
        .collect();

    kept.sort_by(newest_first);
    tracing::debug!("Filtered {} notifications down to {}", total, kept.len());
    kept
}

fn newest_first(a: &NotificationThread, b: &NotificationThread) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| id_key(&a.id).cmp(&id_key(&b.id)))
}

// Thread ids are decimal strings; comparing length first keeps "9" before "10".
fn id_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{Reason, Repository};

    fn thread(id: &str, repo: &str, reason: Reason, unread: bool, minute: u32) -> NotificationThread {
        NotificationThread {
            id: id.into(),
            repository: Some(Repository {
                full_name: repo.into(),
                html_url: Some(format!("https://github.com/{repo}")),
            }),
            title: Some(format!("thread {id}")),
            subject_type: Some("Issue".into()),
            reason,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            unread,
            url: None,
            html_url: None,
        }
    }

    fn ids(threads: &[NotificationThread]) -> Vec<&str> {
        threads.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn participating_unread_and_excluded_reason_leave_only_mention() {
        let raw = vec![
            thread("1", "a/b", Reason::Subscribed, false, 1),
            thread("2", "a/b", Reason::Mention, true, 2),
            thread("3", "a/b", Reason::CiActivity, true, 3),
        ];
        let cfg = FilterConfig {
            participating_only: true,
            include_read: false,
            reasons_exclude: [Reason::CiActivity].into_iter().collect(),
            ..FilterConfig::default()
        };

        let out = apply(raw, &cfg);
        assert_eq!(ids(&out), vec!["2"]);
    }

    #[test]
    fn empty_include_lists_do_not_restrict() {
        let raw = vec![
            thread("1", "a/b", Reason::Comment, true, 1),
            thread("2", "c/d", Reason::Author, true, 2),
        ];
        let out = apply(raw, &FilterConfig::default());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn reasons_include_applies_before_exclude() {
        let raw = vec![
            thread("1", "a/b", Reason::Mention, true, 1),
            thread("2", "a/b", Reason::Comment, true, 2),
            thread("3", "a/b", Reason::Assign, true, 3),
        ];
        let cfg = FilterConfig {
            reasons_include: [Reason::Mention, Reason::Comment].into_iter().collect(),
            reasons_exclude: [Reason::Comment].into_iter().collect(),
            ..FilterConfig::default()
        };

        let out = apply(raw, &cfg);
        for t in &out {
            assert!(cfg.reasons_include.contains(&t.reason));
            assert!(!cfg.reasons_exclude.contains(&t.reason));
        }
        assert_eq!(ids(&out), vec!["1"]);
    }

    #[test]
    fn repo_include_without_match_yields_nothing() {
        let raw = vec![
            thread("1", "a/b", Reason::Mention, true, 1),
            thread("2", "c/d", Reason::Mention, true, 2),
        ];
        let cfg = FilterConfig {
            repos_include: ["x/y".to_owned()].into_iter().collect(),
            ..FilterConfig::default()
        };
        assert!(apply(raw, &cfg).is_empty());
    }

    #[test]
    fn repo_exclude_drops_matching_repository() {
        let raw = vec![
            thread("1", "a/b", Reason::Mention, true, 1),
            thread("2", "c/d", Reason::Mention, true, 2),
        ];
        let cfg = FilterConfig {
            repos_exclude: ["c/d".to_owned()].into_iter().collect(),
            ..FilterConfig::default()
        };
        assert_eq!(ids(&apply(raw, &cfg)), vec!["1"]);
    }

    #[test]
    fn threads_without_repository_fail_repo_allow_list_only() {
        let mut orphan = thread("1", "a/b", Reason::Mention, true, 1);
        orphan.repository = None;

        let exclude = FilterConfig {
            repos_exclude: ["a/b".to_owned()].into_iter().collect(),
            ..FilterConfig::default()
        };
        assert_eq!(apply(vec![orphan.clone()], &exclude).len(), 1);

        let include = FilterConfig {
            repos_include: ["a/b".to_owned()].into_iter().collect(),
            ..FilterConfig::default()
        };
        assert!(apply(vec![orphan], &include).is_empty());
    }

    #[test]
    fn sorts_newest_first_then_by_numeric_id() {
        let raw = vec![
            thread("10", "a/b", Reason::Mention, true, 5),
            thread("7", "a/b", Reason::Mention, true, 1),
            thread("9", "a/b", Reason::Mention, true, 5),
            thread("3", "a/b", Reason::Mention, true, 9),
        ];
        let out = apply(raw, &FilterConfig::default());
        assert_eq!(ids(&out), vec!["3", "9", "10", "7"]);
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let forward = vec![
            thread("1", "a/b", Reason::Mention, true, 2),
            thread("2", "a/b", Reason::Comment, true, 2),
            thread("3", "c/d", Reason::Author, true, 4),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let cfg = FilterConfig::default();
        assert_eq!(apply(forward, &cfg), apply(reversed, &cfg));
    }
}
