use super::handle::Handle;
use std::collections::{BTreeSet, HashSet};

/// Accounts followed that do not follow back: `following - followers`.
///
/// Sorted so batches and logs are stable across runs.
pub fn reconcile(following: &HashSet<Handle>, followers: &HashSet<Handle>) -> BTreeSet<Handle> {
    following.difference(followers).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<Handle> {
        names.iter().map(|n| Handle::parse(n).unwrap()).collect()
    }

    fn sorted(names: &[&str]) -> BTreeSet<Handle> {
        names.iter().map(|n| Handle::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_difference() {
        let targets = reconcile(&set(&["aa", "bb", "cc"]), &set(&["bb"]));
        assert_eq!(targets, sorted(&["aa", "cc"]));
    }

    #[test]
    fn test_identical_sets_yield_nothing() {
        let a = set(&["aa", "bb", "cc"]);
        assert!(reconcile(&a, &a).is_empty());
    }

    #[test]
    fn test_no_followers_targets_everyone() {
        let a = set(&["aa", "bb"]);
        assert_eq!(reconcile(&a, &HashSet::new()), sorted(&["aa", "bb"]));
    }

    #[test]
    fn test_empty_following() {
        assert!(reconcile(&HashSet::new(), &set(&["aa"])).is_empty());
    }

    #[test]
    fn test_followers_not_followed_are_ignored() {
        let targets = reconcile(&set(&["aa"]), &set(&["aa", "zz"]));
        assert!(targets.is_empty());
    }

    #[test]
    fn test_case_sensitive() {
        let targets = reconcile(&set(&["Bob"]), &set(&["bob"]));
        assert_eq!(targets, sorted(&["Bob"]));
    }
}
