//! Page gating rules: which pages of a module a learner may currently
//! reach, given the pages already completed and the learner's position.

use std::collections::BTreeSet;

use crate::model::Page;

/// Decides whether `target` is reachable from `current`.
///
/// Rules, in precedence order:
/// 1. Page 0 is always accessible.
/// 2. The immediately-next page (`current + 1`) is accessible unless the
///    current page carries a quiz that has not been passed yet; a quiz-free
///    current page unlocks its successor without being explicitly marked
///    complete.
/// 3. Any other target (jumping via an index control) is accessible only if
///    every quiz-bearing page before it has been completed; quiz-free pages
///    impose no constraint.
///
/// Out-of-range targets are never accessible. Pure predicate: same inputs,
/// same answer, no mutation.
#[must_use]
pub fn can_access(
    target: usize,
    pages: &[Page],
    completed_pages: &BTreeSet<usize>,
    current: usize,
) -> bool {
    if target >= pages.len() {
        return false;
    }
    if target == 0 {
        return true;
    }

    if target == current + 1 {
        return match pages.get(current) {
            Some(page) if page.requires_quiz() => completed_pages.contains(&current),
            Some(_) => true,
            None => false,
        };
    }

    pages[..target]
        .iter()
        .enumerate()
        .all(|(index, page)| !page.requires_quiz() || completed_pages.contains(&index))
}

/// The set of all page ordinals currently reachable from `current`.
///
/// Used to diff unlock events and to render index controls.
#[must_use]
pub fn unlocked_pages(
    pages: &[Page],
    completed_pages: &BTreeSet<usize>,
    current: usize,
) -> BTreeSet<usize> {
    (0..pages.len())
        .filter(|&index| can_access(index, pages, completed_pages, current))
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
