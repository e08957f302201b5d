use crate::search::SearchResult;
use crate::surface::PageSurfaces;

/// `current/total` summary shown next to the search field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStatus {
    pub current: Option<usize>,
    pub total: usize,
}

/// Cursor over the highlight list. `current < total` whenever `total > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchNavigator {
    current: usize,
    total: usize,
}

impl MatchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// New result set: cursor returns to the first match.
    pub fn reset(&mut self, total: usize) {
        self.total = total;
        self.current = 0;
    }

    /// Recomputed result set for the same query: the cursor is kept if still valid.
    pub fn retain(&mut self, total: usize) {
        self.total = total;
        if self.current >= total {
            self.current = 0;
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn current(&self) -> Option<usize> {
        (self.total > 0).then_some(self.current)
    }

    pub fn status(&self) -> MatchStatus {
        MatchStatus {
            current: self.current(),
            total: self.total,
        }
    }

    pub fn next(&mut self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        self.current = (self.current + 1) % self.total;
        Some(self.current)
    }

    pub fn prev(&mut self) -> Option<usize> {
        if self.total == 0 {
            return None;
        }
        self.current = (self.current + self.total - 1) % self.total;
        Some(self.current)
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.total {
            self.current = index;
            true
        } else {
            false
        }
    }

    /// Restyles current vs. other highlights without re-searching.
    pub fn restyle(&self, result: &mut SearchResult, surfaces: &mut PageSurfaces) {
        let current = self.current();
        result.restyle(current);
        surfaces.restyle(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_wraps_around_after_total_steps() {
        let mut navigator = MatchNavigator::new();
        navigator.reset(5);
        navigator.select(3);
        for _ in 0..5 {
            navigator.next();
        }
        assert_eq!(navigator.current(), Some(3));
    }

    #[test]
    fn prev_wraps_to_last_match() {
        let mut navigator = MatchNavigator::new();
        navigator.reset(4);
        assert_eq!(navigator.prev(), Some(3));
        assert_eq!(navigator.next(), Some(0));
    }

    #[test]
    fn empty_result_makes_navigation_a_no_op() {
        let mut navigator = MatchNavigator::new();
        navigator.reset(0);
        assert_eq!(navigator.next(), None);
        assert_eq!(navigator.prev(), None);
        assert_eq!(navigator.status(), MatchStatus { current: None, total: 0 });
    }

    #[test]
    fn retain_keeps_cursor_across_recompute() {
        let mut navigator = MatchNavigator::new();
        navigator.reset(6);
        navigator.select(4);
        navigator.retain(6);
        assert_eq!(navigator.current(), Some(4));
        navigator.retain(2);
        assert_eq!(navigator.current(), Some(0));
    }

    #[test]
    fn select_rejects_out_of_range_index() {
        let mut navigator = MatchNavigator::new();
        navigator.reset(2);
        assert!(!navigator.select(2));
        assert_eq!(navigator.current(), Some(0));
    }
}
