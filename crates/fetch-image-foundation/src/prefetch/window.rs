//! Prefetch window math.
//!
//! Pure functions: direction detection, window placement and the diff that
//! turns two consecutive windows into start/stop instructions.

use fetch_image_core::collections::map::HashSet;
use smallvec::SmallVec;

/// Ascending list of item indices. Inline for typical window sizes.
pub type IndexList = SmallVec<[usize; 16]>;

/// Direction inferred from two consecutive visible sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScrollDirection {
    /// Towards higher indices.
    #[default]
    Forward,
    /// Towards lower indices.
    Backward,
}

/// Half-open range of item positions `[lower, upper)` scheduled for prefetch.
///
/// Bounds are signed: a backward window near the top of the list may start
/// below zero. Negative positions never map to an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefetchWindow {
    lower: i64,
    upper: i64,
}

impl PrefetchWindow {
    /// The empty window, live before the first recomputation.
    pub const EMPTY: PrefetchWindow = PrefetchWindow { lower: 0, upper: 0 };

    /// Creates a window; an inverted range collapses to empty at `lower`.
    pub fn new(lower: i64, upper: i64) -> Self {
        Self {
            lower,
            upper: upper.max(lower),
        }
    }

    /// Window of `size` positions starting right after `last_visible`.
    pub fn after(last_visible: usize, size: usize) -> Self {
        let lower = last_visible as i64 + 1;
        Self::new(lower, lower + size as i64)
    }

    /// Window of `size` positions ending one position before `first_visible`.
    ///
    /// The position directly above the first visible item is not included.
    pub fn before(first_visible: usize, size: usize) -> Self {
        let upper = first_visible as i64 - 1;
        Self::new(upper - size as i64, upper)
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    /// Number of positions, including ones that are not valid indices.
    pub fn len(&self) -> usize {
        (self.upper - self.lower) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.lower && position < self.upper
    }

    /// Iterates the non-negative positions of the window in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        (self.lower.max(0)..self.upper.max(0)).map(|position| position as usize)
    }
}

/// Start/stop instructions produced by replacing one window with another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowDiff {
    /// Indices to start prefetching, ascending.
    pub added: IndexList,
    /// Indices to stop prefetching, ascending.
    pub removed: IndexList,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Infers the scroll direction by comparing maxima of the visible sets.
///
/// Index 0 being visible always counts as forward, whatever the maxima say.
/// An empty `flushed` set (first computation) is forward as well.
pub fn scroll_direction(visible: &HashSet<usize>, flushed: &HashSet<usize>) -> ScrollDirection {
    if visible.contains(&0) {
        return ScrollDirection::Forward;
    }
    match (visible.iter().max(), flushed.iter().max()) {
        (_, None) => ScrollDirection::Forward,
        (Some(current), Some(previous)) if current > previous => ScrollDirection::Forward,
        _ => ScrollDirection::Backward,
    }
}

/// Computes the next window for `visible`, or `None` when nothing is visible.
pub fn compute_window(
    visible: &HashSet<usize>,
    flushed: &HashSet<usize>,
    window_size: usize,
) -> Option<PrefetchWindow> {
    let max = *visible.iter().max()?;
    let window = match scroll_direction(visible, flushed) {
        ScrollDirection::Forward => PrefetchWindow::after(max, window_size),
        ScrollDirection::Backward => {
            let min = *visible.iter().min()?;
            PrefetchWindow::before(min, window_size)
        }
    };
    Some(window)
}

/// Diffs two windows, keeping only indices accepted by `is_valid`.
pub fn diff_windows(
    old: &PrefetchWindow,
    new: &PrefetchWindow,
    is_valid: impl Fn(usize) -> bool,
) -> WindowDiff {
    let added = new
        .indices()
        .filter(|&index| !old.contains(index as i64) && is_valid(index))
        .collect();
    let removed = old
        .indices()
        .filter(|&index| !new.contains(index as i64) && is_valid(index))
        .collect();
    WindowDiff { added, removed }
}
