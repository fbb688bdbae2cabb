//! Debounced, scroll-direction-aware prefetch scheduler.
//!
//! The host reports item visibility through [`PrefetchScheduler::on_appear`]
//! and [`PrefetchScheduler::on_disappear`]. Lists may report those callbacks
//! out of order while scrolling fast, so the scheduler waits for the visible
//! set to settle before placing the next window.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use fetch_image_core::collections::map::HashSet;
use fetch_image_core::collections::new_set;
use fetch_image_core::{Duration, UiExecutor};

use super::window::{compute_window, diff_windows, PrefetchWindow};

/// Number of items prefetched ahead of the visible area.
pub const DEFAULT_PREFETCH_WINDOW_SIZE: usize = 12;

/// Delay between the first visibility change and the recomputation.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(100);

/// Strategy for prefetching items in a scrolling list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefetchStrategy {
    /// Number of items to prefetch beyond the visible area.
    pub window_size: usize,

    /// Debounce interval applied to visibility changes.
    pub refresh_delay: Duration,

    /// Whether prefetching is enabled.
    pub enabled: bool,
}

impl Default for PrefetchStrategy {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_PREFETCH_WINDOW_SIZE,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            enabled: true,
        }
    }
}

impl PrefetchStrategy {
    /// Creates a new prefetch strategy with the specified window size.
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    /// Disables prefetching. Visibility is still tracked.
    pub fn disabled() -> Self {
        Self {
            window_size: 0,
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_refresh_delay(mut self, refresh_delay: Duration) -> Self {
        self.refresh_delay = refresh_delay;
        self
    }
}

/// Receiver of the scheduler's decisions.
///
/// Held weakly by the scheduler. Called on the UI context, never while the
/// scheduler's own state is borrowed, so implementations may call back into it.
pub trait PrefetchDelegate {
    /// Whether `index` currently maps to an addressable item.
    fn is_valid_index(&self, index: usize) -> bool;

    /// Start prefetching the given indices (ascending).
    fn start_prefetching(&self, indices: &[usize]);

    /// Stop prefetching the given indices (ascending).
    fn stop_prefetching(&self, indices: &[usize]);
}

/// Counters for debugging and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Number of window recomputations that ran.
    pub refresh_count: usize,
    /// Total indices handed to [`PrefetchDelegate::start_prefetching`].
    pub started: usize,
    /// Total indices handed to [`PrefetchDelegate::stop_prefetching`].
    pub stopped: usize,
}

/// Scheduler that tracks which items should be prefetched.
///
/// Cheap to clone; clones share state. Must stay on the UI context.
#[derive(Clone)]
pub struct PrefetchScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

struct SchedulerInner {
    executor: Rc<dyn UiExecutor>,
    strategy: PrefetchStrategy,
    visible: HashSet<usize>,
    /// Copy of `visible` taken at the last recomputation.
    flushed: HashSet<usize>,
    window: PrefetchWindow,
    /// Set when the delegate's universe changed under the live window; the
    /// next recomputation starts every valid index instead of only new ones.
    window_invalidated: bool,
    refresh_scheduled: bool,
    /// Bumped by synchronous refreshes so already queued timers become no-ops.
    refresh_generation: u64,
    delegate: Option<Weak<dyn PrefetchDelegate>>,
    stats: PrefetchStats,
}

impl PrefetchScheduler {
    /// Creates a scheduler with the default strategy.
    pub fn new(executor: Rc<dyn UiExecutor>) -> Self {
        Self::with_strategy(executor, PrefetchStrategy::default())
    }

    pub fn with_strategy(executor: Rc<dyn UiExecutor>, strategy: PrefetchStrategy) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                executor,
                strategy,
                visible: new_set(),
                flushed: new_set(),
                window: PrefetchWindow::EMPTY,
                window_invalidated: false,
                refresh_scheduled: false,
                refresh_generation: 0,
                delegate: None,
                stats: PrefetchStats::default(),
            })),
        }
    }

    /// Registers the receiver of start/stop instructions.
    pub fn set_delegate(&self, delegate: Weak<dyn PrefetchDelegate>) {
        self.inner.borrow_mut().delegate = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        self.inner.borrow_mut().delegate = None;
    }

    /// Records that the item at `index` became visible.
    pub fn on_appear(&self, index: usize) {
        self.inner.borrow_mut().visible.insert(index);
        self.schedule_refresh_if_needed();
    }

    /// Records that the item at `index` is no longer visible.
    pub fn on_disappear(&self, index: usize) {
        self.inner.borrow_mut().visible.remove(&index);
        self.schedule_refresh_if_needed();
    }

    /// Requests a debounced recomputation.
    ///
    /// While one is pending, further requests are absorbed.
    pub fn schedule_refresh_if_needed(&self) {
        let (executor, delay, generation) = {
            let mut inner = self.inner.borrow_mut();
            if inner.refresh_scheduled {
                return;
            }
            inner.refresh_scheduled = true;
            (
                Rc::clone(&inner.executor),
                inner.strategy.refresh_delay,
                inner.refresh_generation,
            )
        };
        log::trace!("prefetch refresh scheduled in {}ms", delay.as_millis());
        let weak = Rc::downgrade(&self.inner);
        executor.schedule_after(
            delay,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.borrow().refresh_generation != generation {
                    return;
                }
                refresh(&inner);
            }),
        );
    }

    /// Recomputes the window immediately, superseding any pending request.
    pub fn refresh_now(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.refresh_generation += 1;
        }
        refresh(&self.inner);
    }

    /// Replaces the strategy and requests a recomputation.
    pub fn set_strategy(&self, strategy: PrefetchStrategy) {
        self.inner.borrow_mut().strategy = strategy;
        self.schedule_refresh_if_needed();
    }

    pub fn strategy(&self) -> PrefetchStrategy {
        self.inner.borrow().strategy.clone()
    }

    /// Tells the scheduler that the delegate's valid indices changed.
    ///
    /// Indices inside the live window that were invalid when the window was
    /// placed are started by the next recomputation. When the visible set has
    /// not changed since, the window keeps its placement.
    pub fn invalidate_window(&self) {
        self.inner.borrow_mut().window_invalidated = true;
        self.schedule_refresh_if_needed();
    }

    /// Drops the live window, stopping every valid index it covered.
    ///
    /// The next recomputation is treated as the first one.
    pub fn clear_window(&self) {
        let (old, delegate) = {
            let mut inner = self.inner.borrow_mut();
            inner.flushed.clear();
            inner.window_invalidated = false;
            let old = std::mem::replace(&mut inner.window, PrefetchWindow::EMPTY);
            (old, inner.delegate.as_ref().and_then(Weak::upgrade))
        };
        let Some(delegate) = delegate else {
            return;
        };
        let diff = diff_windows(&old, &PrefetchWindow::EMPTY, |index| {
            delegate.is_valid_index(index)
        });
        if !diff.removed.is_empty() {
            delegate.stop_prefetching(&diff.removed);
            self.inner.borrow_mut().stats.stopped += diff.removed.len();
        }
    }

    /// Currently visible indices, ascending.
    pub fn visible_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.inner.borrow().visible.iter().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn prefetch_window(&self) -> PrefetchWindow {
        self.inner.borrow().window
    }

    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner.borrow().refresh_scheduled
    }

    pub fn stats(&self) -> PrefetchStats {
        self.inner.borrow().stats.clone()
    }
}

fn refresh(inner: &Rc<RefCell<SchedulerInner>>) {
    let (old, new, invalidated, delegate) = {
        let mut state = inner.borrow_mut();
        state.refresh_scheduled = false;
        let Some(computed) = compute_window(
            &state.visible,
            &state.flushed,
            state.strategy.window_size,
        ) else {
            log::trace!("prefetch refresh skipped: nothing visible");
            return;
        };
        let invalidated = std::mem::take(&mut state.window_invalidated);
        let new = if !state.strategy.enabled {
            PrefetchWindow::EMPTY
        } else if invalidated && state.visible == state.flushed && !state.window.is_empty() {
            state.window
        } else {
            computed
        };
        let old = std::mem::replace(&mut state.window, new);
        state.flushed = state.visible.clone();
        state.stats.refresh_count += 1;
        (
            old,
            new,
            invalidated,
            state.delegate.as_ref().and_then(Weak::upgrade),
        )
    };
    log::debug!(
        "prefetch window [{}, {}) -> [{}, {})",
        old.lower(),
        old.upper(),
        new.lower(),
        new.upper()
    );

    let Some(delegate) = delegate else {
        return;
    };
    let is_valid = |index: usize| delegate.is_valid_index(index);
    let mut diff = diff_windows(&old, &new, is_valid);
    if invalidated {
        diff.added = diff_windows(&PrefetchWindow::EMPTY, &new, is_valid).added;
    }
    if !diff.added.is_empty() {
        delegate.start_prefetching(&diff.added);
    }
    if !diff.removed.is_empty() {
        delegate.stop_prefetching(&diff.removed);
    }

    let mut state = inner.borrow_mut();
    state.stats.started += diff.added.len();
    state.stats.stopped += diff.removed.len();
}
