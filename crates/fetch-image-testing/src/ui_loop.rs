use std::rc::Rc;

use fetch_image_core::{Duration, UiExecutor};
use fetch_image_runtime_std::UiLoop;

use crate::clock::ManualClock;

/// [`UiLoop`] on a [`ManualClock`].
pub struct TestUiLoop {
    clock: Rc<ManualClock>,
    ui: UiLoop<Rc<ManualClock>>,
}

impl TestUiLoop {
    pub fn new() -> Self {
        let clock = Rc::new(ManualClock::new());
        let ui = UiLoop::new(Rc::clone(&clock));
        Self { clock, ui }
    }

    /// Executor handle to give to the code under test.
    pub fn executor(&self) -> Rc<dyn UiExecutor> {
        Rc::new(self.ui.clone())
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Polls everything that is ready without moving time.
    pub fn run_until_stalled(&self) -> usize {
        self.ui.run_until_stalled()
    }

    /// Drains ready work, moves time forward by `by`, then drains again.
    pub fn advance(&self, by: Duration) -> usize {
        let before = self.ui.run_until_stalled();
        self.clock.advance(by);
        before + self.ui.run_until_stalled()
    }

    /// Shorthand for `advance(Duration::from_millis(millis))`.
    pub fn advance_millis(&self, millis: u64) -> usize {
        self.advance(Duration::from_millis(millis))
    }

    pub fn pending_tasks(&self) -> usize {
        self.ui.pending_tasks()
    }
}

impl Default for TestUiLoop {
    fn default() -> Self {
        Self::new()
    }
}
