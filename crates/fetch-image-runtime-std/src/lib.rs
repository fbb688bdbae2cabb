//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides a concrete [`UiExecutor`] for hosts that do not already
//! have one. Construct a [`UiLoop`] on the UI thread, hand it to the prefetch
//! machinery and call [`UiLoop::run_until_stalled`] from the event loop (once
//! per frame is enough).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use fetch_image_core::collections::map::HashMap;
use fetch_image_core::{Clock, Duration, Instant, LocalTask, UiExecutor};
use futures_task::ArcWake;

/// Clock implementation backed by [`web_time::Instant`](fetch_image_core::Instant).
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type TaskId = u64;
type TimerId = u64;

/// Queue of task ids that were woken. Shared with wakers, which may fire on any thread.
#[derive(Default)]
struct ReadyQueue {
    ids: Mutex<VecDeque<TaskId>>,
}

impl ReadyQueue {
    fn push(&self, id: TaskId) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);
    }

    fn pop(&self) -> Option<TaskId> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn is_empty(&self) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

struct TaskWaker {
    id: TaskId,
    ready: Arc<ReadyQueue>,
}

impl ArcWake for TaskWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.ready.push(arc_self.id);
    }
}

struct PendingTimer {
    deadline: Instant,
    waker: Waker,
}

struct LoopShared<C> {
    clock: C,
    tasks: RefCell<HashMap<TaskId, LocalTask>>,
    next_task_id: Cell<TaskId>,
    ready: Arc<ReadyQueue>,
    /// One entry per pending [`Delay`]; removed when it fires or is dropped.
    timers: RefCell<HashMap<TimerId, PendingTimer>>,
    next_timer_id: Cell<TimerId>,
}

/// Future returned by [`UiLoop::delay`](UiExecutor::delay).
struct Delay<C: Clock> {
    shared: Weak<LoopShared<C>>,
    id: TimerId,
    deadline: Instant,
}

impl<C: Clock> Future for Delay<C> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped loop never polls again, so the delay simply stays pending.
        let Some(shared) = self.shared.upgrade() else {
            return Poll::Pending;
        };
        let mut timers = shared.timers.borrow_mut();
        if shared.clock.now() >= self.deadline {
            timers.remove(&self.id);
            return Poll::Ready(());
        }
        match timers.get_mut(&self.id) {
            Some(timer) => {
                if !timer.waker.will_wake(cx.waker()) {
                    timer.waker = cx.waker().clone();
                }
            }
            None => {
                timers.insert(
                    self.id,
                    PendingTimer {
                        deadline: self.deadline,
                        waker: cx.waker().clone(),
                    },
                );
            }
        }
        Poll::Pending
    }
}

impl<C: Clock> Drop for Delay<C> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.timers.borrow_mut().remove(&self.id);
        }
    }
}

/// Single-threaded executor with clock driven timers.
///
/// Tasks are polled only from [`run_until_stalled`](Self::run_until_stalled),
/// so every task observes state on the thread that owns the loop. Wakers are
/// `Send + Sync`; work completed on a worker thread re-queues the waiting task
/// and the next drain picks it up on the UI thread.
pub struct UiLoop<C: Clock> {
    shared: Rc<LoopShared<C>>,
}

impl<C: Clock> Clone for UiLoop<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: Clock + 'static> UiLoop<C> {
    /// Creates an empty loop driven by `clock`.
    pub fn new(clock: C) -> Self {
        Self {
            shared: Rc::new(LoopShared {
                clock,
                tasks: RefCell::new(HashMap::default()),
                next_task_id: Cell::new(1),
                ready: Arc::new(ReadyQueue::default()),
                timers: RefCell::new(HashMap::default()),
                next_timer_id: Cell::new(1),
            }),
        }
    }

    /// Returns the clock driving this loop.
    pub fn clock(&self) -> &C {
        &self.shared.clock
    }

    /// Fires expired timers and polls woken tasks until no further progress
    /// can be made. Returns the number of polls performed.
    pub fn run_until_stalled(&self) -> usize {
        let mut polls = 0;
        loop {
            self.fire_expired_timers();
            let Some(id) = self.shared.ready.pop() else {
                break;
            };
            // Removed while polling so the task may spawn further tasks.
            let task = self.shared.tasks.borrow_mut().remove(&id);
            let Some(mut task) = task else {
                continue;
            };
            let waker = futures_task::waker(Arc::new(TaskWaker {
                id,
                ready: Arc::clone(&self.shared.ready),
            }));
            let mut cx = Context::from_waker(&waker);
            polls += 1;
            match task.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending => {
                    self.shared.tasks.borrow_mut().insert(id, task);
                }
            }
        }
        if polls > 0 {
            log::trace!("ui loop drained {polls} polls");
        }
        polls
    }

    /// Returns the earliest pending timer deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared
            .timers
            .borrow()
            .values()
            .map(|timer| timer.deadline)
            .min()
    }

    /// Number of spawned tasks that have not completed yet.
    pub fn pending_tasks(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    /// Returns true when some task was woken and awaits a poll.
    pub fn has_ready_tasks(&self) -> bool {
        !self.shared.ready.is_empty()
    }

    fn fire_expired_timers(&self) {
        let now = self.shared.clock.now();
        let expired: Vec<Waker> = {
            let mut timers = self.shared.timers.borrow_mut();
            let mut expired = Vec::new();
            timers.retain(|_, timer| {
                if timer.deadline <= now {
                    expired.push(timer.waker.clone());
                    false
                } else {
                    true
                }
            });
            expired
        };
        for waker in expired {
            waker.wake();
        }
    }
}

impl UiLoop<StdClock> {
    /// Creates a loop driven by the wall clock.
    pub fn std() -> Self {
        Self::new(StdClock)
    }
}

impl Default for UiLoop<StdClock> {
    fn default() -> Self {
        Self::std()
    }
}

impl<C: Clock + 'static> UiExecutor for UiLoop<C> {
    fn spawn_local(&self, task: LocalTask) {
        let id = self.shared.next_task_id.get();
        self.shared.next_task_id.set(id + 1);
        self.shared.tasks.borrow_mut().insert(id, task);
        self.shared.ready.push(id);
    }

    fn delay(&self, duration: Duration) -> LocalTask {
        let id = self.shared.next_timer_id.get();
        self.shared.next_timer_id.set(id + 1);
        Box::pin(Delay {
            shared: Rc::downgrade(&self.shared),
            id,
            deadline: self.shared.clock.now() + duration,
        })
    }
}

impl<C: Clock> fmt::Debug for UiLoop<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiLoop")
            .field("pending_tasks", &self.shared.tasks.borrow().len())
            .field("timers", &self.shared.timers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/ui_loop_tests.rs"]
mod tests;
