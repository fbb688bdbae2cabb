//! Platform abstraction traits for the prefetch runtime.
//!
//! The prefetch scheduler never spawns threads or owns timers. It delegates
//! deferred work to the host through [`UiExecutor`], which must run every task
//! on the same context that delivers UI visibility callbacks.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// A boxed future that is only ever polled on the UI context.
pub type LocalTask = Pin<Box<dyn Future<Output = ()> + 'static>>;

/// Single-threaded executor bound to the host's UI event loop.
///
/// Tasks are `!Send`. Implementations may be woken from any thread, but they
/// must poll tasks only on the UI context.
pub trait UiExecutor {
    /// Queues a task to be polled on the UI context.
    fn spawn_local(&self, task: LocalTask);

    /// Returns a future that completes once `duration` has elapsed.
    fn delay(&self, duration: Duration) -> LocalTask;

    /// Runs `callback` on the UI context after `delay`. Fire and forget.
    fn schedule_after(&self, delay: Duration, callback: Box<dyn FnOnce() + 'static>) {
        let wait = self.delay(delay);
        self.spawn_local(Box::pin(async move {
            wait.await;
            callback();
        }));
    }
}

impl<T: UiExecutor + ?Sized> UiExecutor for Rc<T> {
    fn spawn_local(&self, task: LocalTask) {
        (**self).spawn_local(task)
    }

    fn delay(&self, duration: Duration) -> LocalTask {
        (**self).delay(duration)
    }

    fn schedule_after(&self, delay: Duration, callback: Box<dyn FnOnce() + 'static>) {
        (**self).schedule_after(delay, callback)
    }
}

/// Provides timing information for the runtime.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
