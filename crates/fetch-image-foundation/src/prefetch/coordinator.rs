//! Bridges the index based [`PrefetchScheduler`] to a URL based prefetch client.
//!
//! The coordinator owns one URL slot per list item. Slots are filled either
//! from a complete URL list or by resolving storage references. Slot `i`
//! always belongs to item `i`, whatever order resolutions complete in.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use fetch_image_core::{Duration, LocalTask, ResolveError, UiExecutor};
use futures::future::{self, Either, LocalBoxFuture};
use url::Url;

use super::scheduler::{PrefetchDelegate, PrefetchScheduler, PrefetchStrategy};
use crate::storage::StorageResolver;

/// Upper bound on a single reference resolution.
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// External client that issues the actual prefetch requests.
pub trait ImagePrefetcher {
    fn begin_prefetch(&self, urls: &[Url]);
    fn end_prefetch(&self, urls: &[Url]);
}

impl<T: ImagePrefetcher + ?Sized> ImagePrefetcher for Rc<T> {
    fn begin_prefetch(&self, urls: &[Url]) {
        (**self).begin_prefetch(urls)
    }

    fn end_prefetch(&self, urls: &[Url]) {
        (**self).end_prefetch(urls)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub strategy: PrefetchStrategy,
    /// `None` waits for every resolution indefinitely.
    pub resolution_timeout: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            strategy: PrefetchStrategy::default(),
            resolution_timeout: Some(DEFAULT_RESOLUTION_TIMEOUT),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum UrlSlot {
    Pending,
    Resolved(Url),
    Failed,
}

type UniverseListener = Box<dyn Fn(usize)>;

struct CoordinatorState {
    slots: RefCell<Vec<UrlSlot>>,
    prefetcher: Rc<dyn ImagePrefetcher>,
    /// Bumped whenever the slot list is replaced; stale resolutions are dropped.
    generation: Cell<u64>,
    resolving: Cell<bool>,
    /// URLs handed to `begin_prefetch` and not ended yet, by index.
    begun: RefCell<BTreeMap<usize, Url>>,
    listeners: RefCell<Vec<UniverseListener>>,
}

impl CoordinatorState {
    /// Ends begun URLs whose slot no longer holds the same URL.
    fn end_stale(&self) {
        let ended: Vec<Url> = {
            let slots = self.slots.borrow();
            let mut begun = self.begun.borrow_mut();
            let stale: Vec<usize> = begun
                .iter()
                .filter(|(index, url)| match slots.get(**index) {
                    Some(UrlSlot::Resolved(current)) => current != *url,
                    _ => true,
                })
                .map(|(index, _)| *index)
                .collect();
            stale
                .iter()
                .filter_map(|index| begun.remove(index))
                .collect()
        };
        if !ended.is_empty() {
            log::debug!("ending {} prefetches for replaced items", ended.len());
            self.prefetcher.end_prefetch(&ended);
        }
    }

    /// Ends every begun URL.
    fn end_all(&self) {
        let ended: Vec<Url> = std::mem::take(&mut *self.begun.borrow_mut())
            .into_values()
            .collect();
        if !ended.is_empty() {
            self.prefetcher.end_prefetch(&ended);
        }
    }

    fn resolved_count(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|slot| matches!(slot, UrlSlot::Resolved(_)))
            .count()
    }

    fn store(
        &self,
        generation: u64,
        position: usize,
        reference: &str,
        result: Result<Url, ResolveError>,
    ) {
        if self.generation.get() != generation {
            return;
        }
        let slot = match result {
            Ok(url) => UrlSlot::Resolved(url),
            Err(err) => {
                log::warn!("skipping {reference}: {err}");
                UrlSlot::Failed
            }
        };
        if let Some(entry) = self.slots.borrow_mut().get_mut(position) {
            *entry = slot;
        }
    }

    fn notify_universe_changed(&self) {
        let count = self.resolved_count();
        log::debug!("prefetch universe changed: {count} urls");
        // Taken out so listeners may register further listeners.
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in &listeners {
            listener(count);
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }
}

impl PrefetchDelegate for CoordinatorState {
    fn is_valid_index(&self, index: usize) -> bool {
        matches!(self.slots.borrow().get(index), Some(UrlSlot::Resolved(_)))
    }

    fn start_prefetching(&self, indices: &[usize]) {
        let urls: Vec<Url> = {
            let slots = self.slots.borrow();
            let mut begun = self.begun.borrow_mut();
            indices
                .iter()
                .filter_map(|&index| match slots.get(index) {
                    Some(UrlSlot::Resolved(url)) if begun.get(&index) != Some(url) => {
                        begun.insert(index, url.clone());
                        Some(url.clone())
                    }
                    _ => None,
                })
                .collect()
        };
        if !urls.is_empty() {
            self.prefetcher.begin_prefetch(&urls);
        }
    }

    fn stop_prefetching(&self, indices: &[usize]) {
        let urls: Vec<Url> = {
            let mut begun = self.begun.borrow_mut();
            indices
                .iter()
                .filter_map(|index| begun.remove(index))
                .collect()
        };
        if !urls.is_empty() {
            self.prefetcher.end_prefetch(&urls);
        }
    }
}

/// Owns the index to URL mapping for one list and drives its prefetching.
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = PrefetchCoordinator::with_urls(executor, prefetcher, urls);
/// // From the list's item callbacks:
/// coordinator.on_appear(index);
/// coordinator.on_disappear(index);
/// ```
#[derive(Clone)]
pub struct PrefetchCoordinator {
    state: Rc<CoordinatorState>,
    scheduler: PrefetchScheduler,
    executor: Rc<dyn UiExecutor>,
    resolution_timeout: Option<Duration>,
}

impl PrefetchCoordinator {
    /// Creates a coordinator with no items.
    pub fn new(
        executor: Rc<dyn UiExecutor>,
        prefetcher: Rc<dyn ImagePrefetcher>,
        options: CoordinatorOptions,
    ) -> Self {
        let state = Rc::new(CoordinatorState {
            slots: RefCell::new(Vec::new()),
            prefetcher,
            generation: Cell::new(0),
            resolving: Cell::new(false),
            begun: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(Vec::new()),
        });
        let scheduler = PrefetchScheduler::with_strategy(Rc::clone(&executor), options.strategy);
        let delegate: Weak<dyn PrefetchDelegate> =
            Rc::downgrade(&state) as Weak<dyn PrefetchDelegate>;
        scheduler.set_delegate(delegate);
        Self {
            state,
            scheduler,
            executor,
            resolution_timeout: options.resolution_timeout,
        }
    }

    /// Creates a coordinator over an already complete URL list.
    pub fn with_urls(
        executor: Rc<dyn UiExecutor>,
        prefetcher: Rc<dyn ImagePrefetcher>,
        urls: Vec<Url>,
    ) -> Self {
        let coordinator = Self::new(executor, prefetcher, CoordinatorOptions::default());
        coordinator.set_urls(urls);
        coordinator
    }

    /// Creates a coordinator whose URLs come from storage references.
    ///
    /// `options` carries the resolution timeout applied to this first batch.
    pub fn with_references<R>(
        executor: Rc<dyn UiExecutor>,
        prefetcher: Rc<dyn ImagePrefetcher>,
        resolver: &R,
        references: &[R::Reference],
        options: CoordinatorOptions,
    ) -> Self
    where
        R: StorageResolver + ?Sized,
    {
        let coordinator = Self::new(executor, prefetcher, options);
        coordinator.resolve_references(resolver, references);
        coordinator
    }

    /// Replaces the items with a complete URL list and announces the change.
    ///
    /// Live prefetches of URLs that no longer sit at their index are ended.
    pub fn set_urls(&self, urls: Vec<Url>) {
        self.state.generation.set(self.state.generation.get() + 1);
        self.state.resolving.set(false);
        *self.state.slots.borrow_mut() = urls.into_iter().map(UrlSlot::Resolved).collect();
        announce_universe_changed(&self.state, &self.scheduler);
    }

    /// Replaces the items with `references`, resolving each one.
    ///
    /// Cache hits fill their slot immediately. Misses are resolved
    /// concurrently on the UI executor, each bounded by the resolution
    /// timeout. The change is announced once, after every reference either
    /// resolved or failed.
    pub fn resolve_references<R>(&self, resolver: &R, references: &[R::Reference])
    where
        R: StorageResolver + ?Sized,
    {
        let generation = self.state.generation.get() + 1;
        self.state.generation.set(generation);

        let mut slots = Vec::with_capacity(references.len());
        let mut misses = Vec::new();
        for (position, reference) in references.iter().enumerate() {
            match resolver.cached_url(reference) {
                Some(url) => slots.push(UrlSlot::Resolved(url)),
                None => {
                    slots.push(UrlSlot::Pending);
                    misses.push((position, reference.to_string(), resolver.resolve(reference)));
                }
            }
        }
        *self.state.slots.borrow_mut() = slots;
        self.state.end_stale();

        if misses.is_empty() {
            self.state.resolving.set(false);
            announce_universe_changed(&self.state, &self.scheduler);
            return;
        }

        log::debug!(
            "resolving {} of {} references ({} cached)",
            misses.len(),
            references.len(),
            references.len() - misses.len()
        );
        self.state.resolving.set(true);

        let timeout = self.resolution_timeout;
        let resolutions: Vec<_> = misses
            .into_iter()
            .map(|(position, label, lookup)| {
                let timer = timeout.map(|after| (self.executor.delay(after), after));
                let state = Rc::downgrade(&self.state);
                async move {
                    let result = bounded(lookup, timer, &label).await;
                    if let Some(state) = state.upgrade() {
                        state.store(generation, position, &label, result);
                    }
                }
            })
            .collect();

        let state = Rc::downgrade(&self.state);
        let scheduler = self.scheduler.clone();
        self.executor.spawn_local(Box::pin(async move {
            future::join_all(resolutions).await;
            let Some(state) = state.upgrade() else {
                return;
            };
            if state.generation.get() != generation {
                return;
            }
            state.resolving.set(false);
            announce_universe_changed(&state, &scheduler);
        }));
    }

    /// Registers a callback run with the number of valid indices whenever
    /// the item universe is announced.
    pub fn on_universe_changed(&self, listener: impl Fn(usize) + 'static) {
        self.state.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn on_appear(&self, index: usize) {
        self.scheduler.on_appear(index);
    }

    pub fn on_disappear(&self, index: usize) {
        self.scheduler.on_disappear(index);
    }

    /// Stops prefetching everything in the live window.
    pub fn stop_all(&self) {
        self.scheduler.clear_window();
        self.state.end_all();
    }

    pub fn scheduler(&self) -> &PrefetchScheduler {
        &self.scheduler
    }

    /// Whether `index` maps to a resolved URL right now.
    pub fn is_valid_index(&self, index: usize) -> bool {
        self.state.is_valid_index(index)
    }

    /// Snapshot of the URL slots; unresolved and failed slots are `None`.
    pub fn urls(&self) -> Vec<Option<Url>> {
        self.state
            .slots
            .borrow()
            .iter()
            .map(|slot| match slot {
                UrlSlot::Resolved(url) => Some(url.clone()),
                UrlSlot::Pending | UrlSlot::Failed => None,
            })
            .collect()
    }

    /// Number of items, resolved or not.
    pub fn len(&self) -> usize {
        self.state.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolved_count(&self) -> usize {
        self.state.resolved_count()
    }

    /// Whether a reference batch is still in flight.
    pub fn is_resolving(&self) -> bool {
        self.state.resolving.get()
    }
}

fn announce_universe_changed(state: &CoordinatorState, scheduler: &PrefetchScheduler) {
    state.end_stale();
    state.notify_universe_changed();
    scheduler.invalidate_window();
}

async fn bounded(
    lookup: LocalBoxFuture<'static, Result<Url, ResolveError>>,
    timer: Option<(LocalTask, Duration)>,
    label: &str,
) -> Result<Url, ResolveError> {
    let Some((timer, after)) = timer else {
        return lookup.await;
    };
    match future::select(lookup, timer).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(ResolveError::TimedOut {
            reference: label.to_string(),
            after,
        }),
    }
}
