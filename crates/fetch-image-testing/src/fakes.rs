//! Recording and scripted stand-ins for the external collaborators.

use std::cell::{Cell, RefCell};
use std::ops::Range;

use fetch_image_core::collections::map::HashMap;
use fetch_image_core::{LoadError, ResolveError};
use fetch_image_foundation::{
    ImagePipeline, ImagePrefetcher, ImageRequest, Priority, PrefetchDelegate, ProgressSink,
    StorageReference, StorageResolver, Url,
};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// One call received by a [`RecordingPrefetcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrefetchEvent {
    Begin(Vec<Url>),
    End(Vec<Url>),
}

/// [`ImagePrefetcher`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingPrefetcher {
    events: RefCell<Vec<PrefetchEvent>>,
}

impl RecordingPrefetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PrefetchEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<PrefetchEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// URLs begun and not ended since, in the order they were begun.
    pub fn active(&self) -> Vec<Url> {
        let mut active: Vec<Url> = Vec::new();
        for event in self.events.borrow().iter() {
            match event {
                PrefetchEvent::Begin(urls) => {
                    for url in urls {
                        if !active.contains(url) {
                            active.push(url.clone());
                        }
                    }
                }
                PrefetchEvent::End(urls) => active.retain(|url| !urls.contains(url)),
            }
        }
        active
    }
}

impl ImagePrefetcher for RecordingPrefetcher {
    fn begin_prefetch(&self, urls: &[Url]) {
        self.events
            .borrow_mut()
            .push(PrefetchEvent::Begin(urls.to_vec()));
    }

    fn end_prefetch(&self, urls: &[Url]) {
        self.events.borrow_mut().push(PrefetchEvent::End(urls.to_vec()));
    }
}

/// One call received by a [`RecordingDelegate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DelegateCall {
    Start(Vec<usize>),
    Stop(Vec<usize>),
}

/// [`PrefetchDelegate`] over a fixed index range that records every call.
#[derive(Debug)]
pub struct RecordingDelegate {
    valid: RefCell<Range<usize>>,
    calls: RefCell<Vec<DelegateCall>>,
}

impl RecordingDelegate {
    pub fn new(valid: Range<usize>) -> Self {
        Self {
            valid: RefCell::new(valid),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn set_valid(&self, valid: Range<usize>) {
        *self.valid.borrow_mut() = valid;
    }

    pub fn calls(&self) -> Vec<DelegateCall> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<DelegateCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }
}

impl PrefetchDelegate for RecordingDelegate {
    fn is_valid_index(&self, index: usize) -> bool {
        self.valid.borrow().contains(&index)
    }

    fn start_prefetching(&self, indices: &[usize]) {
        self.calls
            .borrow_mut()
            .push(DelegateCall::Start(indices.to_vec()));
    }

    fn stop_prefetching(&self, indices: &[usize]) {
        self.calls
            .borrow_mut()
            .push(DelegateCall::Stop(indices.to_vec()));
    }
}

type Resolution = Result<Url, ResolveError>;

/// [`StorageResolver`] whose resolutions finish only when the test says so.
#[derive(Default)]
pub struct ScriptedResolver {
    cache: RefCell<HashMap<String, Url>>,
    pending: RefCell<HashMap<String, oneshot::Sender<Resolution>>>,
    resolve_calls: Cell<usize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `reference` a synchronous cache hit.
    pub fn with_cached(self, reference: &StorageReference, url: Url) -> Self {
        self.cache.borrow_mut().insert(reference.to_string(), url);
        self
    }

    /// Completes the resolution of `reference`. Returns false if none is pending.
    pub fn complete(&self, reference: &StorageReference, result: Resolution) -> bool {
        match self.pending.borrow_mut().remove(&reference.to_string()) {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    pub fn succeed(&self, reference: &StorageReference, url: Url) -> bool {
        self.complete(reference, Ok(url))
    }

    pub fn fail_not_found(&self, reference: &StorageReference) -> bool {
        self.complete(
            reference,
            Err(ResolveError::NotFound {
                reference: reference.to_string(),
            }),
        )
    }

    /// References with an outstanding resolution, sorted.
    pub fn pending_references(&self) -> Vec<String> {
        let mut pending: Vec<String> = self.pending.borrow().keys().cloned().collect();
        pending.sort();
        pending
    }

    /// Number of asynchronous resolutions issued.
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.get()
    }
}

impl StorageResolver for ScriptedResolver {
    type Reference = StorageReference;

    fn cached_url(&self, reference: &StorageReference) -> Option<Url> {
        self.cache.borrow().get(&reference.to_string()).cloned()
    }

    fn resolve(&self, reference: &StorageReference) -> LocalBoxFuture<'static, Resolution> {
        self.resolve_calls.set(self.resolve_calls.get() + 1);
        let (sender, receiver) = oneshot::channel();
        let label = reference.to_string();
        self.pending.borrow_mut().insert(label.clone(), sender);
        receiver
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(ResolveError::Backend {
                        reference: label,
                        message: "resolver dropped".into(),
                    })
                })
            })
            .boxed_local()
    }
}

struct PendingLoad {
    request: ImageRequest,
    sender: oneshot::Sender<Result<String, LoadError>>,
    progress: ProgressSink<String>,
}

/// [`ImagePipeline`] producing `String` images, driven by the test.
#[derive(Default)]
pub struct ScriptedPipeline {
    requests: RefCell<Vec<ImageRequest>>,
    pending: RefCell<Vec<PendingLoad>>,
    priority_updates: RefCell<Vec<(Url, Priority)>>,
}

impl ScriptedPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.borrow().clone()
    }

    pub fn priority_updates(&self) -> Vec<(Url, Priority)> {
        self.priority_updates.borrow().clone()
    }

    /// Publishes a progressive preview for the oldest pending load of `url`.
    pub fn preview(&self, url: &Url, image: &str) -> bool {
        let progress = self
            .pending
            .borrow()
            .iter()
            .find(|load| &load.request.url == url)
            .map(|load| load.progress.clone());
        match progress {
            Some(progress) => {
                progress.preview(image.to_string());
                true
            }
            None => false,
        }
    }

    /// Finishes the oldest pending load of `url`. Returns false if none is pending.
    pub fn complete(&self, url: &Url, result: Result<String, LoadError>) -> bool {
        let load = {
            let mut pending = self.pending.borrow_mut();
            match pending.iter().position(|load| &load.request.url == url) {
                Some(position) => pending.remove(position),
                None => return false,
            }
        };
        load.sender.send(result).is_ok()
    }
}

impl ImagePipeline for ScriptedPipeline {
    type Image = String;

    fn load(
        &self,
        request: &ImageRequest,
        progress: ProgressSink<String>,
    ) -> LocalBoxFuture<'static, Result<String, LoadError>> {
        self.requests.borrow_mut().push(request.clone());
        let (sender, receiver) = oneshot::channel();
        self.pending.borrow_mut().push(PendingLoad {
            request: request.clone(),
            sender,
            progress,
        });
        receiver
            .map(|received| received.unwrap_or(Err(LoadError::Cancelled)))
            .boxed_local()
    }

    fn set_priority(&self, url: &Url, priority: Priority) {
        self.priority_updates
            .borrow_mut()
            .push((url.clone(), priority));
    }
}
