use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fetch_image_core::{LoadError, UiExecutor};
use futures::future::LocalBoxFuture;
use url::Url;

use super::request::{ImagePipeline, ImageRequest, Priority, ProgressSink};
use crate::storage::StorageResolver;

/// Observable state of a [`FetchImage`].
#[derive(Clone, Debug, PartialEq)]
pub enum FetchState<I> {
    Idle,
    Loading {
        /// Latest progressive preview, if the pipeline produced one.
        preview: Option<I>,
    },
    Success {
        image: I,
        /// The image came from the low-data fallback URL.
        is_low_data: bool,
    },
    Failure(LoadError),
}

impl<I> FetchState<I> {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading { .. })
    }

    /// The best image available right now: the final one or the latest preview.
    pub fn image(&self) -> Option<&I> {
        match self {
            FetchState::Success { image, .. } => Some(image),
            FetchState::Loading { preview } => preview.as_ref(),
            FetchState::Idle | FetchState::Failure(_) => None,
        }
    }
}

type StateListener<I> = Box<dyn Fn(&FetchState<I>)>;

struct FetchInner<P: ImagePipeline> {
    pipeline: Rc<P>,
    executor: Rc<dyn UiExecutor>,
    state: RefCell<FetchState<P::Image>>,
    priority: Cell<Priority>,
    /// Bumped by every load and reset; completions of older loads are ignored.
    generation: Cell<u64>,
    current_url: RefCell<Option<Url>>,
    listeners: RefCell<Vec<StateListener<P::Image>>>,
}

impl<P: ImagePipeline> FetchInner<P> {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.get() == generation
    }

    fn set_state(&self, state: FetchState<P::Image>) {
        *self.state.borrow_mut() = state.clone();
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for listener in &listeners {
            listener(&state);
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }

    fn finish(&self, generation: u64, result: Result<(P::Image, bool), LoadError>) {
        if !self.is_current(generation) {
            return;
        }
        self.current_url.borrow_mut().take();
        let state = match result {
            Ok((image, is_low_data)) => FetchState::Success { image, is_low_data },
            Err(err) => {
                log::warn!("image load failed: {err}");
                FetchState::Failure(err)
            }
        };
        self.set_state(state);
    }
}

/// State holder for one remote image.
///
/// Cheap to clone; clones share state. Must stay on the UI context.
pub struct FetchImage<P: ImagePipeline> {
    inner: Rc<FetchInner<P>>,
}

impl<P: ImagePipeline> Clone for FetchImage<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: ImagePipeline + 'static> FetchImage<P> {
    pub fn new(pipeline: Rc<P>, executor: Rc<dyn UiExecutor>) -> Self {
        Self {
            inner: Rc::new(FetchInner {
                pipeline,
                executor,
                state: RefCell::new(FetchState::Idle),
                priority: Cell::new(Priority::default()),
                generation: Cell::new(0),
                current_url: RefCell::new(None),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> FetchState<P::Image> {
        self.inner.state.borrow().clone()
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority.get()
    }

    /// Changes the priority of this and future loads.
    pub fn set_priority(&self, priority: Priority) {
        if self.inner.priority.replace(priority) == priority {
            return;
        }
        if let Some(url) = self.inner.current_url.borrow().as_ref() {
            self.inner.pipeline.set_priority(url, priority);
        }
    }

    /// Registers a callback run after every state change.
    pub fn on_change(&self, listener: impl Fn(&FetchState<P::Image>) + 'static) {
        self.inner.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Loads `url`, replacing any load in flight.
    pub fn load(&self, url: Url) {
        let generation = self.begin();
        self.spawn(load_chain(Rc::downgrade(&self.inner), generation, url, None));
    }

    /// Loads `url` without using a constrained network; if the pipeline
    /// refuses for that reason, loads `low_data_url` instead.
    pub fn load_with_low_data(&self, url: Url, low_data_url: Url) {
        let generation = self.begin();
        self.spawn(load_chain(
            Rc::downgrade(&self.inner),
            generation,
            url,
            Some(low_data_url),
        ));
    }

    /// Resolves `reference` (cache first) and loads the resulting URL.
    pub fn load_reference<R>(&self, resolver: &R, reference: &R::Reference)
    where
        R: StorageResolver + ?Sized,
    {
        if let Some(url) = resolver.cached_url(reference) {
            self.load(url);
            return;
        }
        let generation = self.begin();
        let lookup = resolver.resolve(reference);
        let weak = Rc::downgrade(&self.inner);
        self.spawn(Box::pin(async move {
            match lookup.await {
                Ok(url) => load_chain(weak, generation, url, None).await,
                Err(err) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.finish(generation, Err(LoadError::Resolve(err)));
                    }
                }
            }
        }));
    }

    /// Abandons any load in flight and returns to [`FetchState::Idle`].
    pub fn reset(&self) {
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.current_url.borrow_mut().take();
        self.inner.set_state(FetchState::Idle);
    }

    fn begin(&self) -> u64 {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);
        self.inner.current_url.borrow_mut().take();
        self.inner.set_state(FetchState::Loading { preview: None });
        generation
    }

    fn spawn(&self, task: LocalBoxFuture<'static, ()>) {
        self.inner.executor.spawn_local(task);
    }
}

/// Starts one pipeline request, or returns `None` if the load is stale.
fn request<P: ImagePipeline + 'static>(
    weak: &Weak<FetchInner<P>>,
    generation: u64,
    url: Url,
    allows_constrained_network: bool,
) -> Option<LocalBoxFuture<'static, Result<P::Image, LoadError>>> {
    let inner = weak.upgrade()?;
    if !inner.is_current(generation) {
        return None;
    }
    let request = ImageRequest::new(url.clone())
        .with_priority(inner.priority.get())
        .with_constrained_network(allows_constrained_network);
    *inner.current_url.borrow_mut() = Some(url);

    let preview_target = weak.clone();
    let progress = ProgressSink::new(move |preview: P::Image| {
        let Some(inner) = preview_target.upgrade() else {
            return;
        };
        if inner.is_current(generation) && inner.state.borrow().is_loading() {
            inner.set_state(FetchState::Loading {
                preview: Some(preview),
            });
        }
    });
    Some(inner.pipeline.load(&request, progress))
}

fn load_chain<P: ImagePipeline + 'static>(
    weak: Weak<FetchInner<P>>,
    generation: u64,
    url: Url,
    low_data_url: Option<Url>,
) -> LocalBoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(regular) = request(&weak, generation, url, low_data_url.is_none()) else {
            return;
        };
        let result = match (regular.await, low_data_url) {
            (Err(LoadError::ConstrainedNetwork), Some(low_data_url)) => {
                log::debug!("constrained network, falling back to {low_data_url}");
                let Some(fallback) = request(&weak, generation, low_data_url, true) else {
                    return;
                };
                fallback.await.map(|image| (image, true))
            }
            (result, _) => result.map(|image| (image, false)),
        };
        if let Some(inner) = weak.upgrade() {
            inner.finish(generation, result);
        }
    })
}
