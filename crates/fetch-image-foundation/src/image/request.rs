use std::rc::Rc;

use fetch_image_core::LoadError;
use futures::future::LocalBoxFuture;
use url::Url;

/// Scheduling priority forwarded to the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    VeryLow,
    Low,
    #[default]
    Normal,
    High,
    VeryHigh,
}

/// A single load handed to the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    pub url: Url,
    pub priority: Priority,
    /// When false the pipeline must fail with [`LoadError::ConstrainedNetwork`]
    /// instead of loading over a constrained (low data) network.
    pub allows_constrained_network: bool,
}

impl ImageRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            priority: Priority::default(),
            allows_constrained_network: true,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_constrained_network(mut self, allowed: bool) -> Self {
        self.allows_constrained_network = allowed;
        self
    }
}

/// Receives progressive previews while a load is in flight.
pub struct ProgressSink<I> {
    on_preview: Rc<dyn Fn(I)>,
}

impl<I> Clone for ProgressSink<I> {
    fn clone(&self) -> Self {
        Self {
            on_preview: Rc::clone(&self.on_preview),
        }
    }
}

impl<I> ProgressSink<I> {
    pub fn new(on_preview: impl Fn(I) + 'static) -> Self {
        Self {
            on_preview: Rc::new(on_preview),
        }
    }

    /// A sink that drops every preview.
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    /// Publishes a partially decoded image.
    pub fn preview(&self, image: I) {
        (self.on_preview)(image)
    }
}

/// External image pipeline: fetch, decode and cache.
pub trait ImagePipeline {
    type Image: Clone + 'static;

    fn load(
        &self,
        request: &ImageRequest,
        progress: ProgressSink<Self::Image>,
    ) -> LocalBoxFuture<'static, Result<Self::Image, LoadError>>;

    /// Adjusts the priority of an in-flight load of `url`.
    fn set_priority(&self, url: &Url, priority: Priority) {
        let _ = (url, priority);
    }
}
