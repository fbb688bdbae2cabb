//! Prefetching image loading for lazy lists.
//!
//! Re-exports the scheduling core, the image request wrapper and, with the
//! default `runtime-std` feature, a standard library UI loop.

pub use fetch_image_core::{Clock, Duration, Instant, LoadError, ResolveError, UiExecutor};
pub use fetch_image_foundation::*;
#[cfg(feature = "runtime-std")]
pub use fetch_image_runtime_std::{StdClock, UiLoop};

pub mod prelude {
    pub use crate::{
        CoordinatorOptions, FetchImage, FetchState, ImagePipeline, ImagePrefetcher,
        ImageRequest, PrefetchCoordinator, PrefetchStrategy, Priority, ProgressSink,
        StorageReference, StorageResolver, UiExecutor, Url,
    };
    #[cfg(feature = "runtime-std")]
    pub use crate::UiLoop;
}
