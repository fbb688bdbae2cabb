//! Scroll-driven prefetching for lists of remote images.
//!
//! # Architecture
//!
//! - [`window`] - pure window placement and diffing
//! - [`PrefetchScheduler`] - visibility tracking, debounce, window recomputation
//! - [`PrefetchCoordinator`] - index to URL mapping, reference resolution and
//!   forwarding to an [`ImagePrefetcher`]
//!
//! # Example
//!
//! ```rust,ignore
//! let coordinator = PrefetchCoordinator::with_references(
//!     executor,
//!     prefetcher,
//!     &resolver,
//!     &refs,
//!     CoordinatorOptions::default(),
//! );
//! lazy_column(modifier, state, |scope| {
//!     scope.items_indexed(&refs, |index, reference| {
//!         coordinator.on_appear(index);
//!         RemoteImage::new(reference.clone())
//!     });
//! });
//! ```

mod coordinator;
mod scheduler;
pub mod window;

pub use coordinator::*;
pub use scheduler::*;
pub use window::{IndexList, PrefetchWindow, ScrollDirection, WindowDiff};
