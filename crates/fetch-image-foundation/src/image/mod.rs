//! Thin request wrapper around an external image pipeline.
//!
//! [`FetchImage`] holds the observable state of a single image view: the
//! request priority, progressive previews and the low-data fallback.

mod fetch_image;
mod request;

pub use fetch_image::*;
pub use request::*;
