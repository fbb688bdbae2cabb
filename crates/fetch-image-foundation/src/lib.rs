//! Prefetch scheduling and image request state for remote images in
//! declarative UIs.
//!
//! Networking, decoding and caching belong to an external [`ImagePipeline`];
//! URL resolution for cloud-hosted assets belongs to a [`StorageResolver`].
//! This crate decides *what* to load and *when*.

pub mod image;
pub mod prefetch;
pub mod storage;

pub use image::*;
pub use prefetch::*;
pub use storage::*;

pub use url::Url;
