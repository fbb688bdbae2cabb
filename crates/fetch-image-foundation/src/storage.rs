//! Cloud storage references and the resolver that turns them into URLs.

use std::fmt;
use std::rc::Rc;

use fetch_image_core::ResolveError;
use futures::future::LocalBoxFuture;
use url::Url;

/// Location of an object in a cloud storage bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageReference {
    bucket: String,
    path: String,
}

impl StorageReference {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into().trim_start_matches('/').to_string(),
        }
    }

    /// Parses `gs://bucket/path/to/object`.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("gs://")?;
        let (bucket, path) = rest.split_once('/')?;
        if bucket.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::new(bucket, path))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.path)
    }
}

/// Turns opaque storage references into fetchable URLs.
///
/// The resolver is an external collaborator: it may hop to other threads, but
/// the futures it returns are awaited on the UI context.
pub trait StorageResolver {
    type Reference: Clone + fmt::Display + 'static;

    /// Synchronous cache lookup consulted before [`resolve`](Self::resolve).
    fn cached_url(&self, reference: &Self::Reference) -> Option<Url> {
        let _ = reference;
        None
    }

    /// Resolves `reference`. Called at most once per reference and batch.
    fn resolve(
        &self,
        reference: &Self::Reference,
    ) -> LocalBoxFuture<'static, Result<Url, ResolveError>>;
}

impl<T: StorageResolver + ?Sized> StorageResolver for Rc<T> {
    type Reference = T::Reference;

    fn cached_url(&self, reference: &Self::Reference) -> Option<Url> {
        (**self).cached_url(reference)
    }

    fn resolve(
        &self,
        reference: &Self::Reference,
    ) -> LocalBoxFuture<'static, Result<Url, ResolveError>> {
        (**self).resolve(reference)
    }
}
