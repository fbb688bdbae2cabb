use std::fmt;

use web_time::Duration;

/// Failure to turn a storage reference into a fetchable URL.
///
/// Resolution failures are never fatal: the reference is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound { reference: String },
    PermissionDenied { reference: String },
    TimedOut { reference: String, after: Duration },
    Backend { reference: String, message: String },
}

impl ResolveError {
    /// Returns the human readable form of the reference that failed.
    pub fn reference(&self) -> &str {
        match self {
            ResolveError::NotFound { reference }
            | ResolveError::PermissionDenied { reference }
            | ResolveError::TimedOut { reference, .. }
            | ResolveError::Backend { reference, .. } => reference,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound { reference } => write!(f, "{reference} not found"),
            ResolveError::PermissionDenied { reference } => {
                write!(f, "permission denied for {reference}")
            }
            ResolveError::TimedOut { reference, after } => {
                write!(f, "resolving {reference} timed out after {}ms", after.as_millis())
            }
            ResolveError::Backend { reference, message } => {
                write!(f, "resolving {reference} failed: {message}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Failure reported by the image pipeline for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The request was refused because the network is constrained (low data mode).
    ConstrainedNetwork,
    Cancelled,
    Network { message: String },
    Decode { message: String },
    Resolve(ResolveError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ConstrainedNetwork => write!(f, "request blocked on a constrained network"),
            LoadError::Cancelled => write!(f, "request cancelled"),
            LoadError::Network { message } => write!(f, "network error: {message}"),
            LoadError::Decode { message } => write!(f, "decode error: {message}"),
            LoadError::Resolve(err) => write!(f, "url resolution failed: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Resolve(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolveError> for LoadError {
    fn from(err: ResolveError) -> Self {
        LoadError::Resolve(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_error_reports_reference() {
        let err = ResolveError::TimedOut {
            reference: "gs://bucket/a.png".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.reference(), "gs://bucket/a.png");
        assert_eq!(
            err.to_string(),
            "resolving gs://bucket/a.png timed out after 30000ms"
        );
    }

    #[test]
    fn load_error_exposes_resolve_source() {
        use std::error::Error;

        let err = LoadError::from(ResolveError::NotFound {
            reference: "gs://bucket/missing.png".into(),
        });
        assert!(err.source().is_some());
        assert!(LoadError::Cancelled.source().is_none());
    }
}
