//! Unified error type.

use crate::config::ConfigError;

/// Boxed error returned by applications and body sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by fnbridge's fallible operations.
///
/// HTTP-level failures produced by the application (404, 422, etc.) travel as
/// ordinary responses, not as `Error`s. This type surfaces bridge failures:
/// registration mistakes, protocol violations, and errors raised by the
/// application or a body source, which are passed through untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A second entry point was mounted on the same bridge.
    #[error("entry point is already mounted")]
    AlreadyMounted,

    /// The host request cannot be expressed as an HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The application broke the start/body message ordering.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// The application returned without sending `http.response.start`.
    #[error("application returned without starting a response")]
    NoResponse,

    /// An error raised by the application itself.
    #[error(transparent)]
    Application(BoxError),

    /// An error raised by a request or response body source.
    #[error(transparent)]
    Body(BoxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn body(e: impl Into<BoxError>) -> Self {
        Self::Body(e.into())
    }

    /// Wraps an application failure. Bridge errors that travelled through the
    /// application (a failing body source, a protocol violation) come back
    /// as themselves.
    pub(crate) fn application(e: BoxError) -> Self {
        match e.downcast::<Error>() {
            Ok(e) => *e,
            Err(e) => Self::Application(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_unwraps_bridge_errors() {
        let boxed: BoxError = Box::new(Error::body("disk gone"));
        assert!(matches!(Error::application(boxed), Error::Body(_)));

        let boxed: BoxError = Box::new(Error::Protocol("response already started"));
        assert!(matches!(Error::application(boxed), Error::Protocol(_)));
    }

    #[test]
    fn application_keeps_foreign_errors() {
        let boxed: BoxError = "handler exploded".into();
        let err = Error::application(boxed);
        assert!(matches!(err, Error::Application(_)));
        assert_eq!(err.to_string(), "handler exploded");
    }
}
