//! Unified error type.

/// The error type returned by tsu's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are still expressed as
/// [`Response`](crate::Response) values. `Error` covers infrastructure
/// failures (binding a port, a broken connection) and rendering failures,
/// which reach the framework's error path and become a `500`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address {0}")]
    Addr(String),

    /// [`use_request_context`](crate::use_request_context) was called outside
    /// a render started by the render middleware.
    #[error("RequestContext is not provided.")]
    ContextNotProvided,

    /// A component failed while the tree was being rendered.
    #[error("component failed: {0}")]
    Component(String),

    /// A component threw while it was being serialized, e.g. a `Result`
    /// view that held an `Err`.
    #[error("render failed: {0}")]
    Render(String),
}

impl Error {
    /// Shorthand for a failing component, e.g. `Err(Error::component("no user"))`.
    pub fn component(msg: impl Into<String>) -> Self {
        Self::Component(msg.into())
    }
}
