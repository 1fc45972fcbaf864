//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] carries either a complete body or a stream of chunks. The
//! stream variant is what the render middleware hands back when streaming is
//! enabled; hyper polls it chunk by chunk as the client reads.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tracing::{error, warn};

use crate::error::Error;

/// A boxed stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, Error>>;

pub(crate) const HTML_UTF8: &str = "text/html; charset=UTF-8";
const TEXT_UTF8: &str = "text/plain; charset=utf-8";

// ── Body ──────────────────────────────────────────────────────────────────────

pub(crate) enum Body {
    Full(Bytes),
    Stream(BodyStream),
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use tsu_render::Response;
/// use http::StatusCode;
///
/// Response::html("<h1>hi</h1>");
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .text("created");
/// ```
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Body,
}

impl Response {
    /// `200 OK`, `text/html; charset=UTF-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Vec::new(), body: Body::Full(Bytes::new()) }
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` when the body is produced chunk by chunk.
    pub fn is_stream(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Drains the body. For streamed responses this polls every chunk and
    /// fails with the first error the stream yields.
    pub async fn into_bytes(self) -> Result<Bytes, Error> {
        match self.body {
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(stream) => {
                let chunks: Vec<Bytes> = stream.try_collect().await?;
                Ok(Bytes::from(chunks.concat()))
            }
        }
    }

    /// The body as a stream of chunks. A complete body yields one chunk.
    pub fn into_stream(self) -> BodyStream {
        match self.body {
            Body::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            Body::Stream(stream) => stream,
        }
    }

    /// Converts into the hyper-facing response. The server calls this for
    /// every answer; a streamed body stays lazy until hyper polls it.
    ///
    /// Headers that are not valid HTTP tokens are dropped with a warning.
    pub fn into_http(self) -> http::Response<UnsyncBoxBody<Bytes, Error>> {
        let body = match self.body {
            Body::Full(bytes) => Full::new(bytes)
                .map_err(|never| -> Error { match never {} })
                .boxed_unsync(),
            Body::Stream(stream) => StreamBody::new(stream.map_ok(Frame::data))
                .boxed_unsync(),
        };

        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => { headers.append(n, v); }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("stream", &self.is_stream())
            .finish()
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with an HTML body (`text/html; charset=UTF-8`).
    pub fn html(self, body: impl Into<String>) -> Response {
        self.finish(Some(HTML_UTF8), Body::Full(Bytes::from(body.into())))
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Some(TEXT_UTF8), Body::Full(Bytes::from(body.into())))
    }

    /// Terminate with a streamed body. No content type is added; set the
    /// headers you need before calling this.
    pub fn stream(self, body: BodyStream) -> Response {
        self.finish(None, Body::Stream(body))
    }

    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Body::Full(Bytes::new()) }
    }

    fn finish(self, content_type: Option<&str>, body: Body) -> Response {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(ct) = content_type {
            if !self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                headers.push(("content-type".to_owned(), ct.to_owned()));
            }
        }
        headers.extend(self.headers);
        Response { status: self.status, headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implemented for [`Response`], strings, [`StatusCode`] and
/// `Result<R, Error>`. An `Err` is the framework's error path: it is logged
/// and answered with `500 Internal Server Error`.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<R: IntoResponse> IntoResponse for Result<R, Error> {
    fn into_response(self) -> Response {
        match self {
            Ok(r) => r.into_response(),
            Err(e) => {
                error!(error = %e, "handler failed");
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_header_is_dropped_and_the_rest_kept() {
        let res = Response::builder()
            .header("x-ok", "1")
            .header("bad name", "2")
            .header("x-bad-value", "line\nbreak")
            .text("hi")
            .into_http();

        let headers = res.headers();
        assert_eq!(headers["x-ok"], "1");
        assert_eq!(headers["content-type"], TEXT_UTF8);
        assert!(!headers.contains_key("x-bad-value"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn handler_error_becomes_500() {
        let res = Err::<Response, _>(Error::component("boom")).into_response();
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.is_stream());
    }

    #[tokio::test]
    async fn stream_body_is_polled_through_http_body() {
        let chunks = stream::iter(["a", "b"].map(|s| Ok(Bytes::from(s)))).boxed();
        let res = Response::builder().status(StatusCode::ACCEPTED).stream(chunks).into_http();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "ab");
    }
}
