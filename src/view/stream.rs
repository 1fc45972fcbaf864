//! Asynchronous tree-to-stream serializer.
//!
//! tachys renders the tree in order: everything outside a `Suspense`
//! boundary is written while the stream is built, and each boundary becomes
//! a chunk once its content resolves. The first chunk is the shell. Every
//! error thrown before the shell is complete rejects the call, whatever the
//! size of the page.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use leptos::prelude::RenderHtml;
use leptos::tachys::ssr::StreamBuilder;
use tracing::error;

use crate::error::Error;
use crate::response::BodyStream;

use super::{Node, RenderScope};

/// The body stream produced by [`render_to_stream`].
pub type HtmlStream = BodyStream;

type OnError = Arc<dyn Fn(&Error) + Send + Sync>;

// ── StreamOptions ─────────────────────────────────────────────────────────────

/// Configuration handed through to [`render_to_stream`].
#[derive(Clone, Default)]
pub struct StreamOptions {
    bootstrap_scripts: Vec<String>,
    nonce: Option<String>,
    on_error: Option<OnError>,
}

impl StreamOptions {
    pub fn new() -> Self { Self::default() }

    /// Appends `<script src=".." async></script>` after the tree.
    pub fn bootstrap_script(mut self, src: impl Into<String>) -> Self {
        self.bootstrap_scripts.push(src.into());
        self
    }

    /// Nonce attribute for the bootstrap scripts.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Called for errors raised after the shell was sent. Those can no
    /// longer change the response status; the stream ends with the error.
    pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn report(&self, e: &Error) {
        error!(error = %e, "render failed after the shell was sent");
        if let Some(hook) = &self.on_error {
            hook(e);
        }
    }

    fn scripts(&self) -> String {
        let nonce = self.nonce.as_deref()
            .map(|n| format!(r#" nonce="{}""#, html_escape::encode_double_quoted_attribute(n)))
            .unwrap_or_default();
        self.bootstrap_scripts.iter()
            .map(|src| format!(
                r#"<script src="{}"{nonce} async></script>"#,
                html_escape::encode_double_quoted_attribute(src),
            ))
            .collect()
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("bootstrap_scripts", &self.bootstrap_scripts)
            .field("nonce", &self.nonce)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ── render_to_stream ──────────────────────────────────────────────────────────

/// Builds the tree with `tree` inside `scope` and serializes it as a stream.
///
/// Resolves once the shell is rendered. An error returned by `tree` or
/// thrown anywhere outside a `Suspense` boundary is returned here; errors
/// from suspended content go to [`StreamOptions::on_error`] and terminate
/// the stream.
pub async fn render_to_stream<F>(
    scope: RenderScope,
    tree: F,
    options: StreamOptions,
) -> Result<HtmlStream, Error>
where
    F: FnOnce() -> Result<Node, Error> + Send,
{
    let builder = scope.run(|| tree().map(|view| view.to_html_stream_in_order()))?;
    scope.check()?;

    let mut chunks = scoped(scope.clone(), builder);
    let shell = chunks.next().await;
    scope.check()?;

    let rest = stream::unfold(Some((chunks, scope, options)), |state| async move {
        let (mut chunks, scope, options) = state?;
        loop {
            let chunk = chunks.next().await;
            if let Err(e) = scope.check() {
                options.report(&e);
                return Some((Err(e), None));
            }
            match chunk {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => return Some((Ok(Bytes::from(chunk)), Some((chunks, scope, options)))),
                None => {
                    let scripts = options.scripts();
                    return (!scripts.is_empty()).then(|| (Ok(Bytes::from(scripts)), None));
                }
            }
        }
    });

    let shell = shell.filter(|s| !s.is_empty()).map(|s| Ok(Bytes::from(s)));
    Ok(stream::iter(shell).chain(rest).boxed())
}

/// Polls `builder` with the scope's owner and error hook installed, so
/// suspended components see the request context on whichever worker thread
/// hyper polls the body from.
fn scoped(scope: RenderScope, builder: StreamBuilder) -> BoxStream<'static, String> {
    let mut builder = Box::pin(builder);
    stream::poll_fn(move |cx| scope.run(|| builder.as_mut().poll_next(cx))).boxed()
}
