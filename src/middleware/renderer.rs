//! Render middleware.
//!
//! [`renderer`] registers a renderer on every request it sees. Handlers then
//! call [`Context::render`] with the page content; the renderer wraps it in
//! the page component (if any), provides the request context to the tree and
//! serializes it either into a complete body or into a stream.
//!
//! ```rust,no_run
//! use leptos::prelude::*;
//! use tsu_render::middleware::{PageProps, RenderMiddleware, RenderOptions};
//! use tsu_render::{Context, Props, Router};
//!
//! let shell = RenderMiddleware::page(|p: PageProps| {
//!     let title = p.props.get("title").unwrap_or("tsu").to_owned();
//!     Ok(view! {
//!         <html>
//!             <head><title>{title}</title></head>
//!             <body>{(p.children)()}</body>
//!         </html>
//!     }
//!     .into_any())
//! })
//! .options(RenderOptions::new().doc_type(true));
//!
//! let app = Router::new()
//!     .with(shell)
//!     .get("/", |c: Context| async move {
//!         c.render(|| view! { <h1>"Home"</h1> }, Props::new().with("title", "Home")).await
//!     });
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use leptos::prelude::Children;
use tracing::debug;

use crate::context::{Context, Layout, Props, Renderer};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::response::{HTML_UTF8, Response};
use crate::view::{self, Node, RenderScope, StreamOptions};

use super::{Middleware, Next};

/// Page component: receives the content plus the layout it replaced.
pub type PageComponent = Arc<dyn Fn(PageProps) -> Result<Node, Error> + Send + Sync>;

/// Input of a [`PageComponent`].
pub struct PageProps {
    /// Builds the content passed to [`Context::render`].
    pub children: Children,
    pub props: Props,
    /// The layout registered before this middleware ran (identity if none).
    /// Call it to nest inside an outer layout.
    pub layout: Layout,
    /// The context of the request the middleware ran for.
    pub c: Context,
}

impl fmt::Debug for PageProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageProps")
            .field("props", &self.props)
            .field("layout", &self.layout)
            .field("c", &self.c)
            .finish_non_exhaustive()
    }
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Prefix written before the markup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DocType {
    #[default]
    None,
    /// `<!DOCTYPE html>`
    Html5,
    Custom(String),
}

impl DocType {
    pub fn prefix(&self) -> &str {
        match self {
            Self::None => "",
            Self::Html5 => "<!DOCTYPE html>",
            Self::Custom(s) => s,
        }
    }
}

impl From<bool> for DocType {
    fn from(on: bool) -> Self {
        if on { Self::Html5 } else { Self::None }
    }
}

impl From<&str> for DocType {
    fn from(s: &str) -> Self { Self::Custom(s.to_owned()) }
}

impl From<String> for DocType {
    fn from(s: String) -> Self { Self::Custom(s) }
}

/// Whether and how the response is streamed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamMode {
    #[default]
    Off,
    /// Stream with `Transfer-Encoding: chunked` and an HTML content type.
    Chunked,
    /// Stream with exactly these headers.
    Headers(Vec<(String, String)>),
}

impl StreamMode {
    pub fn headers<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Headers(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<bool> for StreamMode {
    fn from(on: bool) -> Self {
        if on { Self::Chunked } else { Self::Off }
    }
}

/// Options read by the render middleware on every request.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    pub doc_type: DocType,
    pub stream: StreamMode,
    /// Passed through to [`view::render_to_stream`].
    pub stream_options: StreamOptions,
}

impl RenderOptions {
    pub fn new() -> Self { Self::default() }

    pub fn doc_type(mut self, doc_type: impl Into<DocType>) -> Self {
        self.doc_type = doc_type.into();
        self
    }

    pub fn stream(mut self, mode: impl Into<StreamMode>) -> Self {
        self.stream = mode.into();
        self
    }

    pub fn stream_options(mut self, options: StreamOptions) -> Self {
        self.stream_options = options;
        self
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// Builds the render middleware from an optional page component and options.
pub fn renderer(component: Option<PageComponent>, options: RenderOptions) -> RenderMiddleware {
    RenderMiddleware { component, options: Arc::new(options) }
}

/// See [`renderer`].
#[derive(Clone)]
pub struct RenderMiddleware {
    component: Option<PageComponent>,
    options: Arc<RenderOptions>,
}

impl RenderMiddleware {
    /// Renders content inside whatever layout is already registered.
    pub fn new() -> Self {
        renderer(None, RenderOptions::default())
    }

    /// Renders content through `component`.
    pub fn page<F>(component: F) -> Self
    where
        F: Fn(PageProps) -> Result<Node, Error> + Send + Sync + 'static,
    {
        let component: PageComponent = Arc::new(component);
        renderer(Some(component), RenderOptions::default())
    }

    pub fn options(mut self, options: RenderOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Swaps the page component into the layout slot and registers the
    /// renderer on `c`.
    fn install(&self, c: &Context) {
        let layout = c.get_layout().unwrap_or_else(Layout::identity);

        if let Some(component) = &self.component {
            let component = Arc::clone(component);
            let original = layout.clone();
            // The layout lives in the context's own slot, so it holds a weak
            // handle. Whoever calls it, the page sees this request.
            let bound = c.downgrade();
            c.set_layout(Layout::new(move |caller, children, props| {
                component(PageProps {
                    children,
                    props: props.clone(),
                    layout: original.clone(),
                    c: bound.upgrade().unwrap_or_else(|| caller.clone()),
                })
            }));
        }

        let component = self.component.clone();
        let options = Arc::clone(&self.options);
        let render_fn: Renderer = Arc::new(move |c: Context, children: Children, props: Props| {
            render(c, layout.clone(), component.clone(), Arc::clone(&options), children, props).boxed()
        });
        c.set_renderer(render_fn);

        debug!(
            page = self.component.is_some(),
            stream = ?self.options.stream,
            "renderer installed"
        );
    }
}

impl Default for RenderMiddleware {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for RenderMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderMiddleware")
            .field("page", &self.component.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Middleware for RenderMiddleware {
    fn call(&self, c: Context, next: Next) -> BoxFuture {
        self.install(&c);
        Box::pin(next.run(c))
    }
}

async fn render(
    c: Context,
    layout: Layout,
    component: Option<PageComponent>,
    options: Arc<RenderOptions>,
    children: Children,
    props: Props,
) -> Result<Response, Error> {
    let scope = RenderScope::provide(&c);
    let lc = c.clone();
    let tree = move || match &component {
        Some(component) => component(PageProps { children, props, layout, c: lc }),
        None => layout.call(&lc, children, &props),
    };
    let doc_type = options.doc_type.prefix();

    if options.stream == StreamMode::Off {
        debug!(path = c.req().path(), "rendering to string");
        let mut body = String::from(doc_type);
        body.push_str(&view::render_to_string(&scope, tree)?);
        return Ok(c.html(body));
    }

    debug!(path = c.req().path(), stream = ?options.stream, "rendering to stream");
    let html = view::render_to_stream(scope, tree, options.stream_options.clone()).await?;

    match &options.stream {
        StreamMode::Chunked => {
            c.header("Transfer-Encoding", "chunked");
            c.header("Content-Type", HTML_UTF8);
        }
        StreamMode::Headers(pairs) => {
            for (name, value) in pairs {
                c.header(name, value);
            }
        }
        StreamMode::Off => {}
    }

    let body = if doc_type.is_empty() {
        html
    } else {
        let prefix = Bytes::from(doc_type.to_owned());
        stream::once(async move { Ok(prefix) }).chain(html).boxed()
    };
    Ok(c.body(body))
}
