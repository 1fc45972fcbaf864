//! Per-request context.
//!
//! A [`Context`] is created by the router for every matched request and
//! handed down the middleware chain to the handler. Clones share state, so a
//! middleware can register a layout or a renderer and the handler sees it.
//!
//! The context is also the ambient value of a render: the render middleware
//! provides it to the reactive owner the tree is built in, and components
//! fetch it with [`use_request_context`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use http::StatusCode;
use leptos::prelude::{Children, IntoAny, use_context};

use crate::error::Error;
use crate::request::Request;
use crate::response::{BodyStream, Response};
use crate::view::{self, Node, RenderScope};

/// Returns the request context of the render in progress.
///
/// Succeeds inside components built and rendered by the render middleware,
/// including suspended ones.
///
/// ```rust
/// use tsu_render::{use_request_context, Error};
///
/// assert!(matches!(use_request_context(), Err(Error::ContextNotProvided)));
/// ```
pub fn use_request_context() -> Result<Context, Error> {
    use_context::<Context>().ok_or(Error::ContextNotProvided)
}

// ── Props ─────────────────────────────────────────────────────────────────────

/// Caller-supplied values passed along with the content to render.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Props(BTreeMap<String, String>);

impl Props {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Wraps rendered content, e.g. in an `<html>` shell.
///
/// Layouts run while the tree is being built, inside the render's reactive
/// owner, so they can call [`use_request_context`] and use `Suspense`.
#[derive(Clone)]
pub struct Layout(Arc<dyn Fn(&Context, Children, &Props) -> Result<Node, Error> + Send + Sync>);

impl Layout {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context, Children, &Props) -> Result<Node, Error> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// The layout used when nothing was registered: returns the children as is.
    pub fn identity() -> Self {
        Self::new(|_, children, _| Ok(children()))
    }

    pub fn call(&self, c: &Context, children: Children, props: &Props) -> Result<Node, Error> {
        (self.0)(c, children, props)
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Layout(..)")
    }
}

/// Produces the response for [`Context::render`].
pub type Renderer =
    Arc<dyn Fn(Context, Children, Props) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync>;

// ── Context ───────────────────────────────────────────────────────────────────

/// Request-scoped state shared by middleware and the handler.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    req: Request,
    state: Mutex<State>,
}

struct State {
    status: StatusCode,
    headers: Vec<(String, String)>,
    layout: Option<Layout>,
    renderer: Option<Renderer>,
}

impl Context {
    pub(crate) fn new(req: Request) -> Self {
        let state = State {
            status: StatusCode::OK,
            headers: Vec::new(),
            layout: None,
            renderer: None,
        };
        Self { inner: Arc::new(Inner { req, state: Mutex::new(state) }) }
    }

    pub fn req(&self) -> &Request { &self.inner.req }

    /// `true` when both handles belong to the same request.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A handle that does not keep the request alive. Closures stored in
    /// the context's own slots hold this instead of a `Context`.
    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext(Arc::downgrade(&self.inner))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the status used by [`html`](Self::html), [`text`](Self::text)
    /// and [`body`](Self::body).
    pub fn status(&self, code: StatusCode) {
        self.state().status = code;
    }

    /// Sets a response header, replacing any earlier value (case-insensitive).
    pub fn header(&self, name: &str, value: &str) {
        let mut state = self.state();
        state.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        state.headers.push((name.to_owned(), value.to_owned()));
    }

    /// Builds a `text/html; charset=UTF-8` response with the headers set so far.
    pub fn html(&self, body: impl Into<String>) -> Response {
        self.builder().html(body)
    }

    pub fn text(&self, body: impl Into<String>) -> Response {
        self.builder().text(body)
    }

    /// Builds a streamed response. Only headers set on the context are sent.
    pub fn body(&self, stream: BodyStream) -> Response {
        self.builder().stream(stream)
    }

    fn builder(&self) -> crate::response::ResponseBuilder {
        let state = self.state();
        state.headers.iter().fold(
            Response::builder().status(state.status),
            |b, (k, v)| b.header(k, v),
        )
    }

    pub fn get_layout(&self) -> Option<Layout> {
        self.state().layout.clone()
    }

    pub fn set_layout(&self, layout: Layout) {
        self.state().layout = Some(layout);
    }

    pub fn set_renderer(&self, renderer: Renderer) {
        self.state().renderer = Some(renderer);
    }

    /// Renders the tree built by `children` with the registered renderer.
    ///
    /// `children` runs inside the render, so components in it can reach the
    /// request through [`use_request_context`]:
    ///
    /// ```rust,no_run
    /// # use leptos::prelude::*;
    /// # use tsu_render::{Context, Error, Props, Response};
    /// async fn home(c: Context) -> Result<Response, Error> {
    ///     c.render(|| view! { <h1>"Home"</h1> }, Props::new().with("title", "Home")).await
    /// }
    /// ```
    ///
    /// Without a renderer the tree is serialized as plain HTML and no request
    /// context is provided to it.
    pub fn render<F, V>(&self, children: F, props: Props) -> BoxFuture<'static, Result<Response, Error>>
    where
        F: FnOnce() -> V + Send + 'static,
        V: IntoAny,
    {
        let children: Children = Box::new(move || children().into_any());
        let renderer = self.state().renderer.clone();
        match renderer {
            Some(renderer) => renderer(self.clone(), children, props),
            None => {
                let html = view::render_to_string(&RenderScope::new(), move || Ok(children()));
                future::ready(html.map(|html| self.html(html))).boxed()
            }
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", self.req().method())
            .field("path", &self.req().path())
            .finish_non_exhaustive()
    }
}

/// See [`Context::downgrade`].
#[derive(Clone)]
pub(crate) struct WeakContext(Weak<Inner>);

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<Context> {
        self.0.upgrade().map(|inner| Context { inner })
    }
}

#[cfg(test)]
pub(crate) fn test_context(path: &str) -> Context {
    let (parts, ()) = http::Request::get(path).body(()).unwrap().into_parts();
    Context::new(Request::new(parts, bytes::Bytes::new(), Default::default()))
}
