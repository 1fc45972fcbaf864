//! Bridge to the leptos renderer.
//!
//! Trees are ordinary leptos views, erased to [`Node`] (`AnyView`) so they
//! can travel through [`Context::render`](crate::Context::render) and the
//! layout slot. Every render runs inside a [`RenderScope`]: a reactive
//! [`Owner`] that carries the request [`Context`] plus an error hook that
//! collects whatever components throw while they are serialized.
//!
//! [`render_to_string`] and [`render_to_stream`] wrap tachys'
//! `RenderHtml::to_html` and `RenderHtml::to_html_stream_in_order`.
//!
//! ```rust
//! use leptos::prelude::*;
//! use tsu_render::view::{RenderScope, render_to_string};
//!
//! let html = render_to_string(&RenderScope::new(), || {
//!     Ok(view! { <main><h1>"Hello & welcome"</h1></main> }.into_any())
//! });
//! assert_eq!(html.unwrap(), "<main><h1>Hello &amp; welcome</h1></main>");
//! ```

mod stream;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use any_spawner::Executor;
use leptos::prelude::{AnyView, Owner, RenderHtml, provide_context};
use throw_error::{ErrorHook, ErrorId};

use crate::context::Context;
use crate::error::Error;

pub use stream::{HtmlStream, StreamOptions, render_to_stream};

/// A type-erased view, as produced by `view! { .. }.into_any()`.
pub type Node = AnyView;

// ── RenderScope ───────────────────────────────────────────────────────────────

/// Reactive owner and error sink for one render.
///
/// Clones share the owner and the collected errors.
#[derive(Clone)]
pub struct RenderScope {
    owner: Owner,
    thrown: Arc<Thrown>,
}

impl RenderScope {
    /// A scope with no request context.
    pub fn new() -> Self {
        // Suspense boundaries spawn their bookkeeping on the global executor.
        let _ = Executor::init_tokio();
        Self { owner: Owner::new(), thrown: Arc::default() }
    }

    /// A scope whose components can fetch `c` with
    /// [`use_request_context`](crate::use_request_context).
    pub fn provide(c: &Context) -> Self {
        let scope = Self::new();
        scope.owner.with(|| provide_context(c.clone()));
        scope
    }

    /// Runs `f` with this scope's owner and error hook installed.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let hook: Arc<dyn ErrorHook> = self.thrown.clone();
        let _hook = throw_error::set_error_hook(hook);
        self.owner.with(f)
    }

    /// Fails with the first error thrown since the last check.
    pub(crate) fn check(&self) -> Result<(), Error> {
        let thrown = std::mem::take(&mut *self.thrown.lock());
        match thrown.into_iter().next() {
            Some(first) => Err(Error::Render(first.to_string())),
            None => Ok(()),
        }
    }
}

impl Default for RenderScope {
    fn default() -> Self { Self::new() }
}

/// Errors thrown by `Result` views, in the order they were thrown.
#[derive(Default)]
struct Thrown(Mutex<Vec<throw_error::Error>>);

impl Thrown {
    fn lock(&self) -> MutexGuard<'_, Vec<throw_error::Error>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ErrorHook for Thrown {
    fn throw(&self, error: throw_error::Error) -> ErrorId {
        let mut thrown = self.lock();
        thrown.push(error);
        ErrorId::from(thrown.len())
    }

    // A server render never retracts an error.
    fn clear(&self, _id: &ErrorId) {}
}

// ── render_to_string ──────────────────────────────────────────────────────────

/// Builds the tree with `tree` and serializes it, both inside `scope`.
///
/// `Suspense` boundaries render their fallback. An error returned by `tree`
/// or thrown by any component in it fails the whole render.
pub fn render_to_string<F>(scope: &RenderScope, tree: F) -> Result<String, Error>
where
    F: FnOnce() -> Result<Node, Error>,
{
    let html = scope.run(|| tree().map(|view| view.to_html()))?;
    scope.check()?;
    Ok(html)
}
