//! Middleware layer.
//!
//! A middleware receives the request [`Context`] and a [`Next`] continuation.
//! It may prepare the context (register a layout, a renderer, headers) and
//! call [`Next::run`], or answer on its own without calling it.
//!
//! ```rust,no_run
//! use tsu_render::{Context, Router, middleware::Next};
//!
//! let app = Router::new()
//!     .with(|c: Context, next: Next| async move {
//!         c.header("x-powered-by", "tsu");
//!         next.run(c).await
//!     });
//! ```
//!
//! Built-in middleware:
//! - [`renderer`]: renders leptos views into HTML responses

mod renderer;

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::response::{IntoResponse, Response};

pub use renderer::{
    DocType, PageComponent, PageProps, RenderMiddleware, RenderOptions, StreamMode, renderer,
};

/// A request interceptor registered with [`Router::with`](crate::Router::with).
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, c: Context, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

impl<F, Fut, R> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, c: Context, next: Next) -> BoxFuture {
        let fut = self(c, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// The rest of the chain: remaining middleware, then the route handler.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    index: usize,
    handler: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: Arc<[BoxedMiddleware]>, handler: BoxedHandler) -> Self {
        Self { chain, index: 0, handler }
    }

    pub async fn run(self, c: Context) -> Response {
        match self.chain.get(self.index) {
            Some(mw) => {
                let mw = Arc::clone(mw);
                let next = Next { index: self.index + 1, ..self };
                mw.call(c, next).await
            }
            None => self.handler.call(c).await,
        }
    }
}
