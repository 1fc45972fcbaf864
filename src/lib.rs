//! # tsu-render
//!
//! Server-side HTML rendering for the tsu HTTP framework.
//!
//! A [`RenderMiddleware`](middleware::RenderMiddleware) registers a renderer
//! on every request. Handlers describe the page with leptos' `view!` and call
//! [`Context::render`]; the middleware wraps it in the page component, makes
//! the request [`Context`] available to every component in the tree through
//! [`use_request_context`], and answers with a complete HTML body or a
//! streamed one.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use leptos::prelude::*;
//! use tsu_render::middleware::{PageProps, RenderMiddleware, RenderOptions};
//! use tsu_render::{Context, Props, Response, Router, Server, use_request_context};
//!
//! #[tokio::main]
//! async fn main() {
//!     let shell = RenderMiddleware::page(|p: PageProps| {
//!         Ok(view! { <html><body>{(p.children)()}</body></html> }.into_any())
//!     })
//!     .options(RenderOptions::new().doc_type(true));
//!
//!     let app = Router::new()
//!         .with(shell)
//!         .get("/users/{id}", user_page);
//!
//!     Server::bind("0.0.0.0:3000").unwrap().serve(app).await.unwrap();
//! }
//!
//! fn user_name() -> Result<String, tsu_render::Error> {
//!     let c = use_request_context()?;
//!     Ok(c.req().param("id").unwrap_or("unknown").to_owned())
//! }
//!
//! async fn user_page(c: Context) -> Result<Response, tsu_render::Error> {
//!     c.render(|| view! { <h1>{user_name}</h1> }, Props::new()).await
//! }
//! ```
//!
//! ## Streaming
//!
//! With `RenderOptions::new().stream(true)` the tree is sent as a chunked
//! stream. Everything outside a `<Suspense>` boundary goes out as the first
//! chunk; suspended sections follow as they resolve. An error raised before
//! that first chunk still turns the response into a `500`.

mod context;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod view;

pub use context::{Context, Layout, Props, Renderer, use_request_context};
pub use error::Error;
pub use handler::Handler;
pub use request::Request;
pub use response::{BodyStream, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
