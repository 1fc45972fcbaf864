//! Server-rendered pages with a shared layout, a streamed page and a
//! component that reads the request.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example pages
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl http://localhost:3000/users/42
//!   curl -N http://localhost:3000/stream/report

use std::time::Duration;

use leptos::prelude::*;
use tsu_render::middleware::{PageProps, RenderMiddleware, RenderOptions};
use tsu_render::view::Node;
use tsu_render::{Context, Error, Props, Response, Router, Server, use_request_context};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .with(RenderMiddleware::page(shell).options(RenderOptions::new().doc_type(true)))
        .with_at("/stream", RenderMiddleware::new().options(RenderOptions::new().doc_type(true).stream(true)))
        .get("/", home)
        .get("/users/{id}", user)
        .get("/stream/report", report);

    Server::bind("0.0.0.0:3000")
        .expect("valid address")
        .serve(app)
        .await
        .expect("server error");
}

fn shell(p: PageProps) -> Result<Node, Error> {
    let title = p.props.get("title").unwrap_or("tsu").to_owned();
    Ok(view! {
        <html lang="en">
            <head>
                <meta charset="utf-8"/>
                <title>{title}</title>
            </head>
            <body>{(p.children)()}</body>
        </html>
    }
    .into_any())
}

/// Reads the path from the ambient request context.
fn breadcrumb() -> Result<Node, Error> {
    let c = use_request_context()?;
    let path = c.req().path().to_owned();
    Ok(view! { <nav>{path}</nav> }.into_any())
}

async fn home(c: Context) -> Result<Response, Error> {
    c.render(
        || view! { <main>{breadcrumb}<h1>"Welcome"</h1></main> },
        Props::new().with("title", "Home"),
    )
    .await
}

async fn user(c: Context) -> Result<Response, Error> {
    let id = c.req().param("id").unwrap_or("unknown").to_owned();
    c.render(
        move || view! { <main>{breadcrumb}<h1>"User " {id}</h1></main> },
        Props::new().with("title", "User"),
    )
    .await
}

// The layout registered for "/stream" wraps the shell page, so the
// streamed response still gets <html> and <head>.
async fn report(c: Context) -> Result<Response, Error> {
    c.render(
        || view! {
            <main>
                <h1>"Report"</h1>
                <Suspense fallback=|| view! { <p>"loading…"</p> }>
                    {move || Suspend::new(async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        let rows = (1..=3)
                            .map(|i| view! { <tr><td>{i}</td></tr> })
                            .collect_view();
                        view! { <table>{rows}</table> }
                    })}
                </Suspense>
            </main>
        },
        Props::new().with("title", "Report"),
    )
    .await
}
