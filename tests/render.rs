use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt;
use http::StatusCode;
use leptos::prelude::*;
use tsu_render::middleware::{DocType, Next, PageProps, RenderMiddleware, RenderOptions, StreamMode};
use tsu_render::view::StreamOptions;
use tsu_render::{Context, Error, Props, Response, Router, use_request_context};

fn get(path: &str) -> http::Request<Bytes> {
    http::Request::get(path).body(Bytes::new()).unwrap()
}

async fn body_string(res: Response) -> String {
    String::from_utf8(res.into_bytes().await.unwrap().to_vec()).unwrap()
}

async fn chunks(res: Response) -> Vec<String> {
    res.into_stream()
        .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
        .collect()
        .await
}

/// `true` when every needle occurs in `haystack`, in the given order.
fn in_order(haystack: &str, needles: &[&str]) -> bool {
    let mut rest = haystack;
    needles.iter().all(|needle| match rest.find(needle) {
        Some(at) => {
            rest = &rest[at + needle.len()..];
            true
        }
        None => false,
    })
}

async fn late<T>(value: T) -> T {
    tokio::task::yield_now().await;
    value
}

async fn hello(c: Context) -> Result<Response, Error> {
    c.render(|| view! { <h1>"Hello"</h1> }, Props::new().with("title", "Greeting")).await
}

fn layout_page() -> RenderMiddleware {
    RenderMiddleware::page(|p: PageProps| {
        let title = p.props.get("title").unwrap_or("untitled").to_owned();
        Ok(view! {
            <html>
                <head><title>{title}</title></head>
                <body>{(p.children)()}</body>
            </html>
        }
        .into_any())
    })
}

fn streaming() -> RenderMiddleware {
    RenderMiddleware::new().options(RenderOptions::new().stream(true))
}

#[tokio::test]
async fn renders_page_with_html5_doctype() {
    let app = Router::new()
        .with(layout_page().options(RenderOptions::new().doc_type(true)))
        .get("/", hello);

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("content-type"), Some("text/html; charset=UTF-8"));
    assert!(!res.is_stream());

    let html = body_string(res).await;
    assert!(html.starts_with("<!DOCTYPE html><html><head><title>"), "{html}");
    assert!(in_order(&html, &["Greeting", "</title></head><body>", "<h1>Hello</h1>", "</body></html>"]), "{html}");
}

#[tokio::test]
async fn custom_doctype_and_no_doctype() {
    let custom = Router::new()
        .with(RenderMiddleware::new().options(RenderOptions::new().doc_type("<!doctype html>")))
        .get("/", hello);
    assert_eq!(body_string(custom.handle(get("/")).await).await, "<!doctype html><h1>Hello</h1>");

    let none = Router::new()
        .with(RenderMiddleware::new().options(RenderOptions::new().doc_type(DocType::None)))
        .get("/", hello);
    assert_eq!(body_string(none.handle(get("/")).await).await, "<h1>Hello</h1>");
}

#[tokio::test]
async fn chunked_stream_sets_default_headers() {
    let app = Router::new().with(streaming()).get("/", hello);

    let res = app.handle(get("/")).await;
    assert!(res.is_stream());
    assert_eq!(
        res.headers(),
        [
            ("Transfer-Encoding".to_owned(), "chunked".to_owned()),
            ("Content-Type".to_owned(), "text/html; charset=UTF-8".to_owned()),
        ],
    );
    assert_eq!(body_string(res).await, "<h1>Hello</h1>");
}

#[tokio::test]
async fn stream_with_header_map_sets_only_those_headers() {
    let mode = StreamMode::headers([("Content-Type", "text/html"), ("X-Stream", "on")]);
    let app = Router::new()
        .with(RenderMiddleware::new().options(RenderOptions::new().stream(mode)))
        .get("/", hello);

    let res = app.handle(get("/")).await;
    assert_eq!(
        res.headers(),
        [
            ("Content-Type".to_owned(), "text/html".to_owned()),
            ("X-Stream".to_owned(), "on".to_owned()),
        ],
    );
    assert_eq!(res.header("transfer-encoding"), None);
}

#[tokio::test]
async fn chunked_stream_headers_reach_hyper() {
    let app = Router::new().with(streaming()).get("/", hello);

    let res = app.handle(get("/")).await.into_http();
    let headers = res.headers();
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[http::header::TRANSFER_ENCODING], "chunked");
    assert_eq!(headers[http::header::CONTENT_TYPE], "text/html; charset=UTF-8");
}

#[tokio::test]
async fn header_map_mode_reaches_hyper_without_invalid_names() {
    let mode = StreamMode::headers([
        ("Content-Type", "text/html"),
        ("X-Stream", "on"),
        ("Not A Header", "dropped"),
    ]);
    let app = Router::new()
        .with(RenderMiddleware::new().options(RenderOptions::new().stream(mode)))
        .get("/", hello);

    let res = app.handle(get("/")).await.into_http();
    let headers = res.headers();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(headers.len(), 2);
    assert_eq!(headers[http::header::CONTENT_TYPE], "text/html");
    assert_eq!(headers["x-stream"], "on");
    assert!(!headers.contains_key(http::header::TRANSFER_ENCODING));
}

#[tokio::test]
async fn streamed_doctype_comes_first() {
    let app = Router::new()
        .with(layout_page().options(RenderOptions::new().doc_type(true).stream(true)))
        .get("/", |c: Context| async move {
            c.render(
                || view! {
                    <main>
                        <Suspense fallback=|| "...">{move || Suspend::new(late("late"))}</Suspense>
                    </main>
                },
                Props::new(),
            )
            .await
        });

    let chunks = chunks(app.handle(get("/")).await).await;
    assert_eq!(chunks[0], "<!DOCTYPE html>");
    assert!(chunks[1].starts_with("<html><head><title>"), "{chunks:?}");
    assert!(!chunks[1].contains("late"), "{chunks:?}");
    assert!(in_order(&chunks.concat(), &["<main>", "late", "</main>", "</html>"]), "{chunks:?}");
}

#[tokio::test]
async fn components_see_the_request_context() {
    fn user_id() -> Result<String, Error> {
        let c = use_request_context()?;
        Ok(c.req().param("id").unwrap_or("?").to_owned())
    }

    let app = Router::new()
        .with(RenderMiddleware::new())
        .get("/users/{id}", |c: Context| async move {
            c.render(|| view! { <span>{user_id}</span> }, Props::new()).await
        });

    let html = body_string(app.handle(get("/users/42")).await).await;
    assert!(in_order(&html, &["<span>", "42", "</span>"]), "{html}");
}

#[tokio::test]
async fn context_seen_by_components_is_the_middleware_context() {
    let captured: Arc<Mutex<Vec<Context>>> = Arc::default();

    let from_mw = Arc::clone(&captured);
    let from_tree = Arc::clone(&captured);
    let app = Router::new()
        .with(move |c: Context, next: Next| {
            from_mw.lock().unwrap().push(c.clone());
            next.run(c)
        })
        .with(streaming())
        .get("/", move |c: Context| {
            let from_tree = Arc::clone(&from_tree);
            async move {
                c.render(
                    move || {
                        if let Ok(found) = use_request_context() {
                            from_tree.lock().unwrap().push(found);
                        }
                        "ok"
                    },
                    Props::new(),
                )
                .await
            }
        });

    let res = app.handle(get("/")).await;
    assert_eq!(body_string(res).await, "ok");

    let seen = captured.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].ptr_eq(&seen[1]));
}

#[tokio::test]
async fn concurrent_requests_get_their_own_context() {
    let app = Arc::new(Router::new().with(streaming()).get("/n/{n}", |c: Context| async move {
        c.render(
            || view! {
                <i>
                    <Suspense fallback=|| "...">
                        {move || Suspend::new(async {
                            late(()).await;
                            use_request_context().map(|c| format!("n={}", c.req().param("n").unwrap_or("?")))
                        })}
                    </Suspense>
                </i>
            },
            Props::new(),
        )
        .await
    }));

    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { body_string(app.handle(get(&format!("/n/{n}"))).await).await })
        })
        .collect();

    for (n, task) in tasks.into_iter().enumerate() {
        let html = task.await.unwrap();
        assert!(in_order(&html, &["<i>", &format!("n={n}"), "</i>"]), "{html}");
    }
}

#[tokio::test]
async fn nested_renderers_compose_layouts() {
    let outer = RenderMiddleware::page(|p: PageProps| {
        Ok(view! { <html><body>{(p.children)()}</body></html> }.into_any())
    });
    let inner = RenderMiddleware::page(|p: PageProps| {
        let PageProps { children, props, layout, c } = p;
        layout.call(&c, Box::new(move || view! { <article>{children()}</article> }.into_any()), &props)
    });

    let app = Router::new()
        .with(outer)
        .with_at("/blog", inner)
        .get("/", hello)
        .get("/blog/post", hello);

    let home = body_string(app.handle(get("/")).await).await;
    assert!(in_order(&home, &["<html><body>", "<h1>Hello</h1>", "</body></html>"]), "{home}");
    assert!(!home.contains("<article>"), "{home}");

    let post = body_string(app.handle(get("/blog/post")).await).await;
    assert!(in_order(&post, &["<html><body>", "<article>", "<h1>Hello</h1>", "</article>", "</body></html>"]), "{post}");
}

#[tokio::test]
async fn render_errors_reach_the_error_path() {
    let app = Router::new()
        .with(RenderMiddleware::new())
        .get("/", |c: Context| async move {
            let broken = || Err::<&str, Error>(Error::component("no data"));
            c.render(move || view! { <p>{broken}</p> }, Props::new()).await
        });

    assert_eq!(app.handle(get("/")).await.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn failing_page_component_reaches_the_error_path() {
    let app = Router::new()
        .with(RenderMiddleware::page(|_: PageProps| Err(Error::component("no shell"))))
        .get("/", hello);

    assert_eq!(app.handle(get("/")).await.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn stream_shell_errors_reach_the_error_path() {
    let app = Router::new().with(streaming()).get("/", |c: Context| async move {
        let broken = || Err::<&str, Error>(Error::component("no data"));
        c.render(move || view! { <p>{broken}</p> }, Props::new()).await
    });

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.header("transfer-encoding"), None);
}

#[tokio::test]
async fn stream_error_after_a_large_prefix_is_still_a_500() {
    let app = Router::new().with(streaming()).get("/", |c: Context| async move {
        let filler = "x".repeat(64 * 1024);
        let broken = || Err::<&str, Error>(Error::component("footer failed"));
        c.render(move || view! { <main>{filler}</main><footer>{broken}</footer> }, Props::new()).await
    });

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!res.is_stream());
    assert_eq!(res.header("transfer-encoding"), None);
}

#[tokio::test]
async fn stream_error_after_a_suspense_boundary_is_still_a_500() {
    let app = Router::new().with(streaming()).get("/", |c: Context| async move {
        let broken = || Err::<&str, Error>(Error::component("footer failed"));
        c.render(
            move || view! {
                <Suspense fallback=|| "...">{move || Suspend::new(late("body"))}</Suspense>
                <footer>{broken}</footer>
            },
            Props::new(),
        )
        .await
    });

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!res.is_stream());
}

#[tokio::test]
async fn suspended_error_ends_a_started_stream() {
    let reported: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let options = StreamOptions::new().on_error(move |e| sink.lock().unwrap().push(e.to_string()));

    let app = Router::new()
        .with(RenderMiddleware::new().options(RenderOptions::new().stream(true).stream_options(options)))
        .get("/", |c: Context| async move {
            c.render(
                || view! {
                    <p>"shell"</p>
                    <Suspense fallback=|| "...">
                        {move || Suspend::new(async {
                            late(()).await;
                            Err::<&str, Error>(Error::component("backend gone"))
                        })}
                    </Suspense>
                },
                Props::new(),
            )
            .await
        });

    let res = app.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::OK);

    let items: Vec<_> = res.into_stream().collect().await;
    assert!(items.first().is_some_and(|first| first.is_ok()));
    assert!(items.last().is_some_and(|last| last.is_err()));
    assert!(reported.lock().unwrap().iter().any(|msg| msg.contains("backend gone")));
}

#[tokio::test]
async fn accessor_fails_without_the_middleware() {
    let app = Router::new().get("/", |c: Context| async move {
        let found = || use_request_context().map(|_| "found");
        c.render(move || view! { <p>{found}</p> }, Props::new()).await
    });

    assert_eq!(app.handle(get("/")).await.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(use_request_context(), Err(Error::ContextNotProvided)));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = Router::new().with(RenderMiddleware::new()).get("/", hello);
    assert_eq!(app.handle(get("/missing")).await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn streamed_chunks_arrive_in_order() {
    let app = Router::new().with(streaming()).get("/", |c: Context| async move {
        c.render(
            || view! {
                <ol>
                    <li>"first"</li>
                    <Suspense fallback=|| "...">
                        {move || Suspend::new(async {
                            late(()).await;
                            view! { <li>"second"</li> }
                        })}
                    </Suspense>
                </ol>
            },
            Props::new(),
        )
        .await
    });

    let chunks = chunks(app.handle(get("/")).await).await;
    assert!(chunks.len() >= 2, "{chunks:?}");
    assert!(chunks[0].starts_with("<ol><li>first</li>"), "{chunks:?}");
    assert!(!chunks[0].contains("second"), "{chunks:?}");
    assert!(in_order(&chunks.concat(), &["first", "<li>second</li>", "</ol>"]), "{chunks:?}");
}
