//! Dev server: static files from the build directory plus live reload
//!
//! An axum router with two jobs: an SSE endpoint (`/__livereload`) that
//! streams [`ReloadEvent`]s to the browser, and a fallback handler that
//! serves the build tree, injecting the reload client into HTML responses.
//! Shutdown is cooperative: the server drains when the shared shutdown
//! channel flips.

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::SiteConfig;
use crate::error::{PipelineError, Result};
use crate::reload::{self, ReloadHub};

#[derive(Clone)]
struct AppState {
    root: PathBuf,
    hub: ReloadHub,
}

/// Bind the dev-server listener. Separate from [`serve`] so a bind failure
/// (port already in use) surfaces before the serve loop is spawned and the
/// startup banner printed, not when the session shuts down.
pub async fn bind(config: &SiteConfig) -> Result<tokio::net::TcpListener> {
    let addr = ("127.0.0.1", config.serve.port);
    tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        PipelineError::stage(
            "serve",
            "bind",
            format!("127.0.0.1:{}: {}", config.serve.port, e),
        )
    })
}

/// Serve the build directory on a pre-bound listener until the shutdown
/// channel flips
pub async fn serve(
    config: Arc<SiteConfig>,
    hub: ReloadHub,
    listener: tokio::net::TcpListener,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let state = AppState {
        root: config.build_dir(),
        hub,
    };

    let app = Router::new()
        .route("/__livereload", get(livereload))
        .fallback(get(asset))
        .with_state(state);

    if let Ok(addr) = listener.local_addr() {
        tracing::debug!("dev server listening on {addr}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|e| PipelineError::stage("serve", "http", e))?;

    Ok(())
}

/// SSE stream of reload events for the injected client
async fn livereload(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.hub.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(event) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(event.name()).data(data)))
            }
            // A lagged receiver just skips ahead; dropping events is fine
            // because the client reloads on the next one anyway.
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Serve a file from the build tree; HTML gets the reload client injected
async fn asset(State(state): State<AppState>, uri: Uri) -> Response {
    let requested = uri.path().trim_start_matches('/');
    let requested = if requested.is_empty() {
        "index.html"
    } else {
        requested
    };

    let rel = Path::new(requested);
    // Only plain path segments; anything like `..` gets a 404
    if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let mut full = state.root.join(rel);
    if full.is_dir() {
        full = full.join("index.html");
    }

    let Ok(bytes) = tokio::fs::read(&full).await else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let ext = full.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext == "html" || ext == "htm" {
        let page = String::from_utf8_lossy(&bytes);
        let injected = reload::inject_client(&page);
        return (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            injected,
        )
            .into_response();
    }

    ([(header::CONTENT_TYPE, content_type(ext))], bytes).into_response()
}

fn content_type(ext: &str) -> &'static str {
    match ext {
        "css" => "text/css; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" | "md" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
