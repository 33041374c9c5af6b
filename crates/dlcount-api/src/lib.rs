//! dlcount-api — HTTP surface of the download counter.
//!
//! [`interceptor::count_downloads`] is an axum middleware: layer it on a
//! registry router with [`with_download_counting`], or run the standalone
//! sidecar router from [`build_router`], which receives mirrored traffic.
//!
//! # Sidecar routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Pool statistics |
//! | any | `/*` | `204 No Content`; `GET /<pkg>/-/<file>` is counted |

pub mod handlers;
pub mod interceptor;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use dlcount_counter::DownloadCounter;

pub use interceptor::{DownloadRequest, count_downloads, parse_download_path};

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub counter: Arc<DownloadCounter>,
}

/// Wrap `router` so that every download request passing through it is
/// counted. Responses are untouched.
pub fn with_download_counting(router: Router, counter: Arc<DownloadCounter>) -> Router {
    router.layer(from_fn_with_state(counter, count_downloads))
}

/// Build the sidecar router: health endpoint plus a counting fallback.
pub fn build_router(counter: Arc<DownloadCounter>) -> Router {
    let state = ApiState {
        counter: counter.clone(),
    };

    let router = Router::new()
        .route("/healthz", get(handlers::healthz))
        .fallback(handlers::mirrored)
        .with_state(state);

    with_download_counting(router, counter)
}
