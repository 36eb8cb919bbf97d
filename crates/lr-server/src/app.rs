//! Router construction.
//!
//! Builds the axum routers for the asset and notification listeners.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload::{self, AGENT_PATH, ReloadState};
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the asset server router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    if state.agent_script.is_some() {
        router = router.route(AGENT_PATH, get(static_files::serve_agent));
    }

    router
        .merge(static_files::static_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::content_type_options_layer())
                .layer(headers::no_cache_layer()),
        )
        .with_state(state)
}

/// Create the notification endpoint router.
pub(crate) fn create_reload_router(state: ReloadState) -> Router {
    Router::new()
        .route("/", get(live_reload::ws_handler))
        .route("/ws", get(live_reload::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
