//! Static file serving.
//!
//! Every request not claimed by another route is resolved against the root
//! directory.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::assets;
use crate::error::AssetError;
use crate::live_reload::AGENT_PATH;
use crate::state::AppState;

/// Closing tag the agent script is inserted before.
const BODY_CLOSE: &[u8] = b"</body>";

/// Create router serving files from the root directory.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new().fallback(serve_asset)
}

/// Serve a file from the root directory.
async fn serve_asset(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    match assets::load(&state.root, req.uri().path()).await {
        Ok(asset) => {
            tracing::debug!(path = %asset.path.display(), mime = %asset.mime, "Serving asset");
            let inject = state.inject_agent && state.agent_script.is_some();
            let content = maybe_inject_agent(asset.content, &asset.mime, inject);
            ([(header::CONTENT_TYPE, asset.mime)], content).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Insert the agent script tag into HTML content when `inject` is set.
fn maybe_inject_agent(content: Vec<u8>, mime: &str, inject: bool) -> Vec<u8> {
    if inject && mime.starts_with("text/html") {
        inject_agent_tag(&content)
    } else {
        content
    }
}

/// Insert the agent script tag before the last `</body>`, or append it.
fn inject_agent_tag(content: &[u8]) -> Vec<u8> {
    let tag = format!("<script src=\"{AGENT_PATH}\"></script>");
    let mut result = Vec::with_capacity(content.len() + tag.len());

    match content
        .windows(BODY_CLOSE.len())
        .rposition(|w| w.eq_ignore_ascii_case(BODY_CLOSE))
    {
        Some(pos) => {
            result.extend_from_slice(&content[..pos]);
            result.extend_from_slice(tag.as_bytes());
            result.extend_from_slice(&content[pos..]);
        }
        None => {
            result.extend_from_slice(content);
            result.extend_from_slice(tag.as_bytes());
        }
    }
    result
}

/// Serve the reload agent script.
pub(crate) async fn serve_agent(State(state): State<Arc<AppState>>) -> Response {
    match &state.agent_script {
        Some(script) => (
            [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
            script.clone(),
        )
            .into_response(),
        None => AssetError::NotFound(AGENT_PATH.to_owned()).into_response(),
    }
}
