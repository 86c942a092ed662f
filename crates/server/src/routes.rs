//! Route configuration.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use chunkdrop_protocol::routes;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the application router.
///
/// Part bodies are streamed to disk and carry no size limit. Anything not
/// matched by the protocol routes is served from the public directory.
pub fn create_router(state: AppState) -> Router {
    let whole_limit = usize::try_from(state.config.whole_upload_limit).unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route(routes::VERIFY, get(handlers::verify))
        .route(
            routes::PART,
            post(handlers::upload_part).layer(DefaultBodyLimit::disable()),
        )
        .route(routes::MERGE, get(handlers::merge))
        .route(
            routes::WHOLE_UPLOAD,
            post(handlers::whole_upload).layer(DefaultBodyLimit::max(whole_limit)),
        )
        .fallback_service(ServeDir::new(state.storage.public_dir()));

    if state.config.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
