pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::sensors::SensorService;
use handlers::ApiDoc;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: SensorService,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/api/sensor/data",
            post(handlers::add_reading).get(handlers::get_readings),
        )
        .route("/api/sensor/sensors/summary", get(handlers::get_summary))
        .route("/api/sensor/upload-xml", post(handlers::upload_xml))
        .route("/health", get(handlers::health))
        .with_state(state)
        .split_for_parts();

    let router = router.route(
        "/api-docs/openapi.json",
        get(move || async move { axum::Json(api) }),
    );
    with_layers(router, body_limit)
}

/// Layers shared by every route. Panics become a `500` carrying a request id.
fn with_layers(router: Router, body_limit: usize) -> Router {
    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
