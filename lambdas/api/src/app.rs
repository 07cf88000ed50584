use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::SERVICE_NAME,
    database::Database,
    middleware::{
        errors::{panic_response, route_not_found},
        translate_errors,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = if state.database.is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    Json(Health {
        status: "ok",
        database,
    })
}

/// Wraps `routes` with the service-wide routes and layers.
///
/// Error translation sits outside the panic catcher so that panics are
/// reported like any other unexpected error.
pub fn app(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .route("/health", get(health))
        .fallback(route_not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(translate_errors))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "request",
                    service = SERVICE_NAME,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
