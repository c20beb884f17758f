//! Route table assembly, mirroring the teacher's `api::build_router` shape:
//! a versioned API surface behind bearer auth, CORS and request tracing
//! layered on top.

use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers;
use crate::state::AppState;

/// Build the full router. `static_dir`, when given, serves a bundled SPA
/// frontend with a fallback to its `index.html` for client-side routes —
/// this project carries no frontend of its own, but the API is expected to
/// sit behind one the way the teacher's agent API does.
pub fn build_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/run-control", post(handlers::run_control))
        .route("/cancel-control", post(handlers::cancel_control))
        .route("/revoke-control-run", delete(handlers::revoke_control_run))
        .route(
            "/delete-control-output-tables",
            delete(handlers::delete_control_output_tables),
        )
        .route(
            "/delete-control-temporary-tables",
            delete(handlers::delete_control_temporary_tables),
        )
        .route("/get-running-controls", get(handlers::get_running_controls))
        .route("/get-all-controls", get(handlers::get_all_controls))
        .route("/get-control-versions", get(handlers::get_control_versions))
        .route("/get-control-runs", get(handlers::get_control_runs))
        .route("/read-control-logs", get(handlers::read_control_logs))
        .route("/get-datasources", get(handlers::get_datasources))
        .route("/get-datasource-columns", get(handlers::get_datasource_columns))
        .route(
            "/get-datasource-date-columns",
            get(handlers::get_datasource_date_columns),
        )
        .route("/save-control", post(handlers::save_control))
        .route("/delete-control", delete(handlers::delete_control))
        .route("/get-control-run", get(handlers::get_control_run))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authorize));

    let mut router = Router::new().nest("/api", api);

    if let Some(dir) = static_dir {
        let index = dir.join("index.html");
        let serve_dir = ServeDir::new(&dir).fallback(ServeFile::new(index));
        router = router.fallback_service(serve_dir);
    }

    router
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
