// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, progress},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Every route requires a bearer token.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (attempt service, config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let quiz_routes = Router::new()
        .route(
            "/{quiz_id}/attempts",
            post(attempt::start_attempt).get(attempt::list_attempts),
        )
        .route(
            "/{quiz_id}/attempts/{attempt_number}",
            get(attempt::get_attempt).delete(attempt::abandon_attempt),
        )
        .route(
            "/{quiz_id}/attempts/{attempt_number}/answers/{question_id}",
            put(attempt::record_answer),
        )
        .route(
            "/{quiz_id}/attempts/{attempt_number}/submit",
            post(attempt::submit_attempt),
        );

    let course_routes =
        Router::new().route("/{course_id}/progress", get(progress::get_course_progress));

    Router::new()
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/courses", course_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
