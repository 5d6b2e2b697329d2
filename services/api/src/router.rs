//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST catalog, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, QuestionView, StepCatalog, StepView},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_steps,
        handlers::get_step,
    ),
    components(
        schemas(StepCatalog, StepView, QuestionView, ErrorResponse)
    ),
    tags(
        (name = "Tutor API", description = "Course catalog for the voice tutoring service")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/steps", get(handlers::list_steps))
        .route("/steps/{index}", get(handlers::get_step))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
