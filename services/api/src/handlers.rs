//! Axum Handlers for the REST API
//!
//! Read-only access to the flattened course, documented with `utoipa`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::{
    models::{ErrorResponse, StepCatalog, StepView},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// List every step of the course in learning order.
#[utoipa::path(
    get,
    path = "/steps",
    responses(
        (status = 200, description = "Flattened course steps", body = StepCatalog)
    )
)]
pub async fn list_steps(State(state): State<Arc<AppState>>) -> Json<StepCatalog> {
    Json(StepCatalog {
        title: state.outline.title.clone(),
        total_steps: state.steps.len(),
        steps: state.steps.iter().map(StepView::from).collect(),
    })
}

/// Get one step by its 1-based global index.
#[utoipa::path(
    get,
    path = "/steps/{index}",
    responses(
        (status = 200, description = "Step details", body = StepView),
        (status = 404, description = "No step at this index", body = ErrorResponse)
    ),
    params(
        ("index" = usize, Path, description = "1-based global step index")
    )
)]
pub async fn get_step(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<StepView>, ApiError> {
    let step = state.steps.get(index).ok_or_else(|| {
        ApiError::NotFound(format!(
            "Step {} not found (course has {} steps)",
            index,
            state.steps.len()
        ))
    })?;
    Ok(Json(StepView::from(step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        testing::{FakeTransport, sample_outline},
    };
    use std::{path::PathBuf, time::Duration};
    use tracing::Level;

    fn app_state() -> Arc<AppState> {
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: "test".into(),
            gemini_model: gemini_realtime::DEFAULT_MODEL.into(),
            gemini_endpoint: gemini_realtime::DEFAULT_ENDPOINT.into(),
            gemini_voice: None,
            outline_path: None,
            prompts_path: PathBuf::from("./prompts"),
            default_learner_name: "Student".into(),
            rebind_delay: Duration::from_millis(800),
            log_level: Level::INFO,
        };
        Arc::new(AppState::new(
            config,
            sample_outline(),
            Arc::new(FakeTransport::default()),
            String::new(),
        ))
    }

    #[tokio::test]
    async fn test_list_steps() {
        let Json(catalog) = list_steps(State(app_state())).await;
        assert_eq!(catalog.title, "Lash Lift");
        assert_eq!(catalog.total_steps, 8);
        assert_eq!(catalog.steps[0].global_index, 1);
        assert!(catalog.steps[7].is_last);
    }

    #[tokio::test]
    async fn test_get_step() {
        let Json(step) = get_step(State(app_state()), Path(6)).await.ok().unwrap();
        assert_eq!(step.id, "2.1.b");
        assert_eq!(step.section_label, "Section 2");
    }

    #[tokio::test]
    async fn test_get_missing_step_is_not_found() {
        for index in [0, 9] {
            let response = get_step(State(app_state()), Path(index))
                .await
                .err()
                .unwrap()
                .into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
