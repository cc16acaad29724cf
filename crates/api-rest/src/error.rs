//! Mapping from workflow errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use lab_core::WorkflowError;

use crate::dto::ErrorRes;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError(pub WorkflowError);

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        ApiError(e)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_for(e: &WorkflowError) -> StatusCode {
    match e {
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::DuplicateWorkflow { .. } | WorkflowError::ProcessAlreadyActive { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::InvalidStateTransition { .. }
        | WorkflowError::InvalidSampleState { .. }
        | WorkflowError::MissingRequiredField { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WorkflowError::VariantDisabled(_) => StatusCode::FORBIDDEN,
        WorkflowError::FileRead(_)
        | WorkflowError::FileWrite(_)
        | WorkflowError::Serialization(_)
        | WorkflowError::Deserialization(_)
        | WorkflowError::YamlDeserialization(_)
        | WorkflowError::StorePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self.0);
        } else {
            tracing::warn!("request rejected ({}): {}", status, self.0);
        }
        (
            status,
            Json(ErrorRes {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
