//! # API REST
//!
//! REST API for the lab sample workflow.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - mapping workflow errors to status codes
//!
//! The router is served by the workspace's `lab-run` binary.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use lab_core::WorkflowService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::dto::*;
use crate::handlers::*;

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: WorkflowService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_samples,
        create_sample,
        get_sample,
        delete_sample,
        advance_sample,
        sample_completion,
        create_process,
        get_process,
        update_process,
        advance_process,
        order_sample_state,
        delete_order_samples,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        CreateSampleReq,
        SampleRes,
        ListSamplesRes,
        ProcessSummaryRes,
        SampleOverviewRes,
        CompletionRes,
        DeleteSampleRes,
        DeleteOrderSamplesRes,
        OrderSampleStateRes,
        CreateProcessReq,
        ProcessFieldsReq,
        ProcessActionReq,
        ProcessRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router, including the Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/samples", get(list_samples).post(create_sample))
        .route("/samples/:id", get(get_sample).delete(delete_sample))
        .route("/samples/:id/actions/:action", post(advance_sample))
        .route("/samples/:id/completion", get(sample_completion))
        .route("/samples/:id/processes", post(create_process))
        .route("/processes/:kind/:id", get(get_process).patch(update_process))
        .route("/processes/:kind/:id/actions/:action", post(advance_process))
        .route("/orders/:order/sample-state", get(order_sample_state))
        .route("/orders/:order/samples", axum::routing::delete(delete_order_samples))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
