//! Request handlers.
//!
//! Handlers parse path segments and bodies into core types, call the workflow service and map
//! its result into the response DTOs. Core calls are synchronous and short; they run on the
//! request task.

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
};
use lab_core::{
    ExternalRef, ProcessCommand, ProcessDraft, ProcessKind, ProcessPatch, RecordId, SampleAction,
    SampleType, WorkflowError,
};

use crate::dto::*;
use crate::error::ApiResult;
use crate::AppState;

fn parse_id(raw: &str) -> ApiResult<RecordId> {
    Ok(RecordId::parse(raw).map_err(WorkflowError::from)?)
}

fn parse_order(raw: &str) -> ApiResult<ExternalRef> {
    Ok(ExternalRef::new(raw).map_err(WorkflowError::from)?)
}

fn parse_kind(raw: &str) -> ApiResult<ProcessKind> {
    Ok(raw.parse::<ProcessKind>()?)
}

/// Empty bodies are allowed where the payload is optional.
fn optional_json<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)
        .map_err(|e| WorkflowError::InvalidInput(format!("malformed request body: {e}")))?)
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthRes))
)]
pub async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Lab workflow REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/samples",
    responses((status = 200, body = ListSamplesRes), (status = 500, body = ErrorRes))
)]
#[axum::debug_handler]
pub async fn list_samples(State(state): State<AppState>) -> ApiResult<Json<ListSamplesRes>> {
    let samples = state.service.list_samples()?;
    Ok(Json(ListSamplesRes {
        samples: samples.iter().map(SampleRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/samples",
    request_body = CreateSampleReq,
    responses(
        (status = 201, body = SampleRes),
        (status = 400, body = ErrorRes),
        (status = 404, description = "Order not found", body = ErrorRes),
        (status = 409, description = "Order already has a sample", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn create_sample(
    State(state): State<AppState>,
    Json(req): Json<CreateSampleReq>,
) -> ApiResult<(StatusCode, Json<SampleRes>)> {
    let order = parse_order(&req.order)?;
    let sample_type = match req.sample_type.as_deref() {
        Some(code) => code.parse::<SampleType>()?,
        None => SampleType::default(),
    };
    let origin = req
        .origin_institution
        .as_deref()
        .map(parse_order)
        .transpose()?;

    let sample = state
        .service
        .create_sample(&order, sample_type, origin, req.notes)?;
    Ok((StatusCode::CREATED, Json(SampleRes::from(&sample))))
}

#[utoipa::path(
    get,
    path = "/samples/{id}",
    params(("id" = String, Path, description = "Sample id")),
    responses((status = 200, body = SampleOverviewRes), (status = 404, body = ErrorRes))
)]
#[axum::debug_handler]
pub async fn get_sample(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<SampleOverviewRes>> {
    let overview = state.service.sample_overview(parse_id(&id)?)?;
    Ok(Json(SampleOverviewRes::from(&overview)))
}

#[utoipa::path(
    delete,
    path = "/samples/{id}",
    params(("id" = String, Path, description = "Sample id")),
    responses((status = 200, body = DeleteSampleRes), (status = 404, body = ErrorRes))
)]
#[axum::debug_handler]
pub async fn delete_sample(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<DeleteSampleRes>> {
    let processes_removed = state.service.delete_sample(parse_id(&id)?)?;
    Ok(Json(DeleteSampleRes { processes_removed }))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/actions/{action}",
    params(
        ("id" = String, Path, description = "Sample id"),
        ("action" = String, Path, description = "collect, dispatch, receive, process, complete, auto_complete or reject")
    ),
    responses(
        (status = 200, body = SampleRes),
        (status = 404, body = ErrorRes),
        (status = 422, description = "Action not allowed in the current state", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn advance_sample(
    State(state): State<AppState>,
    AxumPath((id, action)): AxumPath<(String, String)>,
) -> ApiResult<Json<SampleRes>> {
    let action = action.parse::<SampleAction>()?;
    let sample = state.service.advance_sample(parse_id(&id)?, action)?;
    Ok(Json(SampleRes::from(&sample)))
}

#[utoipa::path(
    get,
    path = "/samples/{id}/completion",
    params(("id" = String, Path, description = "Sample id")),
    responses((status = 200, body = CompletionRes), (status = 404, body = ErrorRes))
)]
#[axum::debug_handler]
pub async fn sample_completion(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<CompletionRes>> {
    let sample_id = parse_id(&id)?;
    let all_processes_completed = state.service.query_completion(sample_id)?;
    Ok(Json(CompletionRes {
        sample_id: sample_id.to_string(),
        all_processes_completed,
    }))
}

#[utoipa::path(
    post,
    path = "/samples/{id}/processes",
    params(("id" = String, Path, description = "Sample id")),
    request_body = CreateProcessReq,
    responses(
        (status = 201, body = ProcessSummaryRes),
        (status = 403, description = "Process kind not enabled", body = ErrorRes),
        (status = 409, description = "A process of the kind is already active", body = ErrorRes),
        (status = 422, description = "Sample does not accept processes", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn create_process(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<CreateProcessReq>,
) -> ApiResult<(StatusCode, Json<ProcessSummaryRes>)> {
    let sample_id = parse_id(&id)?;
    let draft = ProcessDraft::from_json(parse_kind(&req.kind)?, req.fields)?;
    let summary = state.service.create_process(sample_id, draft)?;
    Ok((StatusCode::CREATED, Json(ProcessSummaryRes::from(&summary))))
}

#[utoipa::path(
    get,
    path = "/processes/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "molecular, histopathology or immunoassay"),
        ("id" = String, Path, description = "Process id")
    ),
    responses((status = 200, body = ProcessRes), (status = 404, body = ErrorRes))
)]
#[axum::debug_handler]
pub async fn get_process(
    State(state): State<AppState>,
    AxumPath((kind, id)): AxumPath<(String, String)>,
) -> ApiResult<Json<ProcessRes>> {
    let record = state
        .service
        .get_process(parse_kind(&kind)?, parse_id(&id)?)?;
    Ok(Json(ProcessRes::from_record(&record)?))
}

#[utoipa::path(
    patch,
    path = "/processes/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "molecular, histopathology or immunoassay"),
        ("id" = String, Path, description = "Process id")
    ),
    request_body = ProcessFieldsReq,
    responses(
        (status = 200, body = ProcessRes),
        (status = 422, description = "Process is closed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_process(
    State(state): State<AppState>,
    AxumPath((kind, id)): AxumPath<(String, String)>,
    Json(ProcessFieldsReq(patch)): Json<ProcessFieldsReq>,
) -> ApiResult<Json<ProcessRes>> {
    let patch = ProcessPatch::from_json(parse_kind(&kind)?, patch)?;
    let record = state.service.update_process(parse_id(&id)?, patch)?;
    Ok(Json(ProcessRes::from_record(&record)?))
}

#[utoipa::path(
    post,
    path = "/processes/{kind}/{id}/actions/{action}",
    params(
        ("kind" = String, Path, description = "molecular, histopathology or immunoassay"),
        ("id" = String, Path, description = "Process id"),
        ("action" = String, Path, description = "Action code of the process kind")
    ),
    request_body(content = ProcessActionReq, description = "Optional; an empty body applies no patch"),
    responses(
        (status = 200, body = ProcessRes),
        (status = 422, description = "Action not allowed or a required field is missing", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn advance_process(
    State(state): State<AppState>,
    AxumPath((kind, id, action)): AxumPath<(String, String, String)>,
    body: Bytes,
) -> ApiResult<Json<ProcessRes>> {
    let req: ProcessActionReq = optional_json(&body)?;
    let command = ProcessCommand::parse(parse_kind(&kind)?, &action, req.patch)?;
    let record = state.service.advance(parse_id(&id)?, command)?;
    Ok(Json(ProcessRes::from_record(&record)?))
}

#[utoipa::path(
    get,
    path = "/orders/{order}/sample-state",
    params(("order" = String, Path, description = "Lab test order reference")),
    responses((status = 200, body = OrderSampleStateRes))
)]
#[axum::debug_handler]
pub async fn order_sample_state(
    State(state): State<AppState>,
    AxumPath(order): AxumPath<String>,
) -> ApiResult<Json<OrderSampleStateRes>> {
    let order_ref = parse_order(&order)?;
    let sample_state = state.service.order_sample_state(&order_ref)?;
    Ok(Json(OrderSampleStateRes::new(order, sample_state)))
}

#[utoipa::path(
    delete,
    path = "/orders/{order}/samples",
    params(("order" = String, Path, description = "Lab test order reference")),
    responses((status = 200, body = DeleteOrderSamplesRes))
)]
#[axum::debug_handler]
pub async fn delete_order_samples(
    State(state): State<AppState>,
    AxumPath(order): AxumPath<String>,
) -> ApiResult<Json<DeleteOrderSamplesRes>> {
    let samples_removed = state
        .service
        .delete_samples_for_order(&parse_order(&order)?)?;
    Ok(Json(DeleteOrderSamplesRes { samples_removed }))
}
