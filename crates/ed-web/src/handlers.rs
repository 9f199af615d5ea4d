//! HTTP处理器
//!
//! 每个处理器提取操作人、校验角色，然后调用一次引擎操作。

use crate::actor::{ActorContext, CLINICIANS};
use crate::error::ApiResult;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use ed_admin::EdMetrics;
use ed_core::{
    ClinicalStore, DispenseStatus, EdError, NewMedication, NewPatient, OrderInstructions,
    OrderStatus, RecordFields, RecordKind, Role, TriageLocation, TriageState, VisitOutcome,
};
use ed_workflow::{ClosureReport, DiagnosisInput, DispenseInput, TriageInput};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

const TRIAGE_STAFF: &[Role] = &[Role::Nurse, Role::Resident, Role::Specialist];
const NURSES: &[Role] = &[Role::Nurse];
const PHARMACY: &[Role] = &[Role::Pharmacy];

fn observe_closure(metrics: &EdMetrics, closure: &ClosureReport) {
    metrics.visit_closed(
        closure.outcome,
        closure.cancelled_orders.len(),
        closure.reversals.len(),
    );
}

// ========== 请求体 ==========

#[derive(Debug, Deserialize)]
pub struct CloseVisitRequest {
    pub outcome: VisitOutcome,
}

#[derive(Debug, Deserialize)]
pub struct EditOrderRequest {
    #[serde(flatten)]
    pub instructions: OrderInstructions,
    pub medication_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderOutcomeRequest {
    pub status: OrderStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DispenseStatusRequest {
    pub status: DispenseStatus,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub quantity: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AttendRequest {
    pub location: Option<TriageLocation>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub outcome: VisitOutcome,
}

#[derive(Debug, Deserialize)]
pub struct TriageStateRequest {
    pub state: TriageState,
    pub location: Option<TriageLocation>,
}

// ========== 服务信息 ==========

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "ED Visit API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "metrics": "/metrics",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器；存储不可用时返回 503
pub async fn health<S: ClinicalStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let (status, health) = match state.engine.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        status,
        Json(json!({
            "status": health,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

pub async fn metrics<S: ClinicalStore>(State(state): State<AppState<S>>) -> ApiResult<Response> {
    let text = state
        .metrics
        .render()
        .map_err(|e| EdError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}

// ========== 患者与档案 ==========

pub async fn register_patient<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Json(patient): Json<NewPatient>,
) -> ApiResult<impl IntoResponse> {
    ctx.require(TRIAGE_STAFF)?;
    let patient = state.engine.register_patient(patient).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.engine.patient(&patient_id).await?;
    let age = patient.age_on(chrono::Utc::now().date_naive());
    Ok(Json(json!({ "patient": patient, "age": age })))
}

pub async fn history<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.history(&patient_id).await?))
}

pub async fn resolve_folder<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(TRIAGE_STAFF)?;
    Ok(Json(state.engine.resolve_folder(&patient_id, actor).await?))
}

/// 写入任意类型的子记录；诊断走完整的诊断流程
pub async fn upsert_record<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path((patient_id, slug)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let actor = ctx.require(CLINICIANS)?;
    let kind = RecordKind::from_slug(&slug)
        .ok_or_else(|| EdError::Validation(format!("unknown record kind: {}", slug)))?;
    let fields = RecordFields::from_value(kind, body)?;

    if let RecordFields::Diagnosis(diagnosis) = fields {
        let input = DiagnosisInput {
            diagnosis,
            ..Default::default()
        };
        let outcome = state.engine.record_diagnosis(&patient_id, input, actor).await?;
        if let Some(closure) = &outcome.closure {
            observe_closure(&state.metrics, closure);
        }
        return Ok(Json(outcome).into_response());
    }

    let record = state.engine.record_clinical(&patient_id, fields, actor).await?;
    Ok(Json(record).into_response())
}

pub async fn record_diagnosis<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(patient_id): Path<String>,
    Json(input): Json<DiagnosisInput>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(CLINICIANS)?;
    let outcome = state.engine.record_diagnosis(&patient_id, input, actor).await?;
    if let Some(closure) = &outcome.closure {
        observe_closure(&state.metrics, closure);
    }
    Ok(Json(outcome))
}

pub async fn close_visit<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(folder_id): Path<i64>,
    Json(request): Json<CloseVisitRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(CLINICIANS)?;
    let report = state
        .engine
        .close_visit(folder_id, request.outcome, actor)
        .await?;
    observe_closure(&state.metrics, &report);
    Ok(Json(report))
}

// ========== 医嘱 ==========

pub async fn pending_orders<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
) -> ApiResult<impl IntoResponse> {
    let orders = state.engine.pending_orders().await?;
    Ok(Json(json!({ "orders": orders, "total": orders.len() })))
}

pub async fn edit_order<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(order_id): Path<i64>,
    Json(request): Json<EditOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    ctx.require(CLINICIANS)?;
    let order = state
        .engine
        .edit_order(order_id, request.instructions, request.medication_id)
        .await?;
    Ok(Json(order))
}

pub async fn record_order_outcome<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(order_id): Path<i64>,
    Json(request): Json<OrderOutcomeRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(NURSES)?;
    let outcome = state
        .engine
        .record_order_outcome(order_id, request.status, request.notes.as_deref(), actor)
        .await?;
    state.metrics.stock_reverted(outcome.reversals.len());
    Ok(Json(outcome))
}

pub async fn authorized_medication<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    ctx.require(NURSES)?;
    let authorized = state
        .engine
        .authorized_medication(&patient_id)
        .await?
        .ok_or_else(|| EdError::not_found("authorized medication for patient", &patient_id))?;
    Ok(Json(authorized))
}

// ========== 发药 ==========

pub async fn request_dispense<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Json(input): Json<DispenseInput>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(NURSES)?;
    let receipt = state.engine.request_dispense(&input, actor).await?;
    state.metrics.dispense_requested();
    info!(request_id = receipt.request.id, "Dispense request accepted");
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn open_dispenses<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
) -> ApiResult<impl IntoResponse> {
    let requests = state.engine.open_dispenses().await?;
    Ok(Json(json!({ "requests": requests, "total": requests.len() })))
}

pub async fn advance_dispense<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(request_id): Path<i64>,
    Json(request): Json<DispenseStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    ctx.require(PHARMACY)?;
    Ok(Json(
        state
            .engine
            .advance_dispense(request_id, request.status)
            .await?,
    ))
}

// ========== 药品与库存 ==========

pub async fn search_medications<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
    Query(params): Query<SearchParams>,
) -> ApiResult<impl IntoResponse> {
    let medications = state.engine.search_medications(params.q.as_deref()).await?;
    Ok(Json(json!({ "medications": medications, "total": medications.len() })))
}

pub async fn register_medication<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Json(medication): Json<NewMedication>,
) -> ApiResult<impl IntoResponse> {
    ctx.require(PHARMACY)?;
    let medication = state.engine.register_medication(medication).await?;
    Ok((StatusCode::CREATED, Json(medication)))
}

pub async fn low_stock<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.low_stock().await?))
}

pub async fn stock_in<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(medication_id): Path<i64>,
    Json(request): Json<StockRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(PHARMACY)?;
    let change = state
        .engine
        .stock_in(medication_id, request.quantity, request.reason.as_deref(), actor)
        .await?;
    Ok(Json(change))
}

pub async fn stock_out<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(medication_id): Path<i64>,
    Json(request): Json<StockRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(PHARMACY)?;
    let change = state
        .engine
        .stock_out(medication_id, request.quantity, request.reason.as_deref(), actor)
        .await?;
    Ok(Json(change))
}

pub async fn movements<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
    Path(medication_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.movements(medication_id).await?))
}

// ========== 分诊 ==========

pub async fn register_triage<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(patient_id): Path<String>,
    Json(input): Json<TriageInput>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(TRIAGE_STAFF)?;
    let triage = state.engine.register_triage(&patient_id, &input, actor).await?;
    Ok((StatusCode::CREATED, Json(triage)))
}

pub async fn latest_triage<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let triage = state
        .engine
        .latest_triage(&patient_id)
        .await?
        .ok_or_else(|| EdError::not_found("triage for patient", &patient_id))?;
    Ok(Json(triage))
}

pub async fn active_triages<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.active_triages().await?))
}

pub async fn transferred_triages<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    _ctx: ActorContext,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.transferred_triages().await?))
}

pub async fn attend_triage<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(triage_id): Path<i64>,
    request: Option<Json<AttendRequest>>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(CLINICIANS)?;
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let update = state
        .engine
        .attend_triage(triage_id, request.location, actor)
        .await?;
    Ok(Json(update))
}

pub async fn finalize_triage<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(triage_id): Path<i64>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(CLINICIANS)?;
    let update = state
        .engine
        .finalize_triage(triage_id, request.outcome, actor)
        .await?;
    if let Some(closure) = &update.closure {
        observe_closure(&state.metrics, closure);
    }
    Ok(Json(update))
}

pub async fn set_triage_state<S: ClinicalStore>(
    State(state): State<AppState<S>>,
    ctx: ActorContext,
    Path(triage_id): Path<i64>,
    Json(request): Json<TriageStateRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = ctx.require(CLINICIANS)?;
    let update = state
        .engine
        .set_triage_state(triage_id, request.state, request.location, actor)
        .await?;
    if let Some(closure) = &update.closure {
        observe_closure(&state.metrics, closure);
    }
    Ok(Json(update))
}
