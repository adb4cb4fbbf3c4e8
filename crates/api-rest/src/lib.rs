//! # API REST
//!
//! REST API implementation for the triage service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation (served as JSON at `/api-docs/openapi.json`)
//! - REST-specific concerns (JSON serialization, CORS, API key gate, caller headers)
//!
//! Uses `api-shared` for wire types and `triage-core` for every operation.

#![warn(rust_2018_idioms)]

mod error;

pub use error::ApiError;

use api_shared::auth::{validate_api_key, API_KEY_HEADER, CALLER_ID_HEADER, REQUEST_ID_HEADER};
use api_shared::convert::{parse_completion, parse_date, parse_enum, parse_id};
use api_shared::*;
use axum::{
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use triage_core::{
    AssessmentUpdate, NewAssessment, NewProtocol, NewReassessment, ProtocolUpdate, RequestContext,
    TimeWindow, TriageResult, TriageService,
};
use utoipa::OpenApi;
use uuid::Uuid;

/// Application state for the REST API server.
#[derive(Clone)]
pub struct AppState {
    service: TriageService,
    api_key: Option<Arc<str>>,
}

impl AppState {
    /// `api_key` of `None` disables the API key gate.
    pub fn new(service: TriageService, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key.map(Arc::from),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_assessment,
        list_open_assessments,
        get_assessment,
        update_assessment,
        complete_assessment,
        cancel_assessment,
        create_reassessment,
        list_reassessments,
        suggest_protocols,
        apply_protocol,
        list_protocol_applications,
        call_next,
        get_waiting,
        get_queue_stats,
        reorder_queue,
        complete_queue_entry,
        create_protocol,
        list_protocols,
        get_protocol,
        update_protocol,
        deactivate_protocol,
        get_daily_stats,
        get_system_health,
        scan_overdue,
        list_active_alerts,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        VitalSignsDto,
        VitalsEvaluationDto,
        RedFlagsDto,
        CreateAssessmentReq,
        CompleteAssessmentReq,
        CancelAssessmentReq,
        UpdateAssessmentReq,
        AssessmentRes,
        ListAssessmentsRes,
        CreateReassessmentReq,
        ReassessmentRes,
        ListReassessmentsRes,
        QueueEntryRes,
        WaitingPatientRes,
        WaitingListRes,
        QueueStatsRes,
        QueueOrderRes,
        CreateProtocolReq,
        UpdateProtocolReq,
        ProtocolRes,
        ListProtocolsRes,
        ProtocolSuggestionRes,
        SuggestProtocolsRes,
        ApplyProtocolReq,
        ProtocolApplicationRes,
        ListProtocolApplicationsRes,
        LevelCountDto,
        StatusCountDto,
        DailyStatsRes,
        SystemHealthRes,
        OverdueEntryRes,
        OverdueListRes,
        ActiveAlertRes,
        ActiveAlertsRes,
    ))
)]
pub struct ApiDoc;

/// Build the REST router.
///
/// `/health` and `/api-docs/openapi.json` are open; every other route sits behind the API key
/// gate when a key is configured.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/assessments",
            post(create_assessment).get(list_open_assessments),
        )
        .route(
            "/assessments/:id",
            get(get_assessment).put(update_assessment),
        )
        .route("/assessments/:id/complete", post(complete_assessment))
        .route("/assessments/:id/cancel", post(cancel_assessment))
        .route(
            "/assessments/:id/reassessments",
            post(create_reassessment).get(list_reassessments),
        )
        .route(
            "/assessments/:id/protocols",
            post(apply_protocol).get(list_protocol_applications),
        )
        .route(
            "/assessments/:id/protocols/suggestions",
            get(suggest_protocols),
        )
        .route("/departments/:id/queue", get(get_waiting))
        .route("/departments/:id/queue/call-next", post(call_next))
        .route("/departments/:id/queue/stats", get(get_queue_stats))
        .route("/departments/:id/queue/reorder", post(reorder_queue))
        .route("/queue/:id/complete", post(complete_queue_entry))
        .route("/protocols", post(create_protocol).get(list_protocols))
        .route("/protocols/:id", get(get_protocol).put(update_protocol))
        .route("/protocols/:id/deactivate", post(deactivate_protocol))
        .route("/stats/daily", get(get_daily_stats))
        .route("/stats/health", get(get_system_health))
        .route("/stats/overdue", get(scan_overdue))
        .route("/stats/alerts", get(list_active_alerts))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    validate_api_key(provided, state.api_key.as_deref())?;
    Ok(next.run(request).await)
}

/// Request context built from the `x-caller-id` and `x-request-id` headers.
pub struct Caller(pub RequestContext);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller_id = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request(format!("missing {CALLER_ID_HEADER} header")))?;

        let request_id = match parts.headers.get(REQUEST_ID_HEADER) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| {
                    ApiError::bad_request(format!("{REQUEST_ID_HEADER} must be a UUID"))
                })?,
            None => Uuid::new_v4(),
        };

        Ok(Caller(RequestContext::with_request_id(caller_id, request_id)?))
    }
}

#[derive(Debug, Deserialize)]
pub struct DepartmentFilter {
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub protocol_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailyStatsQuery {
    pub date: Option<String>,
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProtocolListQuery {
    #[serde(default)]
    pub active_only: bool,
}

fn parse_department_filter(
    filter: &DepartmentFilter,
) -> Result<Option<triage_core::RecordId>, ApiError> {
    Ok(filter
        .department_id
        .as_deref()
        .map(|id| parse_id("department_id", id))
        .transpose()?)
}

/// Run a core operation on the blocking pool so journal I/O never stalls the async workers.
async fn run_blocking<T, F>(service: &TriageService, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(TriageService) -> TriageResult<T> + Send + 'static,
{
    let service = service.clone();
    let result = tokio::task::spawn_blocking(move || op(service))
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?;
    Ok(result?)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Liveness endpoint for monitoring and load balancers.
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/assessments",
    request_body = CreateAssessmentReq,
    responses(
        (status = 201, description = "Assessment created and enqueued", body = AssessmentRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 500, description = "Storage failure", body = ErrorRes)
    )
)]
/// Record a new arrival.
///
/// Validates the vitals, evaluates them for immediate attention and places the patient in
/// the department's waiting queue.
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - an identifier, level or enumeration is malformed,
/// - the chief complaint is blank, or
/// - any vital sign is outside physiologic bounds.
async fn create_assessment(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<CreateAssessmentReq>,
) -> Result<(StatusCode, Json<AssessmentRes>), ApiError> {
    let new = NewAssessment::try_from(req)?;
    let assessment = run_blocking(&state.service, move |s| s.lifecycle().create(&ctx, new)).await?;
    Ok((StatusCode::CREATED, Json((&assessment).into())))
}

#[utoipa::path(
    get,
    path = "/assessments",
    params(("department_id" = Option<String>, Query, description = "Limit to one department")),
    responses(
        (status = 200, description = "Open assessments, oldest first", body = ListAssessmentsRes)
    )
)]
/// List open assessments.
async fn list_open_assessments(
    State(state): State<AppState>,
    Query(filter): Query<DepartmentFilter>,
) -> Result<Json<ListAssessmentsRes>, ApiError> {
    let department_id = parse_department_filter(&filter)?;
    let assessments =
        run_blocking(&state.service, move |s| s.lifecycle().list_open(department_id)).await?;
    Ok(Json(ListAssessmentsRes {
        assessments: assessments.iter().map(AssessmentRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/assessments/{id}",
    params(("id" = String, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Assessment", body = AssessmentRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes)
    )
)]
async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssessmentRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let assessment = run_blocking(&state.service, move |s| s.lifecycle().get(id)).await?;
    Ok(Json((&assessment).into()))
}

#[utoipa::path(
    put,
    path = "/assessments/{id}",
    params(("id" = String, Path, description = "Assessment id")),
    request_body = UpdateAssessmentReq,
    responses(
        (status = 200, description = "Updated assessment", body = AssessmentRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes),
        (status = 409, description = "Closed assessment or stale version", body = ErrorRes)
    )
)]
/// Administrative correction of level, priority or notes.
///
/// Does not append a reassessment. Supply `expected_version` to reject the write if someone
/// else changed the assessment first.
async fn update_assessment(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateAssessmentReq>,
) -> Result<Json<AssessmentRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let update = AssessmentUpdate::try_from(req)?;
    let assessment =
        run_blocking(&state.service, move |s| s.lifecycle().update(&ctx, id, update)).await?;
    Ok(Json((&assessment).into()))
}

#[utoipa::path(
    post,
    path = "/assessments/{id}/complete",
    params(("id" = String, Path, description = "Assessment id")),
    request_body = CompleteAssessmentReq,
    responses(
        (status = 200, description = "Completed assessment", body = AssessmentRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes),
        (status = 409, description = "Already closed", body = ErrorRes)
    )
)]
/// Complete an open assessment and close its queue entry.
///
/// Not idempotent: completing twice returns `409 Conflict` and leaves the first end time.
async fn complete_assessment(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<CompleteAssessmentReq>,
) -> Result<Json<AssessmentRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let (department, doctor) = parse_completion(&req)?;
    let assessment = run_blocking(&state.service, move |s| {
        s.lifecycle().complete(&ctx, id, department, doctor)
    })
    .await?;
    Ok(Json((&assessment).into()))
}

#[utoipa::path(
    post,
    path = "/assessments/{id}/cancel",
    params(("id" = String, Path, description = "Assessment id")),
    request_body = CancelAssessmentReq,
    responses(
        (status = 200, description = "Cancelled assessment", body = AssessmentRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes),
        (status = 409, description = "Already closed", body = ErrorRes)
    )
)]
async fn cancel_assessment(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<CancelAssessmentReq>,
) -> Result<Json<AssessmentRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let assessment =
        run_blocking(&state.service, move |s| s.lifecycle().cancel(&ctx, id, &req.reason)).await?;
    Ok(Json((&assessment).into()))
}

#[utoipa::path(
    post,
    path = "/assessments/{id}/reassessments",
    params(("id" = String, Path, description = "Assessment id")),
    request_body = CreateReassessmentReq,
    responses(
        (status = 201, description = "Reassessment recorded", body = ReassessmentRes),
        (status = 400, description = "Invalid input", body = ErrorRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes),
        (status = 409, description = "Assessment closed", body = ErrorRes)
    )
)]
/// Append a reassessment, optionally changing the level.
async fn create_reassessment(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<CreateReassessmentReq>,
) -> Result<(StatusCode, Json<ReassessmentRes>), ApiError> {
    let id = parse_id("id", &id)?;
    let input = NewReassessment::try_from(req)?;
    let row =
        run_blocking(&state.service, move |s| s.reassessments().create(&ctx, id, input)).await?;
    Ok((StatusCode::CREATED, Json((&row).into())))
}

#[utoipa::path(
    get,
    path = "/assessments/{id}/reassessments",
    params(("id" = String, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Reassessments, oldest first", body = ListReassessmentsRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes)
    )
)]
async fn list_reassessments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListReassessmentsRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let rows = run_blocking(&state.service, move |s| s.reassessments().list(id)).await?;
    Ok(Json(ListReassessmentsRes {
        reassessments: rows.iter().map(ReassessmentRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/assessments/{id}/protocols/suggestions",
    params(
        ("id" = String, Path, description = "Assessment id"),
        ("protocol_type" = Option<String>, Query, description = "Only protocols of this type")
    ),
    responses(
        (status = 200, description = "Ranked suggestions", body = SuggestProtocolsRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes)
    )
)]
async fn suggest_protocols(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<SuggestProtocolsRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let protocol_type = query
        .protocol_type
        .as_deref()
        .map(|t| parse_enum("protocol_type", t))
        .transpose()?;
    let suggestions =
        run_blocking(&state.service, move |s| s.protocols().suggest(id, protocol_type)).await?;
    Ok(Json(SuggestProtocolsRes {
        assessment_id: id.to_string(),
        suggestions: suggestions.iter().map(ProtocolSuggestionRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/assessments/{id}/protocols",
    params(("id" = String, Path, description = "Assessment id")),
    request_body = ApplyProtocolReq,
    responses(
        (status = 201, description = "Application recorded", body = ProtocolApplicationRes),
        (status = 404, description = "Unknown assessment or protocol", body = ErrorRes),
        (status = 409, description = "Protocol inactive or assessment closed", body = ErrorRes)
    )
)]
async fn apply_protocol(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<ApplyProtocolReq>,
) -> Result<(StatusCode, Json<ProtocolApplicationRes>), ApiError> {
    let id = parse_id("id", &id)?;
    let protocol_id = parse_id("protocol_id", &req.protocol_id)?;
    let application =
        run_blocking(&state.service, move |s| s.protocols().apply(&ctx, id, protocol_id)).await?;
    Ok((StatusCode::CREATED, Json((&application).into())))
}

#[utoipa::path(
    get,
    path = "/assessments/{id}/protocols",
    params(("id" = String, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Applied protocols", body = ListProtocolApplicationsRes),
        (status = 404, description = "Unknown assessment", body = ErrorRes)
    )
)]
async fn list_protocol_applications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListProtocolApplicationsRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let applications =
        run_blocking(&state.service, move |s| s.protocols().list_applications(id)).await?;
    Ok(Json(ListProtocolApplicationsRes {
        applications: applications
            .iter()
            .map(ProtocolApplicationRes::from)
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/departments/{id}/queue/call-next",
    params(("id" = String, Path, description = "Department id")),
    responses(
        (status = 200, description = "Claimed queue entry", body = QueueEntryRes),
        (status = 404, description = "Nothing waiting", body = ErrorRes)
    )
)]
/// Claim the most urgent waiting patient of a department.
///
/// Each waiting entry is handed out at most once, however many dispatchers call concurrently.
///
/// # Errors
/// Returns `404 Not Found` with kind `empty_queue` when nobody is waiting.
async fn call_next(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<QueueEntryRes>, ApiError> {
    let department_id = parse_id("id", &id)?;
    let entry =
        run_blocking(&state.service, move |s| s.queue().call_next(&ctx, department_id)).await?;
    Ok(Json((&entry).into()))
}

#[utoipa::path(
    get,
    path = "/departments/{id}/queue",
    params(("id" = String, Path, description = "Department id")),
    responses(
        (status = 200, description = "Waiting patients in dispatch order", body = WaitingListRes)
    )
)]
async fn get_waiting(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WaitingListRes>, ApiError> {
    let department_id = parse_id("id", &id)?;
    let waiting = run_blocking(&state.service, move |s| s.queue().waiting(department_id)).await?;
    Ok(Json(WaitingListRes {
        department_id: department_id.to_string(),
        waiting: waiting.iter().map(WaitingPatientRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/departments/{id}/queue/stats",
    params(
        ("id" = String, Path, description = "Department id"),
        ("date" = Option<String>, Query, description = "UTC day (YYYY-MM-DD); defaults to today")
    ),
    responses(
        (status = 200, description = "Queue counters", body = QueueStatsRes)
    )
)]
async fn get_queue_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<QueueStatsRes>, ApiError> {
    let department_id = parse_id("id", &id)?;
    let window = query
        .date
        .as_deref()
        .map(|d| parse_date("date", d).map(TimeWindow::day))
        .transpose()?;
    let stats =
        run_blocking(&state.service, move |s| s.queue().stats(department_id, window)).await?;
    Ok(Json((&stats).into()))
}

#[utoipa::path(
    post,
    path = "/departments/{id}/queue/reorder",
    params(("id" = String, Path, description = "Department id")),
    responses(
        (status = 200, description = "Refreshed dispatch order", body = QueueOrderRes)
    )
)]
async fn reorder_queue(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<QueueOrderRes>, ApiError> {
    let department_id = parse_id("id", &id)?;
    let entries =
        run_blocking(&state.service, move |s| s.queue().reorder(&ctx, department_id)).await?;
    Ok(Json(QueueOrderRes {
        department_id: department_id.to_string(),
        entries: entries.iter().map(QueueEntryRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/queue/{id}/complete",
    params(("id" = String, Path, description = "Queue entry id")),
    responses(
        (status = 200, description = "Completed queue entry", body = QueueEntryRes),
        (status = 404, description = "Unknown queue entry", body = ErrorRes),
        (status = 409, description = "Entry not in Called state", body = ErrorRes)
    )
)]
/// Finish a called patient. Completes the owning assessment in the same step.
async fn complete_queue_entry(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<QueueEntryRes>, ApiError> {
    let queue_id = parse_id("id", &id)?;
    let entry = run_blocking(&state.service, move |s| s.queue().complete(&ctx, queue_id)).await?;
    Ok(Json((&entry).into()))
}

#[utoipa::path(
    post,
    path = "/protocols",
    request_body = CreateProtocolReq,
    responses(
        (status = 201, description = "Protocol created", body = ProtocolRes),
        (status = 400, description = "Invalid input", body = ErrorRes)
    )
)]
async fn create_protocol(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<CreateProtocolReq>,
) -> Result<(StatusCode, Json<ProtocolRes>), ApiError> {
    let new = NewProtocol::try_from(req)?;
    let protocol = run_blocking(&state.service, move |s| s.protocols().create(&ctx, new)).await?;
    Ok((StatusCode::CREATED, Json((&protocol).into())))
}

#[utoipa::path(
    get,
    path = "/protocols",
    params(("active_only" = Option<bool>, Query, description = "Hide inactive protocols")),
    responses(
        (status = 200, description = "Protocol catalogue", body = ListProtocolsRes)
    )
)]
async fn list_protocols(
    State(state): State<AppState>,
    Query(query): Query<ProtocolListQuery>,
) -> Result<Json<ListProtocolsRes>, ApiError> {
    let protocols =
        run_blocking(&state.service, move |s| s.protocols().list(query.active_only)).await?;
    Ok(Json(ListProtocolsRes {
        protocols: protocols.iter().map(ProtocolRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/protocols/{id}",
    params(("id" = String, Path, description = "Protocol id")),
    responses(
        (status = 200, description = "Protocol", body = ProtocolRes),
        (status = 404, description = "Unknown protocol", body = ErrorRes)
    )
)]
async fn get_protocol(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProtocolRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let protocol = run_blocking(&state.service, move |s| s.protocols().get(id)).await?;
    Ok(Json((&protocol).into()))
}

#[utoipa::path(
    put,
    path = "/protocols/{id}",
    params(("id" = String, Path, description = "Protocol id")),
    request_body = UpdateProtocolReq,
    responses(
        (status = 200, description = "Updated protocol", body = ProtocolRes),
        (status = 404, description = "Unknown protocol", body = ErrorRes)
    )
)]
async fn update_protocol(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateProtocolReq>,
) -> Result<Json<ProtocolRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let update = ProtocolUpdate::try_from(req)?;
    let protocol =
        run_blocking(&state.service, move |s| s.protocols().update(&ctx, id, update)).await?;
    Ok(Json((&protocol).into()))
}

#[utoipa::path(
    post,
    path = "/protocols/{id}/deactivate",
    params(("id" = String, Path, description = "Protocol id")),
    responses(
        (status = 200, description = "Deactivated protocol", body = ProtocolRes),
        (status = 404, description = "Unknown protocol", body = ErrorRes)
    )
)]
async fn deactivate_protocol(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<ProtocolRes>, ApiError> {
    let id = parse_id("id", &id)?;
    let protocol = run_blocking(&state.service, move |s| s.protocols().deactivate(&ctx, id)).await?;
    Ok(Json((&protocol).into()))
}

#[utoipa::path(
    get,
    path = "/stats/daily",
    params(
        ("date" = Option<String>, Query, description = "UTC day (YYYY-MM-DD); defaults to today"),
        ("department_id" = Option<String>, Query, description = "Limit to one department")
    ),
    responses(
        (status = 200, description = "Daily rollup", body = DailyStatsRes)
    )
)]
async fn get_daily_stats(
    State(state): State<AppState>,
    Query(query): Query<DailyStatsQuery>,
) -> Result<Json<DailyStatsRes>, ApiError> {
    let date = match query.date.as_deref() {
        Some(d) => parse_date("date", d)?,
        None => state.service.now().date_naive(),
    };
    let department_id = query
        .department_id
        .as_deref()
        .map(|id| parse_id("department_id", id))
        .transpose()?;
    let stats = run_blocking(&state.service, move |s| {
        s.statistics().daily_stats(date, department_id)
    })
    .await?;
    Ok(Json((&stats).into()))
}

#[utoipa::path(
    get,
    path = "/stats/health",
    responses(
        (status = 200, description = "Operational health signal", body = SystemHealthRes)
    )
)]
async fn get_system_health(
    State(state): State<AppState>,
) -> Result<Json<SystemHealthRes>, ApiError> {
    let health = run_blocking(&state.service, move |s| s.statistics().system_health()).await?;
    Ok(Json((&health).into()))
}

#[utoipa::path(
    get,
    path = "/stats/overdue",
    params(("department_id" = Option<String>, Query, description = "Limit to one department")),
    responses(
        (status = 200, description = "Overdue waiting entries", body = OverdueListRes)
    )
)]
async fn scan_overdue(
    State(state): State<AppState>,
    Query(filter): Query<DepartmentFilter>,
) -> Result<Json<OverdueListRes>, ApiError> {
    let department_id = parse_department_filter(&filter)?;
    let overdue =
        run_blocking(&state.service, move |s| s.statistics().scan_overdue(department_id)).await?;
    Ok(Json(OverdueListRes {
        overdue: overdue.iter().map(OverdueEntryRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/stats/alerts",
    responses(
        (status = 200, description = "Overdue or flagged waiting entries", body = ActiveAlertsRes)
    )
)]
async fn list_active_alerts(
    State(state): State<AppState>,
) -> Result<Json<ActiveAlertsRes>, ApiError> {
    let alerts = run_blocking(&state.service, move |s| s.statistics().active_alerts()).await?;
    Ok(Json(ActiveAlertsRes {
        alerts: alerts.iter().map(ActiveAlertRes::from).collect(),
    }))
}
