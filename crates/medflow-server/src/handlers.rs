use axum::{
    Json,
    extract::{Path, Query, RawQuery, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use medflow_core::{
    AppointmentKind, LabResult, LabStatus, LabTestPatch, NewAppointment, NewPharmacyOrder, Role,
    RoleGroup, SampleStatus, TenantId, VisitStatus, now_utc, time::format_date,
};
use medflow_storage::{LabTestQuery, VisitQuery};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::realtime::{Fanout, Requirement, ServerMessage, authorize, handle_socket};
use crate::server::AppState;
use crate::session::{
    AuthSession, Session, expired_session_cookie, session_cookie, token_from_headers,
    token_from_query,
};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "MedFlow Queue Server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ready" }))
}

const LAB_ROLES: &[Role] = &[Role::Lab, Role::Doctor];

// ---- Authentication ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub hospital_id: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub hospital_id: TenantId,
}

impl From<&Session> for SessionUser {
    fn from(session: &Session) -> Self {
        Self {
            id: session.user_id.clone(),
            username: session.username.clone(),
            role: session.role,
            hospital_id: session.tenant_id.clone(),
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = TenantId::parse(&req.hospital_id).map_err(|_| ApiError::InvalidCredentials)?;
    let Some(user) = state
        .staff
        .authenticate(&tenant, req.username.trim(), &req.password)
        .await
    else {
        tracing::info!(tenant = %tenant, username = %req.username, "login failed");
        return Err(ApiError::InvalidCredentials);
    };

    let session = state.sessions.create(user).await;
    tracing::info!(tenant = %session.tenant_id, user = %session.username, role = %session.role, "staff logged in");

    let cookie = session_cookie(
        &session.token,
        state.config.session_ttl(),
        state.config.session.secure_cookie,
    );
    let body = LoginResponse {
        token: session.token.clone(),
        expires_at: session.expires_at,
        user: SessionUser::from(&session),
    };
    Ok((StatusCode::OK, [(SET_COOKIE, cookie)], Json(body)))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = token_from_headers(&headers)
        && state.sessions.revoke(&token).await
    {
        tracing::info!("staff logged out");
    }
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, expired_session_cookie())],
    )
}

pub async fn me(AuthSession(session): AuthSession) -> Json<SessionUser> {
    Json(SessionUser::from(&session))
}

// ---- WebSocket ----

/// Upgrades to the realtime protocol. A missing or unknown token still
/// connects, as a patient-app client without staff rights.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = token_from_headers(&headers).or_else(|| token_from_query(query.as_deref()));
    let session = match token {
        Some(token) => state.sessions.resolve(&token).await,
        None => None,
    };

    let router = state.router.clone();
    let capacity = state.config.realtime.outbound_queue_capacity;
    let heartbeat = state.config.heartbeat_interval();
    ws.on_upgrade(move |socket| handle_socket(socket, session, router, capacity, heartbeat))
}

// ---- Queue snapshot ----

#[derive(Debug, Default, Deserialize)]
pub struct QueueParams {
    pub department: Option<String>,
    pub status: Option<VisitStatus>,
}

pub async fn queue_snapshot(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(params): Query<QueueParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = VisitQuery::new(session.tenant_id.clone());
    if let Some(department) = params.department.filter(|d| !d.trim().is_empty()) {
        query = query.with_department(department.trim());
    }
    if let Some(status) = params.status {
        query = query.with_status(status);
    }
    let visits = state.storage.list_visits(&query).await?;
    Ok(Json(visits))
}

// ---- Lab ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabListParams {
    pub status: Option<LabStatus>,
    pub patient_id: Option<String>,
}

pub async fn list_lab_tests(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Query(params): Query<LabListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = LabTestQuery::new(session.tenant_id.clone());
    if let Some(status) = params.status {
        query = query.with_status(status);
    }
    if let Some(patient_id) = params.patient_id {
        query = query.for_patient(patient_id);
    }
    let tests = state.storage.list_lab_tests(&query).await?;
    Ok(Json(tests))
}

#[derive(Debug, Deserialize)]
pub struct LabStatusUpdate {
    pub status: LabStatus,
}

pub async fn update_lab_status(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
    Json(update): Json<LabStatusUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authorize(Some(&session), Requirement::AnyRole(LAB_ROLES))?;
    let tenant = &session.tenant_id;

    let current = state
        .storage
        .find_lab_test(tenant, &id)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;
    let next = current.status.transition(update.status)?;

    let patch = LabTestPatch {
        status: Some(next),
        sample_status: match next {
            LabStatus::Processing => Some(SampleStatus::Collected),
            LabStatus::Rejected => Some(SampleStatus::Rejected),
            _ => None,
        },
        completed_at: (next == LabStatus::Completed).then(now_utc),
    };
    let test = state
        .storage
        .update_lab_test(tenant, &id, &patch)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;

    tracing::info!(tenant = %tenant, test_id = %test.id, from = %current.status, to = %next, "lab status changed");
    state.router.rooms().emit(
        &Fanout::new().roles(tenant, &[RoleGroup::Lab]),
        &ServerMessage::LabUpdate(test.clone()),
    );
    Ok(Json(test))
}

#[derive(Debug, Deserialize)]
pub struct LabResultsUpload {
    pub results: Vec<LabResult>,
}

/// Replaces the results and completes the test. Re-uploading to a
/// completed test only replaces the results.
pub async fn upload_lab_results(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
    Json(upload): Json<LabResultsUpload>,
) -> Result<impl IntoResponse, ApiError> {
    let session = authorize(Some(&session), Requirement::AnyRole(LAB_ROLES))?;
    let tenant = &session.tenant_id;

    if upload.results.iter().any(|r| r.parameter_name.trim().is_empty()) {
        return Err(ApiError::BadRequest("Every result needs a parameter name".into()));
    }

    let current = state
        .storage
        .find_lab_test(tenant, &id)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;
    let completing = current.status != LabStatus::Completed;
    if completing {
        current.status.transition(LabStatus::Completed)?;
    }

    let mut test = state
        .storage
        .replace_lab_results(tenant, &id, upload.results)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;

    if completing {
        let patch = LabTestPatch {
            status: Some(LabStatus::Completed),
            sample_status: Some(SampleStatus::Collected),
            completed_at: Some(now_utc()),
        };
        test = state
            .storage
            .update_lab_test(tenant, &id, &patch)
            .await?
            .ok_or_else(ApiError::not_found_for_tenant)?;

        match state.storage.find_visit(tenant, &test.patient_id).await {
            Ok(visit) => state
                .effects
                .lab_result_ready(visit.as_ref().and_then(|v| v.phone.as_deref()), &test.test_name),
            Err(e) => tracing::warn!(test_id = %test.id, error = %e, "patient lookup for lab notice failed"),
        }
    }

    tracing::info!(tenant = %tenant, test_id = %test.id, results = test.results.len(), "lab results stored");
    state.router.rooms().emit(
        &Fanout::new().roles(tenant, &[RoleGroup::Lab]),
        &ServerMessage::LabUpdate(test.clone()),
    );
    Ok(Json(test))
}

// ---- Public portal ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionView {
    pub hospital_name: String,
    pub patient_name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub token: u32,
    pub department: String,
    pub doctor_name: String,
    pub prescription: Option<String>,
    pub follow_up_date: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

pub async fn public_prescription(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let visit = state
        .storage
        .find_visit_by_public_token(&token)
        .await?
        .ok_or_else(|| ApiError::NotFound("Prescription not found".into()))?;

    Ok(Json(PrescriptionView {
        hospital_name: state.config.clinic.name.clone(),
        doctor_name: state.roster.display_name(visit.doctor_id.as_deref()),
        patient_name: visit.name,
        age: visit.age,
        gender: visit.gender,
        token: visit.token,
        department: visit.department,
        prescription: visit.prescription,
        follow_up_date: visit.follow_up_date.map(format_date),
        registered_at: visit.registered_at,
    }))
}

// ---- Patient app ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRequest {
    pub hospital_id: String,
    pub patient_id: String,
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub appointment_date: String,
    pub appointment_time: String,
    #[serde(default, rename = "type")]
    pub kind: AppointmentKind,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Json(req): Json<AppointmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = TenantId::parse(&req.hospital_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if req.appointment_date.trim().is_empty() || req.appointment_time.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Appointment date and time are required".into(),
        ));
    }
    let visit = state
        .storage
        .find_visit(&tenant, &req.patient_id)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;

    let appointment = state
        .storage
        .create_appointment(NewAppointment {
            tenant_id: tenant.clone(),
            patient_id: visit.id,
            patient_name: visit.name,
            phone: visit.phone,
            doctor_id: req.doctor_id.or(visit.doctor_id),
            appointment_date: req.appointment_date.trim().to_string(),
            appointment_time: req.appointment_time.trim().to_string(),
            kind: req.kind,
            notes: req.notes,
        })
        .await?;

    tracing::info!(tenant = %tenant, appointment_id = %appointment.id, "appointment booked");
    state.router.rooms().emit(
        &Fanout::new().tenant(&tenant),
        &ServerMessage::NewAppointment(appointment.clone()),
    );
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyOrderRequest {
    pub hospital_id: String,
    pub patient_id: String,
    /// Defaults to the visit's current prescription.
    #[serde(default)]
    pub prescription: Option<String>,
}

pub async fn create_pharmacy_order(
    State(state): State<AppState>,
    Json(req): Json<PharmacyOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant = TenantId::parse(&req.hospital_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let visit = state
        .storage
        .find_visit(&tenant, &req.patient_id)
        .await?
        .ok_or_else(ApiError::not_found_for_tenant)?;

    let prescription = req
        .prescription
        .filter(|p| !p.trim().is_empty())
        .or(visit.prescription)
        .ok_or_else(|| ApiError::BadRequest("No prescription to order".into()))?;

    let order = state
        .storage
        .create_pharmacy_order(NewPharmacyOrder {
            tenant_id: tenant.clone(),
            patient_id: visit.id,
            patient_name: visit.name,
            phone: visit.phone,
            prescription,
        })
        .await?;

    tracing::info!(tenant = %tenant, order_id = %order.id, "pharmacy order placed");
    state.router.rooms().emit(
        &Fanout::new().tenant(&tenant),
        &ServerMessage::NewPharmacyOrder(order.clone()),
    );
    Ok((StatusCode::CREATED, Json(order)))
}
