// HTTP request handlers
use crate::application::aggregation::{
    default_period, gauge_readings, latest, monthly_series, year_options,
};
use crate::application::auth_provider::{AuthError, AuthProvider};
use crate::application::report::{DateRange, ReportRow, filter_by_date_range, report_rows};
use crate::domain::record::CanonicalRecord;
use crate::domain::series::{MonthlySeries, YearMonth};
use crate::domain::session::{ActivityKind, SessionState, SignOutReason};
use crate::domain::substance::GaugeReading;
use crate::domain::working_set::FetchStatus;
use crate::infrastructure::csv_export::{CONTENT_TYPE, build_csv, export_file_name};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SIGN_IN_SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials | AuthError::NotSignedIn => {
                ApiError::Unauthorized(e.to_string())
            }
            AuthError::Unavailable(_) => ApiError::Unavailable(e.to_string()),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// The caller's token, provided it holds the active session.
fn require_active<'h>(state: &AppState, headers: &'h HeaderMap) -> Result<&'h str, ApiError> {
    bearer_token(headers)
        .filter(|token| state.session.authorize(token))
        .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
}

fn seconds_until(deadline: Option<Instant>) -> Option<u64> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()).as_secs())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ActivityRequest {
    pub kind: ActivityKind,
}

#[derive(Deserialize)]
pub struct MonthQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RangeQuery {
    fn resolve(&self) -> DateRange {
        let default = DateRange::default_for(today());
        DateRange {
            from: self.from.unwrap_or(default.from),
            to: self.to.unwrap_or(default.to),
        }
    }
}

#[derive(Serialize)]
pub struct SignInView {
    pub user: String,
    pub token: String,
}

/// What the caller can see of the session. Another client's session shows
/// as logged out.
#[derive(Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub user: Option<String>,
    pub last_sign_out_reason: Option<SignOutReason>,
    pub idle_expires_in_secs: Option<u64>,
    pub absolute_expires_in_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct SubstanceView {
    pub gauge: GaugeReading,
    pub latest: Option<CanonicalRecord>,
}

#[derive(Serialize)]
pub struct ImageView {
    pub mime_type: String,
    pub data_url: String,
}

#[derive(Serialize)]
pub struct MonthlyView {
    pub period: YearMonth,
    pub years: Vec<i32>,
    pub series: BTreeMap<String, MonthlySeries>,
}

#[derive(Serialize)]
pub struct StatusView {
    pub fetch: FetchStatus,
    pub records: usize,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionView> {
    if require_active(&state, &headers).is_ok() {
        return Json(SessionView {
            state: SessionState::Active,
            user: state.session.current_user(),
            last_sign_out_reason: None,
            idle_expires_in_secs: seconds_until(state.session.idle_deadline()),
            absolute_expires_in_secs: seconds_until(state.session.absolute_deadline()),
        });
    }
    Json(SessionView {
        state: SessionState::LoggedOut,
        user: None,
        last_sign_out_reason: state.session.last_sign_out_reason(),
        idle_expires_in_secs: None,
        absolute_expires_in_secs: None,
    })
}

/// Issues the bearer token for later requests once the session is active.
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<SignInView>, ApiError> {
    let states = state.session.subscribe_state();
    let token = state.auth.sign_in(&request.email, &request.password)?;
    if !state
        .session
        .session_established(states, &token, SIGN_IN_SETTLE)
        .await
    {
        return Err(ApiError::Unavailable(
            "Session could not be established".to_string(),
        ));
    }

    Ok(Json(SignInView {
        user: state.session.current_user().unwrap_or_default(),
        token,
    }))
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(AuthError::NotSignedIn)?;
    state.session.sign_out(token).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn password_reset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode, ApiError> {
    state.auth.send_password_reset(request.email.trim()).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn record_activity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ActivityRequest>,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers).ok_or(AuthError::NotSignedIn)?;
    if state.session.record_activity(token, request.kind) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AuthError::NotSignedIn.into())
    }
}

/// One gauge per configured substance
pub async fn latest_readings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<GaugeReading>>, ApiError> {
    require_active(&state, &headers)?;
    let set = state.ingestion.snapshot();
    Ok(Json(gauge_readings(&set, &state.catalog)))
}

pub async fn substance_latest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<SubstanceView>, ApiError> {
    require_active(&state, &headers)?;
    let config = state
        .catalog
        .get(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown substance {}", id)))?;
    let set = state.ingestion.snapshot();
    let record = latest(&set, &config.sheet_key).cloned();

    Ok(Json(SubstanceView {
        gauge: GaugeReading::evaluate(config, record.as_ref().map_or(0.0, |r| r.quantity)),
        latest: record,
    }))
}

pub async fn monthly(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthlyView>, ApiError> {
    require_active(&state, &headers)?;
    let set = state.ingestion.snapshot();
    let today = today();
    let fallback = default_period(&set, today);

    let period = YearMonth::new(
        query.year.unwrap_or(fallback.year),
        query.month.unwrap_or(fallback.month),
    )
    .ok_or_else(|| ApiError::BadRequest("month must be between 1 and 12".to_string()))?;

    Ok(Json(MonthlyView {
        period,
        years: year_options(today),
        series: monthly_series(&set, &state.catalog, period),
    }))
}

pub async fn report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<ReportRow>>, ApiError> {
    require_active(&state, &headers)?;
    let set = state.ingestion.snapshot();
    Ok(Json(report_rows(filter_by_date_range(&set, query.resolve()))))
}

pub async fn report_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    require_active(&state, &headers)?;
    let set = state.ingestion.snapshot();
    let records = filter_by_date_range(&set, query.resolve());
    if records.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let disposition = format!("attachment; filename=\"{}\"", export_file_name(today()));
    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        build_csv(&records),
    )
        .into_response())
}

pub async fn image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ImageView>, ApiError> {
    require_active(&state, &headers)?;
    match state.ingestion.fetch_image(&id).await {
        Ok(blob) => Ok(Json(ImageView {
            data_url: blob.data_url(),
            mime_type: blob.mime_type,
        })),
        Err(e) => {
            tracing::warn!("Error loading image {}: {}", id, e);
            Err(ApiError::Upstream(e.to_string()))
        }
    }
}

pub async fn fetch_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusView>, ApiError> {
    require_active(&state, &headers)?;
    Ok(Json(StatusView {
        fetch: state.ingestion.status(),
        records: state.ingestion.snapshot().len(),
    }))
}
