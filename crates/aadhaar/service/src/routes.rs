//! Request handlers and wire DTOs.

use crate::error::{ApiError, ApiResult};
use crate::ServiceState;
use aadhaar_identity::RegistrationRequest;
use aadhaar_ledger::IntegrityReport;
use aadhaar_storage::QueryWindow;
use aadhaar_types::{canonical_timestamp, ChainEntry, IdentityHash, UsageEvent};
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::Json;
use serde::{Deserialize, Serialize};

/// `Json` with rejections rendered as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Admin-token check. List it before any body or path extractor so
/// unauthorized callers get 401 whatever else is wrong with the request.
pub struct AdminAccess;

#[async_trait]
impl FromRequestParts<ServiceState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        state.authorize_admin(&parts.headers)?;
        Ok(AdminAccess)
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    #[serde(alias = "aadhaar_number")]
    pub identity_number: String,
    pub pin: String,
    #[serde(default, alias = "dob")]
    pub date_of_birth: Option<String>,
    #[serde(default, alias = "village_code")]
    pub region_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    #[serde(default, alias = "qr_token")]
    pub access_token: String,
    #[serde(default)]
    pub pin: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub status: &'static str,
    pub profile: ProfileView,
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub full_name: String,
    pub region_code: Option<String>,
}

#[derive(Deserialize)]
pub struct EventRequest {
    #[serde(alias = "qr_token")]
    pub access_token: String,
    #[serde(alias = "service_type")]
    pub event_kind: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub sequence_id: u64,
    pub entry_digest: String,
}

#[derive(Deserialize)]
pub struct HistoryRequest {
    #[serde(alias = "qr_token")]
    pub access_token: String,
    /// Zero or absent returns every entry.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub sequence_id: u64,
    pub event_kind: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub recorded_at: String,
    pub prev_digest: String,
    pub entry_digest: String,
}

impl From<ChainEntry> for HistoryItem {
    fn from(entry: ChainEntry) -> Self {
        Self {
            sequence_id: entry.sequence_id,
            event_kind: entry.event_kind,
            quantity: entry.quantity,
            unit: entry.unit,
            recorded_at: canonical_timestamp(&entry.recorded_at),
            prev_digest: entry.prev_digest.to_string(),
            entry_digest: entry.entry_digest.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub storage_backend: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct SetActiveResponse {
    pub identity_hash: IdentityHash,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub identities_removed: u64,
    pub entries_removed: u64,
}

pub async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "aadhaar-lite",
        storage_backend: state.storage_backend(),
    })
}

pub async fn register(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let token = state
        .registry
        .register(RegistrationRequest {
            full_name: body.full_name,
            identity_number: body.identity_number,
            pin: body.pin,
            date_of_birth: body.date_of_birth,
            region_code: body.region_code,
        })
        .await?;

    Ok(Json(RegisterResponse {
        access_token: token.to_string(),
    }))
}

pub async fn authenticate(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<AuthenticateRequest>,
) -> ApiResult<Json<AuthenticateResponse>> {
    if body.access_token.trim().is_empty() || body.pin.is_empty() {
        return Err(ApiError::InvalidInput(
            "access_token and pin are required".to_string(),
        ));
    }

    let profile = state
        .registry
        .authenticate(&body.access_token, &body.pin)
        .await?;

    Ok(Json(AuthenticateResponse {
        status: "VERIFIED",
        profile: ProfileView {
            full_name: profile.display_name,
            region_code: profile.region_code,
        },
    }))
}

pub async fn record_event(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<EventRequest>,
) -> ApiResult<Json<EventResponse>> {
    // Payload errors take precedence over token lookups.
    let event = UsageEvent::new(&body.event_kind, body.quantity, body.unit.as_deref())?;
    let identity = state
        .registry
        .resolve_identity_hash(&body.access_token)
        .await?;
    let entry = state.chain.append_event(&identity, &event).await?;

    Ok(Json(EventResponse {
        sequence_id: entry.sequence_id,
        entry_digest: entry.entry_digest.to_string(),
    }))
}

pub async fn history(
    State(state): State<ServiceState>,
    ApiJson(body): ApiJson<HistoryRequest>,
) -> ApiResult<Json<HistoryResponse>> {
    let identity = state
        .registry
        .resolve_identity_hash(&body.access_token)
        .await?;
    let window = QueryWindow {
        limit: body.limit.unwrap_or(0),
        offset: body.offset.unwrap_or(0),
    };
    let entries = state.chain.history_for(&identity, window).await?;

    Ok(Json(HistoryResponse {
        items: entries.into_iter().map(HistoryItem::from).collect(),
    }))
}

pub async fn verify_chain(State(state): State<ServiceState>) -> ApiResult<Json<IntegrityReport>> {
    Ok(Json(state.chain.verify_integrity().await?))
}

pub async fn set_identity_active(
    _admin: AdminAccess,
    State(state): State<ServiceState>,
    Path(identity_hash): Path<String>,
    ApiJson(body): ApiJson<SetActiveRequest>,
) -> ApiResult<Json<SetActiveResponse>> {
    let identity_hash = IdentityHash::from_hex(&identity_hash)?;

    state.registry.set_active(&identity_hash, body.active).await?;

    Ok(Json(SetActiveResponse {
        identity_hash,
        active: body.active,
    }))
}

pub async fn reset(
    _admin: AdminAccess,
    State(state): State<ServiceState>,
) -> ApiResult<Json<ResetResponse>> {
    let summary = state.chain.reset_all().await?;

    Ok(Json(ResetResponse {
        identities_removed: summary.identities_removed,
        entries_removed: summary.entries_removed,
    }))
}
