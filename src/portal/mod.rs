//! Portal webhook ingestion.
//!
//! Listing portals deliver lead events here with a static bearer token.
//! Events are deduplicated by idempotency key and persisted before any
//! mapping happens, so a failed mapping still leaves an auditable `error`
//! row. Mapping outcomes never bounce the delivery: the portal gets a 200
//! with the event status and must not retry a deterministic failure.

pub mod mapping;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::leads::{Lead, STATUS_OPEN};
use crate::shared::errors::ApiError;
use crate::shared::schema::{automation_settings, leads, portal_webhook_events};
use crate::shared::state::AppState;

pub use mapping::{is_confident, map_payload, MappedLead};

pub const EVENT_RECEIVED: &str = "received";
pub const EVENT_DUPLICATE: &str = "duplicate";
pub const EVENT_PROCESSED: &str = "processed";
pub const EVENT_IGNORED: &str = "ignored";
pub const EVENT_ERROR: &str = "error";

/// Automation flag gating the whole ingestion path.
pub const PORTAL_INGESTION_FLAG: &str = "portal_ingestion";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = portal_webhook_events)]
pub struct PortalWebhookEvent {
    pub id: Uuid,
    pub provider: String,
    pub external_event_id: Option<String>,
    pub idempotency_key: String,
    pub status: String,
    pub payload: serde_json::Value,
    pub lead_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub event_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub provider: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Constant-time token check; length mismatch fails like any other mismatch.
fn token_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    ring::constant_time::verify_slices_are_equal(presented.as_bytes(), expected.as_bytes()).is_ok()
}

/// Dedupe decision for the event insert: losing the race on the unique index
/// over `(provider, idempotency_key)` classifies the delivery as a duplicate,
/// same as finding the key in the first-pass lookup. Other errors propagate.
fn insert_is_duplicate(result: Result<usize, DieselError>) -> Result<bool, DieselError> {
    match result {
        Ok(_) => Ok(false),
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(true),
        Err(e) => Err(e),
    }
}

fn ingestion_enabled(conn: &mut PgConnection) -> bool {
    automation_settings::table
        .filter(automation_settings::setting_key.eq(PORTAL_INGESTION_FLAG))
        .select(automation_settings::enabled)
        .first::<bool>(conn)
        .unwrap_or(false)
}

/// `ingestPortalLeadEvent`: validate, dedupe, persist, map.
pub async fn ingest_portal_lead_event(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let presented = bearer_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Missing portal token".to_string()))?;
    if !token_matches(presented, &state.config.portal.webhook_token) {
        return Err(ApiError::Unauthorized("Invalid portal token".to_string()));
    }

    let mut conn = state.conn.get()?;

    if !ingestion_enabled(&mut conn) {
        return Err(ApiError::Forbidden(
            "Portal ingestion is disabled".to_string(),
        ));
    }

    let idempotency_header = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok());
    let idempotency_key = mapping::idempotency_key_from(idempotency_header, &payload)
        .ok_or_else(|| {
            ApiError::BadRequest("Delivery carries no idempotency key or event id".to_string())
        })?;

    // First-pass dedupe. A race between two concurrent deliveries is caught
    // below by the unique index on (provider, idempotency_key).
    let existing: Option<Uuid> = portal_webhook_events::table
        .filter(portal_webhook_events::provider.eq(&provider))
        .filter(portal_webhook_events::idempotency_key.eq(&idempotency_key))
        .select(portal_webhook_events::id)
        .first(&mut conn)
        .optional()?;
    if let Some(event_id) = existing {
        info!("duplicate portal delivery from {provider}, key {idempotency_key}");
        return Ok(Json(IngestResponse {
            event_id,
            status: EVENT_DUPLICATE.to_string(),
            lead_id: None,
        }));
    }

    let now = Utc::now();
    let event = PortalWebhookEvent {
        id: Uuid::new_v4(),
        provider: provider.clone(),
        external_event_id: mapping::external_event_id_from(&payload),
        idempotency_key: idempotency_key.clone(),
        status: EVENT_RECEIVED.to_string(),
        payload: payload.clone(),
        lead_id: None,
        error_message: None,
        received_at: now,
        processed_at: None,
    };

    let insert = diesel::insert_into(portal_webhook_events::table)
        .values(&event)
        .execute(&mut conn);
    if insert_is_duplicate(insert)? {
        info!("concurrent duplicate portal delivery from {provider}, key {idempotency_key}");
        // Our row never committed; report the id of the delivery that won.
        let event_id: Uuid = portal_webhook_events::table
            .filter(portal_webhook_events::provider.eq(&provider))
            .filter(portal_webhook_events::idempotency_key.eq(&idempotency_key))
            .select(portal_webhook_events::id)
            .first(&mut conn)?;
        return Ok(Json(IngestResponse {
            event_id,
            status: EVENT_DUPLICATE.to_string(),
            lead_id: None,
        }));
    }

    let mapped = map_payload(&payload, &state.config.portal.default_country_code);
    let (status, lead_id, error_message) = if !is_confident(&mapped) {
        (EVENT_IGNORED, None, None)
    } else {
        match insert_lead_from_mapping(&mut conn, &provider, &mapped) {
            Ok(lead_id) => (EVENT_PROCESSED, Some(lead_id), None),
            Err(e) => {
                warn!("portal lead mapping failed for event {}: {e}", event.id);
                (EVENT_ERROR, None, Some(e.to_string()))
            }
        }
    };

    diesel::update(
        portal_webhook_events::table.filter(portal_webhook_events::id.eq(event.id)),
    )
    .set((
        portal_webhook_events::status.eq(status),
        portal_webhook_events::lead_id.eq(lead_id),
        portal_webhook_events::error_message.eq(error_message),
        portal_webhook_events::processed_at.eq(Some(Utc::now())),
    ))
    .execute(&mut conn)?;

    Ok(Json(IngestResponse {
        event_id: event.id,
        status: status.to_string(),
        lead_id,
    }))
}

fn insert_lead_from_mapping(
    conn: &mut PgConnection,
    provider: &str,
    mapped: &MappedLead,
) -> Result<Uuid, DieselError> {
    let now = Utc::now();
    let title = match (&mapped.contact_name, &mapped.property_ref) {
        (Some(name), Some(prop)) => format!("{name} - {prop}"),
        (Some(name), None) => name.clone(),
        (None, Some(prop)) => format!("Portal lead - {prop}"),
        (None, None) => format!("Portal lead via {provider}"),
    };
    let lead = Lead {
        id: Uuid::new_v4(),
        title,
        contact_name: mapped.contact_name.clone(),
        email: mapped.email.clone(),
        phone: mapped.phone.clone(),
        status: STATUS_OPEN.to_string(),
        pipeline_id: None,
        stage_id: None,
        owner_user_id: None,
        property_id: None,
        source: Some(provider.to_string()),
        message: mapped.message.clone(),
        created_at: now,
        updated_at: now,
        closed_at: None,
    };
    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(conn)?;
    Ok(lead.id)
}

/// Event log for admin triage.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<PortalWebhookEvent>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = portal_webhook_events::table.into_boxed();
    if let Some(provider) = query.provider {
        q = q.filter(portal_webhook_events::provider.eq(provider));
    }
    if let Some(status) = query.status {
        q = q.filter(portal_webhook_events::status.eq(status));
    }

    let rows: Vec<PortalWebhookEvent> = q
        .order(portal_webhook_events::received_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

/// The webhook route is excluded from session auth; it authenticates with the
/// portal bearer token instead.
pub fn configure_webhook() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/portal/webhooks/:provider",
        post(ingest_portal_lead_event),
    )
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/portal/events", get(list_events))
        .layer(axum::middleware::from_fn(
            crate::auth::require_admin_middleware,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_check_rejects_mismatch_and_empty_config() {
        assert!(token_matches("sekret", "sekret"));
        assert!(!token_matches("sekret", "other"));
        assert!(!token_matches("sekret", "sekr"));
        assert!(!token_matches("", ""));
        assert!(!token_matches("anything", ""));
    }

    #[test]
    fn lost_insert_race_classifies_as_duplicate() {
        let unique = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key value violates unique constraint".to_string()),
        );
        assert_eq!(insert_is_duplicate(Err(unique)), Ok(true));
    }

    #[test]
    fn clean_insert_is_not_a_duplicate() {
        assert_eq!(insert_is_duplicate(Ok(1)), Ok(false));
    }

    #[test]
    fn non_unique_errors_propagate() {
        let fk = DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            Box::new("violates foreign key constraint".to_string()),
        );
        assert!(insert_is_duplicate(Err(fk)).is_err());
        assert!(insert_is_duplicate(Err(DieselError::NotFound)).is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        let mut bad = HeaderMap::new();
        bad.insert(AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&bad), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
