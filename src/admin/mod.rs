//! Admin tooling: diagnostics, user management, automation flags.
//!
//! Every route here is wrapped by the admin guard; non-admin sessions get a
//! 403 before any handler runs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{hash_password, require_admin_middleware, AuthenticatedUser};
use crate::shared::errors::ApiError;
use crate::shared::schema::{
    automation_settings, campaign_tasks, documents, leads, people, portal_webhook_events,
    properties, users,
};
use crate::shared::state::AppState;

#[derive(Debug, Serialize, Queryable)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = automation_settings)]
pub struct AutomationSetting {
    pub id: Uuid,
    pub setting_key: String,
    pub enabled: bool,
    pub target_url: Option<String>,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PutSettingRequest {
    pub enabled: bool,
    pub target_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub version: String,
    pub database_ok: bool,
    pub uptime_seconds: i64,
    pub counts: EntityCounts,
}

#[derive(Debug, Default, Serialize)]
pub struct EntityCounts {
    pub users: i64,
    pub leads: i64,
    pub properties: i64,
    pub people: i64,
    pub documents: i64,
    pub campaign_tasks: i64,
    pub portal_events: i64,
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

const USER_SUMMARY_COLUMNS: (
    users::id,
    users::email,
    users::display_name,
    users::phone,
    users::is_active,
    users::is_admin,
    users::created_at,
) = (
    users::id,
    users::email,
    users::display_name,
    users::phone,
    users::is_active,
    users::is_admin,
    users::created_at,
);

pub async fn get_diagnostics(State(state): State<Arc<AppState>>) -> Json<Diagnostics> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();
    let version = env!("CARGO_PKG_VERSION").to_string();

    let Ok(mut conn) = state.conn.get() else {
        return Json(Diagnostics {
            version,
            database_ok: false,
            uptime_seconds,
            counts: EntityCounts::default(),
        });
    };

    let counts = EntityCounts {
        users: users::table.count().get_result(&mut conn).unwrap_or(0),
        leads: leads::table.count().get_result(&mut conn).unwrap_or(0),
        properties: properties::table.count().get_result(&mut conn).unwrap_or(0),
        people: people::table.count().get_result(&mut conn).unwrap_or(0),
        documents: documents::table.count().get_result(&mut conn).unwrap_or(0),
        campaign_tasks: campaign_tasks::table
            .count()
            .get_result(&mut conn)
            .unwrap_or(0),
        portal_events: portal_webhook_events::table
            .count()
            .get_result(&mut conn)
            .unwrap_or(0),
    };

    Json(Diagnostics {
        version,
        database_ok: true,
        uptime_seconds,
        counts,
    })
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<UserSummary> = users::table
        .select(USER_SUMMARY_COLUMNS)
        .order(users::email.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    validate_password(&req.password)?;

    let mut conn = state.conn.get()?;

    let password_hash = hash_password(&req.password)?;
    let now = Utc::now();
    let id = Uuid::new_v4();

    diesel::insert_into(users::table)
        .values((
            users::id.eq(id),
            users::email.eq(&req.email),
            users::display_name.eq(&req.display_name),
            users::password_hash.eq(&password_hash),
            users::phone.eq(&req.phone),
            users::is_active.eq(true),
            users::is_admin.eq(req.is_admin),
            users::created_at.eq(now),
            users::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    Ok(Json(UserSummary {
        id,
        email: req.email,
        display_name: req.display_name,
        phone: req.phone,
        is_active: true,
        is_admin: req.is_admin,
        created_at: now,
    }))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    // Validate before any field write so a rejected request changes nothing.
    if let Some(password) = &req.password {
        validate_password(password)?;
    }

    let mut conn = state.conn.get()?;

    let exists: Option<Uuid> = users::table
        .filter(users::id.eq(id))
        .select(users::id)
        .first(&mut conn)
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    if let Some(display_name) = &req.display_name {
        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::display_name.eq(display_name))
            .execute(&mut conn)?;
    }
    if let Some(phone) = &req.phone {
        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::phone.eq(phone))
            .execute(&mut conn)?;
    }
    if let Some(password) = &req.password {
        let password_hash = hash_password(password)?;
        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::password_hash.eq(password_hash))
            .execute(&mut conn)?;
    }
    if let Some(is_active) = req.is_active {
        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::is_active.eq(is_active))
            .execute(&mut conn)?;
    }
    if let Some(is_admin) = req.is_admin {
        diesel::update(users::table.filter(users::id.eq(id)))
            .set(users::is_admin.eq(is_admin))
            .execute(&mut conn)?;
    }
    diesel::update(users::table.filter(users::id.eq(id)))
        .set(users::updated_at.eq(Utc::now()))
        .execute(&mut conn)?;

    let updated: UserSummary = users::table
        .filter(users::id.eq(id))
        .select(USER_SUMMARY_COLUMNS)
        .first(&mut conn)?;

    Ok(Json(updated))
}

pub async fn list_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AutomationSetting>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<AutomationSetting> = automation_settings::table
        .order(automation_settings::setting_key.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

/// Upsert by key; flipping a flag records who flipped it.
pub async fn put_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    user: AuthenticatedUser,
    Json(req): Json<PutSettingRequest>,
) -> Result<Json<AutomationSetting>, ApiError> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let existing: Option<Uuid> = automation_settings::table
        .filter(automation_settings::setting_key.eq(&key))
        .select(automation_settings::id)
        .first(&mut conn)
        .optional()?;

    let id = match existing {
        Some(id) => {
            diesel::update(automation_settings::table.filter(automation_settings::id.eq(id)))
                .set((
                    automation_settings::enabled.eq(req.enabled),
                    automation_settings::target_url.eq(&req.target_url),
                    automation_settings::updated_by.eq(Some(user.user_id)),
                    automation_settings::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            id
        }
        None => {
            let setting = AutomationSetting {
                id: Uuid::new_v4(),
                setting_key: key.clone(),
                enabled: req.enabled,
                target_url: req.target_url.clone(),
                updated_by: Some(user.user_id),
                updated_at: now,
            };
            diesel::insert_into(automation_settings::table)
                .values(&setting)
                .execute(&mut conn)?;
            setting.id
        }
    };

    info!("automation flag {key} set to {} by {}", req.enabled, user.user_id);

    let saved: AutomationSetting = automation_settings::table
        .filter(automation_settings::id.eq(id))
        .first(&mut conn)?;

    Ok(Json(saved))
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub setting_key: String,
    pub delivered: bool,
    pub upstream_status: Option<u16>,
}

/// Fire a flag's webhook by hand, for wiring checks before enabling the
/// automated path.
pub async fn trigger_setting(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<TriggerResponse>, ApiError> {
    let mut conn = state.conn.get()?;

    let setting: Option<AutomationSetting> = automation_settings::table
        .filter(automation_settings::setting_key.eq(&key))
        .first(&mut conn)
        .optional()?;
    let Some(setting) = setting else {
        return Err(ApiError::NotFound(format!("Unknown automation flag: {key}")));
    };
    if !setting.enabled {
        return Err(ApiError::InvalidState(format!(
            "Automation flag {key} is disabled"
        )));
    }
    let Some(target_url) = setting.target_url else {
        return Err(ApiError::BadRequest(format!(
            "Automation flag {key} has no target URL"
        )));
    };

    let body = serde_json::json!({
        "setting_key": key,
        "triggered_by": user.user_id,
        "triggered_at": Utc::now(),
    });
    let response = state
        .http
        .post(&target_url)
        .json(&body)
        .send()
        .await;

    match response {
        Ok(resp) => {
            let status = resp.status().as_u16();
            info!("automation trigger {key} delivered, upstream {status}");
            Ok(Json(TriggerResponse {
                setting_key: key,
                delivered: true,
                upstream_status: Some(status),
            }))
        }
        Err(e) => Err(ApiError::Internal(format!(
            "Automation trigger delivery failed: {e}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventLogQuery {
    pub limit: Option<i64>,
}

/// Recent stage-change audit rows across all leads.
pub async fn recent_stage_changes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventLogQuery>,
) -> Result<Json<Vec<crate::leads::LeadStageChange>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(100);
    let rows: Vec<crate::leads::LeadStageChange> = crate::shared::schema::lead_stage_changes::table
        .order(crate::shared::schema::lead_stage_changes::created_at.desc())
        .limit(limit)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/diagnostics", get(get_diagnostics))
        .route("/api/admin/users", get(list_users).post(create_user))
        .route("/api/admin/users/:id", put(update_user))
        .route("/api/admin/stage-changes", get(recent_stage_changes))
        .route("/api/automation", get(list_settings))
        .route("/api/automation/:key", put(put_setting))
        .route("/api/automation/:key/trigger", post(trigger_setting))
        .layer(middleware::from_fn(require_admin_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_are_rejected_before_any_write() {
        match validate_password("hunter2") {
            Err(ApiError::BadRequest(_)) => {}
            other => panic!("expected BadRequest, got {other:?}"),
        }
        assert!(validate_password("longenough").is_ok());
    }
}
