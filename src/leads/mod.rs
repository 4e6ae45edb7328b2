pub mod lifecycle;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::schema::{lead_notes, lead_stage_changes, leads, pipeline_stages, pipelines};
use crate::shared::state::AppState;
use crate::shared::utils::normalize_phone;

pub use lifecycle::{finalize_lead, move_lead_stage};

pub const STATUS_OPEN: &str = "open";
pub const STATUS_WON: &str = "won";
pub const STATUS_LOST: &str = "lost";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub title: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub source: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = pipelines)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = pipeline_stages)]
pub struct PipelineStage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = lead_stage_changes)]
pub struct LeadStageChange {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = lead_notes)]
pub struct LeadNote {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub title: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub source: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub title: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub owner_user_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub stage_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub pipeline_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct BoardColumn {
    pub stage: PipelineStage,
    pub leads: Vec<Lead>,
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Json<Lead>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let now = Utc::now();
    let phone = req
        .phone
        .as_deref()
        .and_then(|p| normalize_phone(p, &state.config.portal.default_country_code));

    let lead = Lead {
        id: Uuid::new_v4(),
        title: req.title,
        contact_name: req.contact_name,
        email: req.email,
        phone,
        status: STATUS_OPEN.to_string(),
        pipeline_id: req.pipeline_id,
        stage_id: req.stage_id,
        owner_user_id: Some(user.user_id),
        property_id: req.property_id,
        source: req.source,
        message: req.message,
        created_at: now,
        updated_at: now,
        closed_at: None,
    };

    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(lead))
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Lead>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = leads::table.into_boxed();

    if let Some(status) = query.status {
        q = q.filter(leads::status.eq(status));
    }
    if let Some(stage_id) = query.stage_id {
        q = q.filter(leads::stage_id.eq(stage_id));
    }
    if let Some(owner) = query.owner_user_id {
        q = q.filter(leads::owner_user_id.eq(owner));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            leads::title
                .ilike(pattern.clone())
                .or(leads::contact_name.ilike(pattern)),
        );
    }

    let rows: Vec<Lead> = q
        .order(leads::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let lead: Lead = leads::table
        .filter(leads::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Lead not found".to_string()))?;

    Ok(Json(lead))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<Lead>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let now = Utc::now();

    diesel::update(leads::table.filter(leads::id.eq(id)))
        .set(leads::updated_at.eq(now))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if let Some(title) = req.title {
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::title.eq(title))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(contact_name) = req.contact_name {
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::contact_name.eq(contact_name))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(email) = req.email {
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::email.eq(email))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(phone) = req.phone {
        let normalized = normalize_phone(&phone, &state.config.portal.default_country_code);
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::phone.eq(normalized))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(owner) = req.owner_user_id {
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::owner_user_id.eq(owner))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(property_id) = req.property_id {
        diesel::update(leads::table.filter(leads::id.eq(id)))
            .set(leads::property_id.eq(property_id))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_lead(State(state), Path(id)).await
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::delete(lead_stage_changes::table.filter(lead_stage_changes::lead_id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;
    diesel::delete(lead_notes::table.filter(lead_notes::lead_id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;
    diesel::delete(leads::table.filter(leads::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_pipelines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Pipeline>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<Pipeline> = pipelines::table
        .order(pipelines::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn list_pipeline_stages(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<Uuid>,
) -> Result<Json<Vec<PipelineStage>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<PipelineStage> = pipeline_stages::table
        .filter(pipeline_stages::pipeline_id.eq(pipeline_id))
        .order(pipeline_stages::position.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

/// Kanban view: every stage of the pipeline with its open leads, stage order
/// preserved.
pub async fn get_board(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<BoardColumn>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let stages: Vec<PipelineStage> = pipeline_stages::table
        .filter(pipeline_stages::pipeline_id.eq(query.pipeline_id))
        .order(pipeline_stages::position.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let open_leads: Vec<Lead> = leads::table
        .filter(leads::pipeline_id.eq(query.pipeline_id))
        .filter(leads::status.eq(STATUS_OPEN))
        .order(leads::updated_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let board = stages
        .into_iter()
        .map(|stage| {
            let leads = open_leads
                .iter()
                .filter(|l| l.stage_id == Some(stage.id))
                .cloned()
                .collect();
            BoardColumn { stage, leads }
        })
        .collect();

    Ok(Json(board))
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<LeadNote>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = leads::table
        .filter(leads::id.eq(lead_id))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Lead not found".to_string()));
    }

    let note = LeadNote {
        id: Uuid::new_v4(),
        lead_id,
        author_id: Some(user.user_id),
        content: req.content,
        created_at: Utc::now(),
    };

    diesel::insert_into(lead_notes::table)
        .values(&note)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(note))
}

pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<LeadNote>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let notes: Vec<LeadNote> = lead_notes::table
        .filter(lead_notes::lead_id.eq(lead_id))
        .order(lead_notes::created_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(notes))
}

pub async fn list_stage_history(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<LeadStageChange>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<LeadStageChange> = lead_stage_changes::table
        .filter(lead_stage_changes::lead_id.eq(lead_id))
        .order(lead_stage_changes::created_at.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leads", get(list_leads).post(create_lead))
        .route(
            "/api/leads/:id",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/api/leads/:id/finalize", post(finalize_lead))
        .route("/api/leads/:id/move", post(move_lead_stage))
        .route("/api/leads/:id/history", get(list_stage_history))
        .route("/api/leads/:id/notes", get(list_notes).post(create_note))
        .route("/api/leads/board", get(get_board))
        .route("/api/pipelines", get(list_pipelines))
        .route("/api/pipelines/:id/stages", get(list_pipeline_stages))
}
