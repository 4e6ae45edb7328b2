use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::schema::campaign_tasks;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = campaign_tasks)]
pub struct CampaignTask {
    pub id: Uuid,
    pub campaign: String,
    pub property_id: Option<Uuid>,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub done_at: Option<DateTime<Utc>>,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub campaign: String,
    pub title: String,
    pub property_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub campaign: Option<String>,
    pub pending_only: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct CampaignMetrics {
    pub pending: i64,
    pub overdue: i64,
    pub done: i64,
}

#[derive(Debug, PartialEq)]
pub enum TaskBucket {
    Pending,
    Overdue,
    Done,
}

/// A done task stays done; an undone task with a due date in the past is
/// overdue, everything else is pending (no due date never goes overdue).
pub fn bucket_task(due_date: Option<NaiveDate>, done: bool, today: NaiveDate) -> TaskBucket {
    if done {
        return TaskBucket::Done;
    }
    match due_date {
        Some(due) if due < today => TaskBucket::Overdue,
        _ => TaskBucket::Pending,
    }
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<CampaignTask>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task = CampaignTask {
        id: Uuid::new_v4(),
        campaign: req.campaign,
        property_id: req.property_id,
        title: req.title,
        due_date: req.due_date,
        done_at: None,
        assignee_id: req.assignee_id,
        created_at: Utc::now(),
    };

    diesel::insert_into(campaign_tasks::table)
        .values(&task)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(task))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CampaignTask>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0);

    let mut q = campaign_tasks::table.into_boxed();
    if let Some(campaign) = query.campaign {
        q = q.filter(campaign_tasks::campaign.eq(campaign));
    }
    if query.pending_only.unwrap_or(false) {
        q = q.filter(campaign_tasks::done_at.is_null());
    }

    let rows: Vec<CampaignTask> = q
        .order(campaign_tasks::due_date.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

/// Stamp `done_at`. Completing an already-done task keeps the original stamp.
pub async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignTask>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let task: CampaignTask = campaign_tasks::table
        .filter(campaign_tasks::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Task not found".to_string()))?;

    if task.done_at.is_none() {
        diesel::update(campaign_tasks::table.filter(campaign_tasks::id.eq(id)))
            .set(campaign_tasks::done_at.eq(Some(Utc::now())))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    let updated: CampaignTask = campaign_tasks::table
        .filter(campaign_tasks::id.eq(id))
        .first(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(updated))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::delete(campaign_tasks::table.filter(campaign_tasks::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<String, CampaignMetrics>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<(String, Option<NaiveDate>, Option<DateTime<Utc>>)> = campaign_tasks::table
        .select((
            campaign_tasks::campaign,
            campaign_tasks::due_date,
            campaign_tasks::done_at,
        ))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let today = Utc::now().date_naive();
    let mut metrics: BTreeMap<String, CampaignMetrics> = BTreeMap::new();
    for (campaign, due_date, done_at) in rows {
        let entry = metrics.entry(campaign).or_default();
        match bucket_task(due_date, done_at.is_some(), today) {
            TaskBucket::Pending => entry.pending += 1,
            TaskBucket::Overdue => entry.overdue += 1,
            TaskBucket::Done => entry.done += 1,
        }
    }

    Ok(Json(metrics))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/campaigns/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/campaigns/tasks/:id",
            axum::routing::delete(delete_task),
        )
        .route("/api/campaigns/tasks/:id/complete", post(complete_task))
        .route("/api/campaigns/metrics", get(get_metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn done_tasks_stay_done_even_when_overdue() {
        let today = day(2026, 8, 30);
        assert_eq!(bucket_task(Some(day(2026, 1, 1)), true, today), TaskBucket::Done);
    }

    #[test]
    fn past_due_pending_task_is_overdue() {
        let today = day(2026, 8, 30);
        assert_eq!(
            bucket_task(Some(day(2026, 8, 29)), false, today),
            TaskBucket::Overdue
        );
    }

    #[test]
    fn due_today_or_later_is_pending() {
        let today = day(2026, 8, 30);
        assert_eq!(
            bucket_task(Some(day(2026, 8, 30)), false, today),
            TaskBucket::Pending
        );
        assert_eq!(
            bucket_task(Some(day(2026, 9, 15)), false, today),
            TaskBucket::Pending
        );
    }

    #[test]
    fn undated_task_never_goes_overdue() {
        let today = day(2026, 8, 30);
        assert_eq!(bucket_task(None, false, today), TaskBucket::Pending);
    }
}
