//! Lead lifecycle state machine.
//!
//! A lead's status moves `open -> won` or `open -> lost`, never back. The
//! guard lives at the application level (no database constraint), so every
//! mutation funnels through the pure checks here before touching diesel.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::warn;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::errors::ApiError;
use crate::shared::schema::{lead_stage_changes, leads, pipeline_stages};
use crate::shared::state::AppState;

use super::{Lead, LeadStageChange, PipelineStage, STATUS_LOST, STATUS_OPEN, STATUS_WON};

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub stage_id: Uuid,
}

/// Terminal-transition guard: only `open -> won|lost` is legal.
pub fn finalize_guard(current_status: &str, target_status: &str) -> Result<(), ApiError> {
    if target_status != STATUS_WON && target_status != STATUS_LOST {
        return Err(ApiError::BadRequest(format!(
            "Invalid target status '{target_status}', expected 'won' or 'lost'"
        )));
    }
    if current_status != STATUS_OPEN {
        return Err(ApiError::InvalidState(format!(
            "Lead is already finalized as '{current_status}'"
        )));
    }
    Ok(())
}

/// A move onto the lead's current stage changes nothing and must leave no
/// audit row behind.
pub fn is_noop_move(current_stage: Option<Uuid>, target_stage: Uuid) -> bool {
    current_stage == Some(target_stage)
}

/// Only the owning user may finalize a lead; admins may finalize any.
pub fn ownership_guard(owner: Option<Uuid>, caller: &AuthenticatedUser) -> Result<(), ApiError> {
    if caller.is_admin {
        return Ok(());
    }
    match owner {
        Some(owner_id) if owner_id == caller.user_id => Ok(()),
        _ => Err(ApiError::Forbidden(
            "Only the lead owner can finalize this lead".to_string(),
        )),
    }
}

/// Finalize a lead as won or lost. The status flip, the jump to the
/// pipeline's last stage and the audit row commit in one transaction.
pub async fn finalize_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<FinalizeRequest>,
) -> Result<Json<Lead>, ApiError> {
    let mut conn = state.conn.get()?;

    let lead = conn.transaction::<Lead, ApiError, _>(|conn| {
        let lead: Lead = leads::table
            .filter(leads::id.eq(id))
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;

        ownership_guard(lead.owner_user_id, &user)?;
        finalize_guard(&lead.status, &req.status)?;

        let pipeline_id = lead
            .pipeline_id
            .ok_or_else(|| ApiError::NotFound("Lead has no pipeline".to_string()))?;

        let last_stage: PipelineStage = pipeline_stages::table
            .filter(pipeline_stages::pipeline_id.eq(pipeline_id))
            .order(pipeline_stages::position.desc())
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Pipeline has no stages".to_string()))?;

        let now = Utc::now();
        diesel::update(leads::table.filter(leads::id.eq(lead.id)))
            .set((
                leads::status.eq(&req.status),
                leads::stage_id.eq(last_stage.id),
                leads::closed_at.eq(Some(now)),
                leads::updated_at.eq(now),
            ))
            .execute(conn)?;

        let audit = LeadStageChange {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            from_stage_id: lead.stage_id,
            to_stage_id: last_stage.id,
            changed_by: Some(user.user_id),
            created_at: now,
        };
        diesel::insert_into(lead_stage_changes::table)
            .values(&audit)
            .execute(conn)?;

        let updated: Lead = leads::table.filter(leads::id.eq(lead.id)).first(conn)?;
        Ok(updated)
    })?;

    Ok(Json(lead))
}

/// Kanban move. Moving a lead onto its current stage is a no-op and writes no
/// audit row. The audit append after a real move is best-effort: a failure is
/// logged and the move stands (at-most-once audit trail).
pub async fn move_lead_stage(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Lead>, ApiError> {
    let mut conn = state.conn.get()?;

    let lead: Lead = leads::table
        .filter(leads::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;

    if lead.status != STATUS_OPEN {
        return Err(ApiError::InvalidState(format!(
            "Cannot move a lead finalized as '{}'",
            lead.status
        )));
    }

    if is_noop_move(lead.stage_id, req.stage_id) {
        return Ok(Json(lead));
    }

    let stage: PipelineStage = pipeline_stages::table
        .filter(pipeline_stages::id.eq(req.stage_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Stage not found".to_string()))?;

    let now = Utc::now();
    diesel::update(leads::table.filter(leads::id.eq(lead.id)))
        .set((
            leads::pipeline_id.eq(stage.pipeline_id),
            leads::stage_id.eq(stage.id),
            leads::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let audit = LeadStageChange {
        id: Uuid::new_v4(),
        lead_id: lead.id,
        from_stage_id: lead.stage_id,
        to_stage_id: stage.id,
        changed_by: Some(user.user_id),
        created_at: now,
    };
    if let Err(e) = diesel::insert_into(lead_stage_changes::table)
        .values(&audit)
        .execute(&mut conn)
    {
        warn!("stage move audit append failed for lead {}: {e}", lead.id);
    }

    let updated: Lead = leads::table.filter(leads::id.eq(lead.id)).first(&mut conn)?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_user(id: Uuid) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: id,
            email: None,
            is_admin: false,
        }
    }

    #[test]
    fn open_lead_can_be_won_or_lost() {
        assert!(finalize_guard(STATUS_OPEN, STATUS_WON).is_ok());
        assert!(finalize_guard(STATUS_OPEN, STATUS_LOST).is_ok());
    }

    #[test]
    fn finalized_lead_rejects_further_transitions() {
        for current in [STATUS_WON, STATUS_LOST] {
            for target in [STATUS_WON, STATUS_LOST] {
                match finalize_guard(current, target) {
                    Err(ApiError::InvalidState(_)) => {}
                    other => panic!("expected InvalidState, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn unknown_target_status_is_bad_request() {
        match finalize_guard(STATUS_OPEN, "reopened") {
            Err(ApiError::BadRequest(_)) => {}
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn move_onto_current_stage_is_a_noop() {
        let stage = Uuid::new_v4();
        assert!(is_noop_move(Some(stage), stage));
    }

    #[test]
    fn move_to_another_stage_is_not_a_noop() {
        let stage = Uuid::new_v4();
        assert!(!is_noop_move(Some(Uuid::new_v4()), stage));
        assert!(!is_noop_move(None, stage));
    }

    #[test]
    fn owner_passes_ownership_guard() {
        let id = Uuid::new_v4();
        assert!(ownership_guard(Some(id), &owner_user(id)).is_ok());
    }

    #[test]
    fn non_owner_is_forbidden() {
        let caller = owner_user(Uuid::new_v4());
        match ownership_guard(Some(Uuid::new_v4()), &caller) {
            Err(ApiError::Forbidden(_)) => {}
            other => panic!("expected Forbidden, got {other:?}"),
        }
        match ownership_guard(None, &caller) {
            Err(ApiError::Forbidden(_)) => {}
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn admin_bypasses_ownership() {
        let admin = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: None,
            is_admin: true,
        };
        assert!(ownership_guard(Some(Uuid::new_v4()), &admin).is_ok());
        assert!(ownership_guard(None, &admin).is_ok());
    }
}
