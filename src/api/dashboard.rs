use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use super::AppState;
use super::organization::db_error;
use crate::middleware::{ANY_ROLE, ErrorResponse, require_role, require_session_from_headers};

// ============================================
// Response Types
// ============================================

#[derive(Debug, Serialize)]
pub struct DashboardStatsResponse {
    pub organization_id: Uuid,
    pub total_tasks: i64,
    pub todo_tasks: i64,
    pub in_progress_tasks: i64,
    pub done_tasks: i64,
    pub total_members: i64,
}

// ============================================
// Handlers
// ============================================

/// Task counts by status plus member count for the dashboard.
///
/// **Auth: Session Required** — any member role.
pub async fn get_dashboard_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
) -> Result<Json<DashboardStatsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    // Run both aggregate queries in parallel using tokio::join!
    let (task_result, member_result) = tokio::join!(
        sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_tasks,
                COUNT(*) FILTER (WHERE status = 'todo') AS todo_tasks,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress_tasks,
                COUNT(*) FILTER (WHERE status = 'done') AS done_tasks
            FROM task
            WHERE organization_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_one(&state.db),
        sqlx::query(
            r#"
            SELECT COUNT(*) AS total_members
            FROM organization_member
            WHERE organization_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_one(&state.db),
    );

    let task_row = task_result.map_err(db_error)?;
    let member_row = member_result.map_err(db_error)?;

    Ok(Json(DashboardStatsResponse {
        organization_id: org_id,
        total_tasks: task_row.get("total_tasks"),
        todo_tasks: task_row.get("todo_tasks"),
        in_progress_tasks: task_row.get("in_progress_tasks"),
        done_tasks: task_row.get("done_tasks"),
        total_members: member_row.get("total_members"),
    }))
}
