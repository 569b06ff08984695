use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use super::organization::db_error;
use crate::middleware::{ANY_ROLE, ErrorResponse, require_role, require_session_from_headers};
use crate::models::task::{TaskPriority, TaskStatus};

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub assigned_to_id: Option<String>,
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    /// Keyset cursor: pass the `id` of the last item from the previous page.
    pub cursor: Option<Uuid>,

    /// Items per page (1..=100)
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct AssigneeInfo {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: Option<AssigneeInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub items: Vec<TaskResponse>,
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeleteTaskResponse {
    pub success: bool,
}

const TASK_COLUMNS: &str = r#"
    t.id, t.organization_id, t.title, t.description, t.status, t.priority,
    t.assigned_to_id, t.created_at, t.updated_at,
    u.name AS assignee_name, u.email AS assignee_email
"#;

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<TaskResponse, (StatusCode, Json<ErrorResponse>)> {
    let status_raw: String = row.get("status");
    let priority_raw: String = row.get("priority");

    let (Some(status), Some(priority)) = (
        TaskStatus::parse(&status_raw),
        TaskPriority::parse(&priority_raw),
    ) else {
        tracing::error!(status = %status_raw, priority = %priority_raw, "unknown task enum value");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Database error", "DB_ERROR")),
        ));
    };

    let assigned_to_id: Option<String> = row.get("assigned_to_id");
    let assigned_to = assigned_to_id.map(|id| AssigneeInfo {
        id,
        name: row.get("assignee_name"),
        email: row.get::<Option<String>, _>("assignee_email").unwrap_or_default(),
    });

    Ok(TaskResponse {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        title: row.get("title"),
        description: row.get("description"),
        status,
        priority,
        assigned_to,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    })
}

fn validation_error(e: validator::ValidationErrors) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("Invalid request", "VALIDATION_ERROR").with_details(e.to_string())),
    )
}

fn task_not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Task not found", "TASK_NOT_FOUND")),
    )
}

// ============================================
// Handlers
// ============================================

/// Create a task in the organization.
///
/// **Auth: Session Required** — any member role.
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    req.validate().map_err(validation_error)?;

    let sql = format!(
        r#"
        WITH inserted AS (
            INSERT INTO task (organization_id, title, description, status, priority, assigned_to_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        )
        SELECT {TASK_COLUMNS}
        FROM inserted t
        LEFT JOIN "user" u ON t.assigned_to_id = u.id
        "#
    );

    let row = sqlx::query(&sql)
        .bind(org_id)
        .bind(req.title.trim())
        .bind(&req.description)
        .bind(req.status.as_str())
        .bind(req.priority.as_str())
        .bind(&req.assigned_to_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create task: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create task", "DB_INSERT_FAILED")),
            )
        })?;

    Ok(Json(task_from_row(&row)?))
}

/// List tasks in the organization, newest first, keyset-paginated.
///
/// **Auth: Session Required** — any member role.
pub async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<ListTasksResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    let limit = params.limit.clamp(1, 100);

    let sql = format!(
        r#"
        SELECT {TASK_COLUMNS}
        FROM task t
        LEFT JOIN "user" u ON t.assigned_to_id = u.id
        WHERE t.organization_id = $1
          AND ($2::uuid IS NULL
               OR (t.created_at, t.id) < (SELECT created_at, id FROM task WHERE id = $2))
        ORDER BY t.created_at DESC, t.id DESC
        LIMIT $3
        "#
    );

    // Fetch one extra row to learn whether another page exists.
    let mut rows = sqlx::query(&sql)
        .bind(org_id)
        .bind(params.cursor)
        .bind(limit + 1)
        .fetch_all(&state.db)
        .await
        .map_err(db_error)?;

    let next_cursor = if rows.len() as i64 > limit {
        rows.truncate(limit as usize);
        rows.last().map(|r| r.get("id"))
    } else {
        None
    };

    let items = rows
        .iter()
        .map(task_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ListTasksResponse { items, next_cursor }))
}

/// Get a single task. 404 when it does not exist in this organization.
///
/// **Auth: Session Required** — any member role.
pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    let sql = format!(
        r#"
        SELECT {TASK_COLUMNS}
        FROM task t
        LEFT JOIN "user" u ON t.assigned_to_id = u.id
        WHERE t.id = $1 AND t.organization_id = $2
        "#
    );

    let row = sqlx::query(&sql)
        .bind(task_id)
        .bind(org_id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?;

    match row {
        Some(row) => Ok(Json(task_from_row(&row)?)),
        None => Err(task_not_found()),
    }
}

/// Partially update a task. 404 when it does not exist in this organization.
///
/// **Auth: Session Required** — any member role.
pub async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    req.validate().map_err(validation_error)?;

    let sql = format!(
        r#"
        WITH updated AS (
            UPDATE task SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                priority = COALESCE($6, priority),
                assigned_to_id = COALESCE($7, assigned_to_id),
                updated_at = NOW()
            WHERE id = $1 AND organization_id = $2
            RETURNING *
        )
        SELECT {TASK_COLUMNS}
        FROM updated t
        LEFT JOIN "user" u ON t.assigned_to_id = u.id
        "#
    );

    let row = sqlx::query(&sql)
        .bind(task_id)
        .bind(org_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.status.map(|s| s.as_str()))
        .bind(req.priority.map(|p| p.as_str()))
        .bind(&req.assigned_to_id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?;

    match row {
        Some(row) => Ok(Json(task_from_row(&row)?)),
        None => Err(task_not_found()),
    }
}

/// Delete a task. 404 when it does not exist in this organization.
///
/// **Auth: Session Required** — any member role.
pub async fn delete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeleteTaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    let result = sqlx::query("DELETE FROM task WHERE id = $1 AND organization_id = $2")
        .bind(task_id)
        .bind(org_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(task_not_found());
    }

    Ok(Json(DeleteTaskResponse { success: true }))
}
