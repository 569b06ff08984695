use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::middleware::{
    ANY_ROLE, ErrorResponse, rate_limit_key, require_role, require_session_from_headers,
    too_many_requests,
};
use crate::models::organization::Organization;

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 120, message = "Organization name is required"))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ListOrganizationsResponse {
    pub organizations: Vec<Organization>,
}

fn organization_from_row(row: &sqlx::postgres::PgRow) -> Organization {
    Organization {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    }
}

// ============================================
// Handlers
// ============================================

/// Create an organization; the creator becomes its owner.
///
/// **Auth: Session Required** — rate limited per user.
pub async fn create_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<Json<Organization>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;

    let decision = state
        .limiter
        .check(
            &rate_limit_key("create-org", &user.user_id),
            state.rate_limits.create_org_limit,
            &state.rate_limits.create_org_window,
        )
        .await;
    if !decision.admitted {
        return Err(too_many_requests(&decision));
    }

    req.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid request", "VALIDATION_ERROR").with_details(e.to_string())),
        )
    })?;

    // Organization and owner membership land in one transaction so a
    // half-created org can never exist without an owner.
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let row = sqlx::query(
        r#"
        INSERT INTO organization (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(req.name.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create organization: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                "Failed to create organization",
                "DB_INSERT_FAILED",
            )),
        )
    })?;

    let org_id: Uuid = row.get("id");

    sqlx::query(
        "INSERT INTO organization_member (organization_id, user_id, role) VALUES ($1, $2, 'owner')",
    )
    .bind(org_id)
    .bind(&user.user_id)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(organization_id = %org_id, user_id = %user.user_id, "organization created");

    Ok(Json(organization_from_row(&row)))
}

/// List organizations the caller belongs to.
///
/// **Auth: Session Required**
pub async fn list_organizations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListOrganizationsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;

    let rows = sqlx::query(
        r#"
        SELECT o.id, o.name, o.created_at, o.updated_at
        FROM organization o
        JOIN organization_member om ON o.id = om.organization_id
        WHERE om.user_id = $1
        ORDER BY om.created_at DESC
        "#,
    )
    .bind(&user.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(ListOrganizationsResponse {
        organizations: rows.iter().map(organization_from_row).collect(),
    }))
}

/// Get a single organization.
///
/// **Auth: Session Required** — any member role.
pub async fn get_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Organization>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    let row = sqlx::query(
        r#"
        SELECT id, name, created_at, updated_at
        FROM organization
        WHERE id = $1
        "#,
    )
    .bind(org_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?;

    match row {
        Some(row) => Ok(Json(organization_from_row(&row))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Organization not found",
                "ORG_NOT_FOUND",
            )),
        )),
    }
}

pub(super) fn db_error(e: sqlx::Error) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            format!("Database error: {}", e),
            "DB_ERROR",
        )),
    )
}
