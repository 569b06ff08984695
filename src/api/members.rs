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
use crate::middleware::{
    ANY_ROLE, ErrorResponse, Role, rate_limit_key, require_role, require_session_from_headers,
    too_many_requests,
};
use crate::utils::{generate_invite_token, hash_invite_token, invite_expiry};

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Serialize)]
pub struct MemberItem {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub role: Role,
    /// True while the invitation has not been accepted yet.
    pub pending: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListMembersResponse {
    pub members: Vec<MemberItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct InviteMemberResponse {
    /// Raw invite token for the invitation link; only its hash is stored.
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteParams {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AcceptInviteResponse {
    pub organization_id: Uuid,
    pub organization_name: String,
}

// ============================================
// Handlers
// ============================================

/// List members of an organization with their user info.
///
/// **Auth: Session Required** — any member role.
pub async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ListMembersResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &ANY_ROLE).await?;

    let rows = sqlx::query(
        r#"
        SELECT
            om.user_id,
            om.role,
            om.created_at,
            (om.invite_token_hash IS NOT NULL) AS pending,
            u.email,
            u.name,
            u.image
        FROM organization_member om
        JOIN "user" u ON om.user_id = u.id
        WHERE om.organization_id = $1
        ORDER BY om.created_at DESC
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    let mut members = Vec::with_capacity(rows.len());
    for row in &rows {
        let role_raw: String = row.get("role");
        let role = Role::parse(&role_raw).ok_or_else(|| {
            tracing::error!(role = %role_raw, "unknown role in organization_member");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error", "DB_ERROR")),
            )
        })?;

        members.push(MemberItem {
            user_id: row.get("user_id"),
            email: row.get("email"),
            name: row.get("name"),
            image: row.get("image"),
            role,
            pending: row.get("pending"),
            joined_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        });
    }

    Ok(Json(ListMembersResponse { members }))
}

/// Invite a user to the organization by email.
///
/// **Auth: Session Required** — owner or admin; rate limited per user.
/// Creates the user row for unknown emails, then a membership row carrying
/// a hashed invite token with a 24-hour expiry.
pub async fn invite_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<InviteMemberRequest>,
) -> Result<Json<InviteMemberResponse>, (StatusCode, Json<ErrorResponse>)> {
    let user = require_session_from_headers(&state.db, &headers).await?;
    require_role(&state.db, org_id, &user.user_id, &[Role::Owner, Role::Admin]).await?;

    let decision = state
        .limiter
        .check(
            &rate_limit_key("invite", &user.user_id),
            state.rate_limits.invite_limit,
            &state.rate_limits.invite_window,
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

    let email = req.email.trim().to_lowercase();

    // Find or create the invited user. They set up credentials with the
    // auth layer when accepting.
    let existing = sqlx::query(r#"SELECT id FROM "user" WHERE email = $1"#)
        .bind(&email)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?;

    let invited_user_id: String = match existing {
        Some(row) => row.get("id"),
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(r#"INSERT INTO "user" (id, email) VALUES ($1, $2)"#)
                .bind(&id)
                .bind(&email)
                .execute(&state.db)
                .await
                .map_err(db_error)?;
            id
        }
    };

    let already_member = sqlx::query(
        r#"
        SELECT 1 AS present
        FROM organization_member
        WHERE organization_id = $1 AND user_id = $2
        "#,
    )
    .bind(org_id)
    .bind(&invited_user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?;

    if already_member.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "User is already a member of this organization",
                "ALREADY_MEMBER",
            )),
        ));
    }

    let token = generate_invite_token();
    let expires_at = invite_expiry();

    sqlx::query(
        r#"
        INSERT INTO organization_member
            (organization_id, user_id, role, invite_token_hash, invite_token_expires)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(org_id)
    .bind(&invited_user_id)
    .bind(req.role.as_str())
    .bind(hash_invite_token(&token))
    .bind(expires_at.naive_utc())
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    tracing::info!(
        organization_id = %org_id,
        invited_by = %user.user_id,
        role = req.role.as_str(),
        "member invited"
    );

    Ok(Json(InviteMemberResponse {
        token,
        email,
        expires_at,
    }))
}

/// Accept an invitation. The token must exist, be unexpired, and belong to
/// the authenticated user's email; accepting clears it.
///
/// **Auth: Session Required**
pub async fn accept_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AcceptInviteParams>,
) -> Result<Json<AcceptInviteResponse>, (StatusCode, Json<ErrorResponse>)> {
    let token = match params.token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Token is required", "TOKEN_REQUIRED")),
            ));
        }
    };

    let user = require_session_from_headers(&state.db, &headers).await?;
    let token_hash = hash_invite_token(&token);

    let row = sqlx::query(
        r#"
        SELECT
            om.organization_id,
            om.invite_token_expires,
            o.name AS organization_name,
            u.email AS invited_email
        FROM organization_member om
        JOIN organization o ON om.organization_id = o.id
        JOIN "user" u ON om.user_id = u.id
        WHERE om.invite_token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?;

    let row = row.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Invalid invite token", "INVALID_TOKEN")),
        )
    })?;

    let expires: Option<chrono::NaiveDateTime> = row.get("invite_token_expires");
    if let Some(expires) = expires {
        if expires.and_utc() < Utc::now() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "Invite token has expired",
                    "TOKEN_EXPIRED",
                )),
            ));
        }
    }

    let invited_email: String = row.get("invited_email");
    if invited_email != user.email {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse::new(
                "This invitation was issued to a different email address",
                "EMAIL_MISMATCH",
            )),
        ));
    }

    sqlx::query(
        r#"
        UPDATE organization_member
        SET invite_token_hash = NULL, invite_token_expires = NULL
        WHERE invite_token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(AcceptInviteResponse {
        organization_id: row.get("organization_id"),
        organization_name: row.get("organization_name"),
    }))
}
