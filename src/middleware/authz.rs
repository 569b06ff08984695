// ============================================
// Role Authorization Gate
// ============================================
//
// Confirms the caller holds a membership row for the target organization
// with a role in the allowed set, before any business logic runs. The
// membership is re-read on every call — roles can change between requests,
// and stale authorization is a security defect. The organization id always
// comes from the request, never from session state, because one session may
// act on several organizations.

use axum::{Json, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::queries::find_membership;
use crate::middleware::ErrorResponse;

/// Closed role set, validated once at the database boundary. Privilege
/// ordering (owner above admin above member) is a call-site concern; the
/// gate itself only does set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

/// Allowed set for operations any member may perform.
pub const ANY_ROLE: [Role; 3] = [Role::Owner, Role::Admin, Role::Member];

#[derive(Debug, Clone, Serialize)]
pub struct Membership {
    pub organization_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Not a member of this organization")]
    NotMember,
    #[error("Insufficient permissions")]
    InsufficientRole { role: Role },
    /// Membership could not be read; the gate fails closed.
    #[error("Membership lookup failed: {0}")]
    Store(#[from] sqlx::Error),
}

/// Pure allowed-set evaluation over an already-fetched membership.
pub fn evaluate(
    membership: Option<Membership>,
    allowed_roles: &[Role],
) -> Result<Membership, AuthzError> {
    let membership = membership.ok_or(AuthzError::NotMember)?;

    if !allowed_roles.contains(&membership.role) {
        return Err(AuthzError::InsufficientRole {
            role: membership.role,
        });
    }

    Ok(membership)
}

/// Fetch the caller's membership for the organization and require a role in
/// the allowed set. Returns the membership so handlers can attach role
/// context to later logic.
pub async fn require_role(
    db: &PgPool,
    organization_id: Uuid,
    user_id: &str,
    allowed_roles: &[Role],
) -> Result<Membership, AuthzError> {
    let membership = find_membership(db, organization_id, user_id).await?;
    evaluate(membership, allowed_roles)
}

impl From<AuthzError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "Not a member of this organization",
                    "NOT_A_MEMBER",
                )),
            ),
            AuthzError::InsufficientRole { role } => (
                StatusCode::FORBIDDEN,
                Json(
                    ErrorResponse::new("Insufficient permissions", "INSUFFICIENT_ROLE")
                        .with_details(format!("Current role: {}", role.as_str())),
                ),
            ),
            AuthzError::Store(e) => {
                tracing::error!("Membership lookup failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Database error", "DB_ERROR")),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(role: Role) -> Membership {
        Membership {
            organization_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_membership_is_not_member() {
        let result = evaluate(None, &[Role::Owner]);
        assert!(matches!(result, Err(AuthzError::NotMember)));
    }

    #[test]
    fn member_outside_allowed_set_is_insufficient() {
        let result = evaluate(Some(membership(Role::Member)), &[Role::Owner]);
        assert!(matches!(
            result,
            Err(AuthzError::InsufficientRole { role: Role::Member })
        ));
    }

    #[test]
    fn member_in_allowed_set_passes_and_keeps_role() {
        let result = evaluate(Some(membership(Role::Admin)), &[Role::Owner, Role::Admin]);
        assert_eq!(result.unwrap().role, Role::Admin);
    }

    #[test]
    fn owner_passes_owner_admin_set() {
        let result = evaluate(Some(membership(Role::Owner)), &[Role::Admin, Role::Owner]);
        assert_eq!(result.unwrap().role, Role::Owner);
    }

    #[test]
    fn any_role_set_admits_every_role() {
        for role in [Role::Owner, Role::Admin, Role::Member] {
            assert!(evaluate(Some(membership(role)), &ANY_ROLE).is_ok());
        }
    }

    #[test]
    fn role_parses_db_text_only() {
        assert_eq!(Role::parse("owner"), Some(Role::Owner));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("member"), Some(Role::Member));
        assert_eq!(Role::parse("OWNER"), None);
        assert_eq!(Role::parse("superuser"), None);
    }
}
