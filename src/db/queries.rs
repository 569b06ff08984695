use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::middleware::authz::{Membership, Role};

/// Look up the membership row for `(organization_id, user_id)`. The schema
/// guarantees at most one row per pair. Membership lifecycle is owned by the
/// organization and invitation handlers; this module only reads.
pub async fn find_membership(
    pool: &PgPool,
    organization_id: Uuid,
    user_id: &str,
) -> Result<Option<Membership>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT organization_id, user_id, role, created_at
        FROM organization_member
        WHERE organization_id = $1
          AND user_id = $2
        "#,
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let role_raw: String = row.get("role");
    let role = Role::parse(&role_raw).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown role '{}' in organization_member", role_raw).into())
    })?;

    Ok(Some(Membership {
        organization_id: row.get("organization_id"),
        user_id: row.get("user_id"),
        role,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    }))
}
