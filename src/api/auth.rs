use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::AppState;

/// Verify a session token issued by the external auth layer.
/// Called by the frontend server to validate sessions.
#[derive(Debug, Deserialize)]
pub struct VerifySessionRequest {
    pub session_token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifySessionResponse {
    pub valid: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn verify_session(
    State(state): State<AppState>,
    Json(req): Json<VerifySessionRequest>,
) -> Json<VerifySessionResponse> {
    let session = sqlx::query(
        r#"
        SELECT
            s.id,
            s.user_id,
            s.expires_at,
            u.email
        FROM session s
        JOIN "user" u ON s.user_id = u.id
        WHERE s.token = $1 AND s.expires_at > NOW()
        "#,
    )
    .bind(&req.session_token)
    .fetch_optional(&state.db)
    .await;

    match session {
        Ok(Some(row)) => {
            let user_id: String = row.get("user_id");
            let email: Option<String> = row.get("email");
            let expires_at: chrono::NaiveDateTime = row.get("expires_at");

            Json(VerifySessionResponse {
                valid: true,
                user_id: Some(user_id),
                email,
                expires_at: Some(expires_at.and_utc()),
            })
        }
        _ => Json(VerifySessionResponse {
            valid: false,
            user_id: None,
            email: None,
            expires_at: None,
        }),
    }
}
