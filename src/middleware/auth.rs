use axum::{
    Json,
    http::{StatusCode, header},
};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
}

#[derive(Serialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

async fn validate_session(db: &PgPool, token: &str) -> Result<AuthenticatedUser, String> {
    let result = sqlx::query(
        r#"
        SELECT
            s.user_id,
            u.email
        FROM session s
        JOIN "user" u ON s.user_id = u.id
        WHERE s.token = $1
          AND s.expires_at > NOW()
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await;

    match result {
        Ok(Some(row)) => {
            use sqlx::Row;
            Ok(AuthenticatedUser {
                user_id: row.get("user_id"),
                email: row.get("email"),
            })
        }
        Ok(None) => Err("Invalid or expired session".to_string()),
        Err(e) => Err(format!("Database error: {}", e)),
    }
}

pub async fn require_session_from_headers(
    db: &PgPool,
    headers: &axum::http::HeaderMap,
) -> Result<AuthenticatedUser, (StatusCode, Json<ErrorResponse>)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));

    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "Session token required. Please log in.",
                    "SESSION_REQUIRED",
                )),
            ));
        }
    };

    validate_session(db, token).await.map_err(|err| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(err, "SESSION_INVALID")),
        )
    })
}
