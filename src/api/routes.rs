use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::AppState;
use super::{auth, dashboard, members, organization, tasks};

/// V1 API routes
///
/// ## Public Routes (no auth required)
/// - POST /auth/verify - Verify session token (used by the frontend server)
///
/// ## Organizations (Session Required)
/// - POST /orgs - Create organization (rate limited per user)
/// - GET  /orgs - List organizations the caller belongs to
/// - GET  /orgs/{org_id} - Get one organization (member)
/// - GET  /orgs/{org_id}/stats - Task/member counts for the dashboard (member)
///
/// ## Members & Invitations (Session Required)
/// - GET  /orgs/{org_id}/members - List members (member)
/// - POST /orgs/{org_id}/invites - Invite a user by email (owner/admin, rate limited)
/// - POST /invites/accept - Accept an invitation by token
///
/// ## Tasks (Session Required, member of the organization)
/// - POST   /orgs/{org_id}/tasks - Create task
/// - GET    /orgs/{org_id}/tasks - List tasks (cursor pagination)
/// - GET    /orgs/{org_id}/tasks/{task_id} - Get task
/// - PUT    /orgs/{org_id}/tasks/{task_id} - Update task
/// - DELETE /orgs/{org_id}/tasks/{task_id} - Delete task
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        // ========================================
        // Public: Auth verification
        // ========================================
        .route("/auth/verify", post(auth::verify_session))
        // ========================================
        // Organizations: Session auth
        // ========================================
        .route("/orgs", post(organization::create_organization))
        .route("/orgs", get(organization::list_organizations))
        .route("/orgs/{org_id}", get(organization::get_organization))
        .route("/orgs/{org_id}/stats", get(dashboard::get_dashboard_stats))
        // ========================================
        // Members & Invitations: Session auth
        // ========================================
        .route("/orgs/{org_id}/members", get(members::list_members))
        .route("/orgs/{org_id}/invites", post(members::invite_member))
        .route("/invites/accept", post(members::accept_invite))
        // ========================================
        // Tasks: Session auth + membership
        // ========================================
        .route("/orgs/{org_id}/tasks", post(tasks::create_task))
        .route("/orgs/{org_id}/tasks", get(tasks::list_tasks))
        .route("/orgs/{org_id}/tasks/{task_id}", get(tasks::get_task))
        .route("/orgs/{org_id}/tasks/{task_id}", put(tasks::update_task))
        .route("/orgs/{org_id}/tasks/{task_id}", delete(tasks::delete_task))
}
