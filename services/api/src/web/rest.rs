//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::auth::callbacks::{Session, SessionUser};
use crate::error::RouteError;
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use univbot_core::domain::{NewUser, User};
use univbot_core::ports::PortError;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// `GET /api/users` never returns more than this many records.
pub const USER_LIST_LIMIT: usize = 10;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        test_db_handler,
        list_users_handler,
        create_user_handler,
        profile_handler,
    ),
    components(
        schemas(
            TestDbResponse,
            UserView,
            UserListResponse,
            CreateUserRequest,
            CreatedUser,
            CreateUserResponse,
            ProfileResponse,
            ProfileSession,
            SessionUser,
            Session,
        )
    ),
    tags(
        (name = "UnivBot API", description = "User and profile endpoints of the university assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct TestDbResponse {
    success: bool,
    message: String,
    timestamp: DateTime<Utc>,
}

/// A stored user as listed by `GET /api/users`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    id: Uuid,
    email: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    last_active: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            student_id: user.student_id,
            department: user.department,
            image: user.image,
            last_active: user.last_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserListResponse {
    success: bool,
    data: Vec<UserView>,
    count: usize,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    email: Option<String>,
    name: Option<String>,
    student_id: Option<String>,
    department: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    id: Uuid,
    email: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    department: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CreateUserResponse {
    success: bool,
    message: String,
    data: CreatedUser,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileSession {
    expires: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    success: bool,
    user: SessionUser,
    session: ProfileSession,
}

impl From<Session> for ProfileResponse {
    fn from(session: Session) -> Self {
        Self {
            success: true,
            user: session.user,
            session: ProfileSession {
                expires: session.expires,
            },
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Check that the data store is reachable.
#[utoipa::path(
    get,
    path = "/api/test-db",
    responses(
        (status = 200, description = "Database reachable", body = TestDbResponse),
        (status = 500, description = "Database unreachable")
    )
)]
pub async fn test_db_handler(State(app_state): State<Arc<AppState>>) -> Response {
    match app_state.db.ping().await {
        Ok(()) => Json(TestDbResponse {
            success: true,
            message: "Database connection successful!".to_string(),
            timestamp: Utc::now(),
        })
        .into_response(),
        Err(e) => {
            error!("Database connection error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Database connection failed",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// List up to ten users.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users fetched", body = UserListResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<UserListResponse>, RouteError> {
    let users = app_state
        .db
        .list_users(USER_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!("Error fetching users: {:?}", e);
            RouteError::Internal("Failed to fetch users".to_string())
        })?;

    let data: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(Json(UserListResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

fn already_exists() -> RouteError {
    RouteError::Conflict("User with this email already exists".to_string())
}

/// Register a user.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = CreateUserResponse),
        (status = 400, description = "Email or name missing"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_user_handler(
    State(app_state): State<Arc<AppState>>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUserResponse>), RouteError> {
    let Json(req) = body.map_err(|e| {
        warn!("Rejected user payload: {}", e);
        RouteError::Validation("Invalid request body".to_string())
    })?;

    // 1. Validate required fields
    let new_user = NewUser::new(
        req.email.as_deref().unwrap_or_default(),
        req.name.as_deref().unwrap_or_default(),
    )
    .ok_or_else(|| RouteError::Validation("Email and name are required".to_string()))?
    .with_student_id(req.student_id.as_deref())
    .with_department(req.department.as_deref());

    // 2. Check if user already exists
    let existing = app_state
        .db
        .get_user_by_email(&new_user.email)
        .await
        .map_err(|e| {
            error!("Error creating user: {:?}", e);
            RouteError::Internal("Failed to create user".to_string())
        })?;
    if existing.is_some() {
        return Err(already_exists());
    }

    // 3. Insert; the unique index still decides concurrent duplicates
    let user = app_state
        .db
        .create_user(new_user)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => already_exists(),
            e => {
                error!("Error creating user: {:?}", e);
                RouteError::Internal("Failed to create user".to_string())
            }
        })?;

    let response = CreateUserResponse {
        success: true,
        message: "User created successfully".to_string(),
        data: CreatedUser {
            id: user.id,
            email: user.email,
            name: user.name,
            student_id: user.student_id,
            department: user.department,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// The signed-in user's profile.
#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Current profile", body = ProfileResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn profile_handler(State(app_state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match app_state.auth.get_session(&headers) {
        Some(session) => Json(ProfileResponse::from(session)).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response(),
    }
}
