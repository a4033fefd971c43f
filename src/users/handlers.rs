use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderName, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    state::AppState,
    users::dto::{CreateUserRequest, UpdateUserRequest, UserResponse},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user).put(update_user))
}

// Only the hyphenated form we hand out names a user; anything else is absent.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    let parsed = if raw.len() == 36 { Uuid::parse_str(raw).ok() } else { None };
    parsed.ok_or_else(|| {
        warn!(id = %raw, "malformed user id");
        ApiError::NotFound
    })
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<UserResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "undecodable create body");
        ApiError::from(e)
    })?;

    if let Err(e) = payload.validate() {
        warn!(error = %e, "create rejected");
        return Err(e.into());
    }

    let user = match state.users.create_user(payload.into()).await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(ApiError::Internal("failed to create user"));
        }
    };

    info!(user_id = %user.id, "user created");
    let location = format!("/api/users/{}", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(user.into()),
    ))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(&id)?;
    match state.users.get_user_by_id(id).await {
        Ok(Some(user)) => Ok(Json(user.into())),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => {
            error!(error = %e, %id, "get user failed");
            Err(ApiError::Internal("failed to get user"))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "undecodable update body");
        ApiError::from(e)
    })?;

    if let Err(e) = payload.validate() {
        warn!(error = %e, "update rejected");
        return Err(e.into());
    }

    let id = parse_id(&id)?;
    let existing = match state.users.get_user_by_id(id).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err(ApiError::NotFound),
        Err(e) => {
            error!(error = %e, %id, "load user for update failed");
            return Err(ApiError::Internal("failed to get user"));
        }
    };

    let updated = match state.users.merge_changes(existing, payload.into()).await {
        Ok(merged) => state.users.update_user(merged).await,
        Err(e) => Err(e),
    };
    let user = updated.map_err(|e| {
        error!(error = %e, %id, "update user failed");
        ApiError::Internal("failed to update user")
    })?;

    info!(user_id = %user.id, "user updated");
    Ok(Json(user.into()))
}
