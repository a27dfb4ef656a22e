use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_username;
use crate::store::Store;
use crate::types::User;

const MIN_PASSWORD_LEN: usize = 8;

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    validate_username(&req.username).map_err(ApiError::bad_request)?;
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = state.passwords.hash(&req.password)?;
    let user = User::new(req.username, password_hash);
    state.store.create_user(&user)?;

    tracing::info!(username = %user.username, "registered user");

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserResponse::from(user))),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = state
        .store
        .find_user_by_username(&req.username)?
        .ok_or_else(|| ApiError::unauthorized("Incorrect username or password"))?;

    if !state.passwords.verify(&req.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("Incorrect username or password"));
    }

    let token = state.credentials.issue(&user.id, &user.username)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(TokenResponse::bearer(token))))
}

pub async fn me(auth: RequireUser) -> Json<ApiResponse<UserResponse>> {
    Json(ApiResponse::success(UserResponse::from(auth.user)))
}
