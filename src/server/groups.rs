use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::CreateGroupRequest;
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_group_name;
use crate::store::Store;
use crate::types::{Group, Subject};

pub async fn create_group(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGroupRequest>,
) -> impl IntoResponse {
    validate_group_name(&req.name).map_err(ApiError::bad_request)?;

    let group = Group::new(req.name);
    state.store.create_group(&group, &auth.user.id)?;

    tracing::info!(group = %group.name, creator = %auth.user.username, "created group");

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(group))))
}

pub async fn add_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let group = require_membership(&state, &group_id, &auth.user.id)?;

    mutate_with_fanout(&state, &group, |store| store.add_member(&group.id, &user_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(json!({"status": "added"}))))
}

pub async fn remove_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let group = require_membership(&state, &group_id, &auth.user.id)?;

    mutate_with_fanout(&state, &group, |store| {
        store.remove_member(&group.id, &user_id)
    })?;

    Ok::<_, ApiError>(Json(ApiResponse::success(json!({"status": "removed"}))))
}

fn require_membership(
    state: &AppState,
    group_id: &str,
    caller_id: &str,
) -> Result<Group, ApiError> {
    let group = state
        .store
        .get_group(group_id)?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    if !state.store.is_member(&group.id, caller_id)? {
        return Err(ApiError::forbidden(
            "Only group members can manage membership",
        ));
    }
    Ok(group)
}

/// Applies a membership mutation and pushes grant/revoke frames to every
/// user whose audience standing changed on any page this group is
/// granted on.
fn mutate_with_fanout<F>(state: &AppState, group: &Group, mutate: F) -> Result<(), ApiError>
where
    F: FnOnce(&dyn Store) -> crate::error::Result<()>,
{
    let subject = Subject::group(group.id.clone());
    let pages = state.store.list_pages_granted_to(&subject)?;

    let mut before = Vec::with_capacity(pages.len());
    for page in &pages {
        before.push(state.store.users_with_view_access(&page.id)?);
    }

    mutate(state.store.as_ref())?;

    for (page, before) in pages.iter().zip(before) {
        let after = state.store.users_with_view_access(&page.id)?;
        state.broadcaster.push_access_diff(page, &before, &after)?;
    }
    Ok(())
}
