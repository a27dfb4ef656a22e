use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreatePageRequest, EventsQuery, PageResponse, PermissionRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_page_name;
use crate::store::Store;
use crate::types::{Page, PagePermission, Subject};

pub async fn create_page(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePageRequest>,
) -> impl IntoResponse {
    validate_page_name(&req.name).map_err(ApiError::bad_request)?;

    let page = Page::new(req.name, auth.user.id.clone());
    state.store.create_page(&page)?;

    let response = PageResponse {
        id: page.id,
        name: page.name,
        owner_id: page.owner_id,
        created_at: page.created_at,
        is_owner: true,
        can_edit: true,
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn list_pages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let pages: Vec<PageResponse> = state
        .store
        .list_pages_visible_to(&auth.user.id)?
        .into_iter()
        .map(PageResponse::from)
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(pages)))
}

fn require_owned_page(state: &AppState, page_id: &str, caller_id: &str) -> Result<Page, ApiError> {
    let page = state
        .store
        .get_page(page_id)?
        .ok_or_else(|| ApiError::not_found("Page not found"))?;

    if page.owner_id != caller_id {
        return Err(ApiError::forbidden(
            "Only the owner can manage page permissions",
        ));
    }
    Ok(page)
}

pub async fn upsert_permission(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
    Json(req): Json<PermissionRequest>,
) -> impl IntoResponse {
    let page = require_owned_page(&state, &page_id, &auth.user.id)?;

    let permission = PagePermission {
        page_id: page.id.clone(),
        subject: req.subject,
        can_view: req.can_view,
        can_edit: req.can_edit,
    };

    let before = state.store.users_with_view_access(&page.id)?;
    state.store.upsert_permission(&permission)?;
    let after = state.store.users_with_view_access(&page.id)?;
    state.broadcaster.push_access_diff(&page, &before, &after)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(permission)))
}

pub async fn list_permissions(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> impl IntoResponse {
    let page = require_owned_page(&state, &page_id, &auth.user.id)?;

    let permissions = state.store.list_permissions(&page.id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(permissions)))
}

pub async fn delete_permission(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((page_id, subject_type, subject_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let page = require_owned_page(&state, &page_id, &auth.user.id)?;

    let subject = Subject::from_columns(&subject_type, subject_id)
        .ok_or_else(|| ApiError::bad_request("Unknown subject type"))?;

    let before = state.store.users_with_view_access(&page.id)?;
    if !state.store.delete_permission(&page.id, &subject)? {
        return Err(ApiError::not_found("Permission not found"));
    }
    let after = state.store.users_with_view_access(&page.id)?;
    state.broadcaster.push_access_diff(&page, &before, &after)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_alarm_events(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(alarm_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let alarm = state
        .store
        .get_alarm(&alarm_id)?
        .ok_or_else(|| ApiError::not_found("Alarm not found"))?;
    let page = state
        .store
        .get_page(&alarm.page_id)?
        .ok_or_else(|| ApiError::not_found("Page not found"))?;

    if !state.broadcaster.resolve_access(&auth.user.id, &page)?.view {
        return Err(ApiError::forbidden("Cannot access this alarm"));
    }

    let events = state.store.list_alarm_events(&alarm.id, query.limit)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(events)))
}
