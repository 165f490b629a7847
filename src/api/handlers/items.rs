//! Item endpoints.
//!
//! Reads are public. Create, update and delete resolve the bearer principal
//! first, so an unauthenticated call never reaches storage.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use super::auth::require_user;
use crate::{
    api::error::{json_rejection, query_rejection, ErrorDetail, ValidationDetail},
    auth::AuthState,
    error::Error,
    items,
    store::{Item, Repositories},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Case-insensitive substring of the item name.
    pub q: Option<String>,
    /// Page size, default 10, at most 100.
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

fn bad_id(err: &PathRejection) -> Response {
    debug!("Invalid item id: {err}");
    Error::BadRequest("Invalid item id").into_response()
}

#[utoipa::path(
    post,
    path = "/items",
    request_body = ItemRequest,
    responses(
        (status = 201, description = "Item created.", body = Item),
        (status = 400, description = "Invalid item.", body = ValidationDetail),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "items"
)]
pub async fn create_item(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<ItemRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(err) = require_user(&headers, &auth_state, repos.users.as_ref()).await {
        return err.into_response();
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => return json_rejection(&err).into_response(),
    };

    match items::create(repos.items.as_ref(), &request.name, request.description).await {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/items",
    params(ListParams),
    responses(
        (status = 200, description = "Items, newest first.", body = [Item]),
        (status = 400, description = "Invalid query parameters.", body = ValidationDetail),
    ),
    tag = "items"
)]
/// List items, optionally filtered by name.
pub async fn list_items(
    repos: Extension<Repositories>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> impl IntoResponse {
    let params = match params {
        Ok(Query(params)) => params,
        Err(err) => return query_rejection(&err).into_response(),
    };

    let filter = items::filter(
        params.q,
        params.limit.map(i64::from),
        params.offset.map(i64::from),
    );

    match items::list(repos.items.as_ref(), &filter).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/items/{id}",
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "The item.", body = Item),
        (status = 404, description = "Item not found.", body = ErrorDetail),
    ),
    tag = "items"
)]
pub async fn get_item(
    repos: Extension<Repositories>,
    id: Result<Path<i64>, PathRejection>,
) -> impl IntoResponse {
    let id = match id {
        Ok(Path(id)) => id,
        Err(err) => return bad_id(&err),
    };

    match items::get(repos.items.as_ref(), id).await {
        Ok(item) => Json(item).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/items/{id}",
    request_body = ItemRequest,
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item replaced.", body = Item),
        (status = 400, description = "Invalid item.", body = ValidationDetail),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
        (status = 404, description = "Item not found.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "items"
)]
/// Replace an item's name and description. Any authenticated user may update any item.
pub async fn update_item(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ItemRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(err) = require_user(&headers, &auth_state, repos.users.as_ref()).await {
        return err.into_response();
    }

    let id = match id {
        Ok(Path(id)) => id,
        Err(err) => return bad_id(&err),
    };
    let request = match payload {
        Ok(Json(request)) => request,
        Err(err) => return json_rejection(&err).into_response(),
    };

    match items::update(repos.items.as_ref(), id, &request.name, request.description).await {
        Ok(item) => Json(item).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/items/{id}",
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 204, description = "Item deleted."),
        (status = 401, description = "Missing, invalid or expired token.", body = ErrorDetail),
        (status = 404, description = "Item not found.", body = ErrorDetail),
    ),
    security(("bearer" = [])),
    tag = "items"
)]
pub async fn delete_item(
    headers: HeaderMap,
    repos: Extension<Repositories>,
    auth_state: Extension<Arc<AuthState>>,
    id: Result<Path<i64>, PathRejection>,
) -> impl IntoResponse {
    if let Err(err) = require_user(&headers, &auth_state, repos.users.as_ref()).await {
        return err.into_response();
    }

    let id = match id {
        Ok(Path(id)) => id,
        Err(err) => return bad_id(&err),
    };

    match items::delete(repos.items.as_ref(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
