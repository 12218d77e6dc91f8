//! Read-only catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::RestaurantId;
use domain::{MenuItemView, RestaurantDetail};
use store::{Restaurant, Store};

use super::IdPath;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /restaurants/: every restaurant, in creation order.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(state.catalog.list_restaurants().await?))
}

/// GET /restaurants/{id}/: a restaurant with its menu.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    IdPath(id): IdPath<RestaurantId>,
) -> Result<Json<RestaurantDetail>, ApiError> {
    Ok(Json(state.catalog.get_restaurant(id).await?))
}

/// GET /restaurants/{id}/menu/
#[tracing::instrument(skip(state))]
pub async fn menu<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    IdPath(id): IdPath<RestaurantId>,
) -> Result<Json<Vec<MenuItemView>>, ApiError> {
    Ok(Json(state.catalog.list_menu(id).await?))
}
