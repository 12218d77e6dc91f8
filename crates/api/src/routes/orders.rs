//! Customer and restaurant-side order endpoints.
//!
//! Restaurant-side endpoints only require an authenticated caller; they are
//! not scoped to a restaurant.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{MenuItemId, OrderId, RestaurantId, UserId};
use domain::{CartItem, FieldErrors, OrderView, PlaceOrder, UpdateStatus};
use serde::Deserialize;
use serde_json::Value;
use store::Store;

use super::{IdPath, JsonBody, REQUIRED};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

/// Order creation body. Fields stay untyped until [`into_command`] so type
/// errors can be reported under the field they concern.
///
/// [`into_command`]: CreateOrderRequest::into_command
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "restaurantId")]
    pub restaurant_id: Option<Value>,
    pub items: Option<Value>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

const INVALID_INTEGER: &str = "A valid integer is required.";

impl CreateOrderRequest {
    /// Checks field presence and types and builds the command. Catalog
    /// references are left to the order service.
    fn into_command(self, customer_id: UserId) -> Result<PlaceOrder, FieldErrors> {
        let mut errors = FieldErrors::new();

        let restaurant_id = match self.restaurant_id {
            None => {
                errors.add("restaurantId", REQUIRED);
                None
            }
            Some(value) => {
                let id = integer(&value);
                if id.is_none() {
                    errors.add("restaurantId", INVALID_INTEGER);
                }
                id
            }
        };

        let mut cart = Vec::new();
        match self.items {
            None => errors.add("items", REQUIRED),
            Some(Value::Array(entries)) => {
                for entry in &entries {
                    match cart_item(entry) {
                        Ok(item) => cart.push(item),
                        Err(message) => errors.add("items", message),
                    }
                }
            }
            Some(_) => errors.add("items", "Expected a list of items."),
        }

        match restaurant_id {
            Some(restaurant_id) if errors.is_empty() => Ok(PlaceOrder::new(
                customer_id,
                RestaurantId::new(restaurant_id),
                cart,
            )),
            _ => Err(errors),
        }
    }
}

/// Reads one cart entry. `quantity` defaults to 1.
fn cart_item(entry: &Value) -> Result<CartItem, String> {
    let Value::Object(fields) = entry else {
        return Err("Invalid data. Expected a dictionary.".to_string());
    };

    let menu_item_id = match fields.get("menuItemId") {
        None | Some(Value::Null) => return Err(format!("menuItemId: {REQUIRED}")),
        Some(value) => integer(value).ok_or_else(|| format!("menuItemId: {INVALID_INTEGER}"))?,
    };
    let quantity = match fields.get("quantity") {
        None => 1,
        Some(value) => integer(value).ok_or_else(|| format!("quantity: {INVALID_INTEGER}"))?,
    };
    let special_instructions = match fields.get("special_instructions") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => return Err("special_instructions: Not a valid string.".to_string()),
    };

    Ok(CartItem {
        menu_item_id: MenuItemId::new(menu_item_id),
        // Out-of-range values become 0 or u32::MAX and fail cart validation.
        quantity: u32::try_from(quantity.max(0)).unwrap_or(u32::MAX),
        special_instructions,
    })
}

/// Accepts JSON integers, integral floats and numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

// -- Handlers --

/// POST /orders/: place an order for the caller.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let cmd = req.into_command(user.id)?;
    let order = state.orders.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}/: one of the caller's own orders.
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_own<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    IdPath(id): IdPath<OrderId>,
    AuthUser(user): AuthUser,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.orders.get_order_for_customer(user.id, id).await?))
}

/// GET /restaurants/orders/: every order.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    Ok(Json(state.orders.list_orders().await?))
}

/// GET /restaurants/orders/{id}/: any order by id.
#[tracing::instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    IdPath(id): IdPath<OrderId>,
    AuthUser(user): AuthUser,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.orders.get_order(id).await?))
}

/// PATCH /restaurants/orders/{id}/update/: change an order's status.
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.id))]
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    IdPath(id): IdPath<OrderId>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let status = req
        .status
        .ok_or_else(|| FieldErrors::single("status", REQUIRED))?;
    let order = state
        .orders
        .update_status(UpdateStatus::new(id, status))
        .await?;
    Ok(Json(order))
}
