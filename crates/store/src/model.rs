//! Row records as they are persisted.

use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderItemId, OrderStatus, RestaurantId, UserId};
use serde::Serialize;

/// A registered user with stored credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Bearer token bound to exactly one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub key: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct NewRestaurant {
    pub name: String,
    pub address: String,
}

impl NewRestaurant {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A menu item, owned by exactly one restaurant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
}

#[derive(Debug, Clone)]
pub struct NewMenuItem {
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
}

impl NewMenuItem {
    pub fn new(restaurant_id: RestaurantId, name: impl Into<String>, price: Money) -> Self {
        Self {
            restaurant_id,
            name: name.into(),
            description: None,
            price,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
}

/// One line of an order. `price` is the unit price captured when the order
/// was placed, not a live reference to the menu item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
    pub price: Money,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub order_id: OrderId,
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
    pub price: Money,
    pub special_instructions: Option<String>,
}

/// How a delete treats rows that depend on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Fail with [`StoreError::HasDependents`](crate::StoreError::HasDependents)
    /// if anything still references the target.
    #[default]
    Reject,

    /// Remove dependents first, leaves to root.
    Cascade,
}

/// Row counts removed by a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeleteReport {
    pub users: u64,
    pub restaurants: u64,
    pub menu_items: u64,
    pub orders: u64,
    pub order_items: u64,
}
