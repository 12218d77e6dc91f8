//! Order read model.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderItemId, OrderStatus, RestaurantId, UserId};
use serde::Serialize;
use store::{OrderRecord, Restaurant, StoreError, Transaction};

use crate::catalog::MenuItemView;
use crate::error::DomainError;
use crate::identity::UserProfile;

/// A fully resolved order, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub customer: UserProfile,
    pub restaurant: Restaurant,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    /// Sum of all line totals at their captured prices.
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderItemView::line_total).sum()
    }
}

/// One line of an [`OrderView`].
///
/// `price` is the unit price captured at placement; `menu_item.price` is the
/// item's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemView {
    pub id: OrderItemId,
    pub menu_item: MenuItemView,
    pub quantity: u32,
    pub special_instructions: Option<String>,
    pub price: Money,
}

impl OrderItemView {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// Resolves customers, restaurants and menu items for a batch of orders.
///
/// Output order matches input order.
pub(crate) async fn hydrate<T: Transaction>(
    tx: &mut T,
    orders: Vec<OrderRecord>,
) -> Result<Vec<OrderView>, DomainError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::with_capacity(orders.len());
    for order in &orders {
        lines.push(tx.list_order_items(order.id).await?);
    }

    let user_ids: Vec<UserId> = orders
        .iter()
        .map(|o| o.customer_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let customers: HashMap<UserId, UserProfile> = tx
        .find_users(&user_ids)
        .await?
        .into_iter()
        .map(|user| (user.id, UserProfile::from(user)))
        .collect();

    let mut restaurants: HashMap<RestaurantId, Restaurant> = HashMap::new();
    for restaurant_id in orders.iter().map(|o| o.restaurant_id).collect::<BTreeSet<_>>() {
        if let Some(restaurant) = tx.find_restaurant(restaurant_id).await? {
            restaurants.insert(restaurant_id, restaurant);
        }
    }

    let item_ids: Vec<MenuItemId> = lines
        .iter()
        .flatten()
        .map(|line| line.menu_item_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let menu_items: HashMap<MenuItemId, MenuItemView> = tx
        .find_menu_items(&item_ids)
        .await?
        .into_iter()
        .map(|item| (item.id, MenuItemView::from(item)))
        .collect();

    let mut views = Vec::with_capacity(orders.len());
    for (order, lines) in orders.into_iter().zip(lines) {
        let customer = customers
            .get(&order.customer_id)
            .cloned()
            .ok_or_else(|| dangling("user", order.customer_id.as_i64()))?;
        let restaurant = restaurants
            .get(&order.restaurant_id)
            .cloned()
            .ok_or_else(|| dangling("restaurant", order.restaurant_id.as_i64()))?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let menu_item = menu_items
                .get(&line.menu_item_id)
                .cloned()
                .ok_or_else(|| dangling("menu_item", line.menu_item_id.as_i64()))?;
            items.push(OrderItemView {
                id: line.id,
                menu_item,
                quantity: line.quantity,
                special_instructions: line.special_instructions,
                price: line.price,
            });
        }

        views.push(OrderView {
            id: order.id,
            customer,
            restaurant,
            created_at: order.created_at,
            status: order.status,
            items,
        });
    }

    Ok(views)
}

pub(crate) async fn hydrate_one<T: Transaction>(
    tx: &mut T,
    order: OrderRecord,
) -> Result<OrderView, DomainError> {
    let id = order.id;
    hydrate(tx, vec![order])
        .await?
        .pop()
        .ok_or_else(|| DomainError::order_not_found(id))
}

fn dangling(entity: &'static str, id: i64) -> DomainError {
    DomainError::Store(StoreError::MissingReference { entity, id })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price_cents: i64, quantity: u32) -> OrderItemView {
        OrderItemView {
            id: OrderItemId::new(1),
            menu_item: MenuItemView {
                id: MenuItemId::new(1),
                name: "P".to_string(),
                description: None,
                price: Money::from_cents(price_cents),
            },
            quantity,
            special_instructions: None,
            price: Money::from_cents(price_cents),
        }
    }

    #[test]
    fn test_total_uses_captured_prices() {
        let view = OrderView {
            id: OrderId::new(1),
            customer: UserProfile {
                id: UserId::new(1),
                username: "testuser".to_string(),
                email: "test@example.com".to_string(),
            },
            restaurant: Restaurant {
                id: RestaurantId::new(1),
                name: "R".to_string(),
                address: "A".to_string(),
            },
            created_at: Utc::now(),
            status: OrderStatus::Received,
            items: vec![line(2000, 1), line(1500, 2)],
        };
        assert_eq!(view.total(), Money::from_cents(5000));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "received");
        assert_eq!(json["customer"]["username"], "testuser");
        assert_eq!(json["items"][1]["quantity"], 2);
        assert_eq!(json["items"][1]["price"], "15.00");
        assert!(json["items"][0]["special_instructions"].is_null());
    }
}
