//! Order service: placement, lookup and status updates.

use std::time::Instant;

use chrono::Utc;
use common::{OrderId, OrderStatus, UserId};
use store::{
    CatalogRepository, IdentityRepository, NewOrder, NewOrderItem, OrderRepository, Store,
    Transaction,
};

use crate::error::{DomainError, InvalidReference};

use super::view::{hydrate, hydrate_one};
use super::{OrderView, PlaceOrder, TransitionPolicy, UpdateStatus};

/// Service for placing and managing orders.
///
/// Every operation runs in its own store transaction. A failure before the
/// commit drops the transaction, so no partial order is ever visible.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
    policy: TransitionPolicy,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the given store and status policy.
    pub fn new(store: S, policy: TransitionPolicy) -> Self {
        Self { store, policy }
    }

    /// Places an order from a cart.
    ///
    /// Menu items are resolved within the ordered restaurant only; an item of
    /// another restaurant is reported as an invalid reference. Each line
    /// captures the item's price at the time of the call.
    #[tracing::instrument(
        skip(self, cmd),
        fields(
            customer_id = %cmd.customer_id,
            restaurant_id = %cmd.restaurant_id,
            lines = cmd.items.len()
        )
    )]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<OrderView, DomainError> {
        let started = Instant::now();
        let result = self.place_order_inner(cmd).await;
        metrics::histogram!("order_placement_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    items = order.items.len(),
                    total = %order.total(),
                    "Order placed"
                );
            }
            Err(e) => {
                metrics::counter!("orders_rejected_total").increment(1);
                tracing::debug!(error = %e, "Order rejected");
            }
        }
        result
    }

    async fn place_order_inner(&self, cmd: PlaceOrder) -> Result<OrderView, DomainError> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;

        if tx.find_restaurant(cmd.restaurant_id).await?.is_none() {
            return Err(InvalidReference::Restaurant(cmd.restaurant_id).into());
        }
        if tx.find_user(cmd.customer_id).await?.is_none() {
            return Err(DomainError::Unauthenticated);
        }

        let order = tx
            .insert_order(NewOrder {
                customer_id: cmd.customer_id,
                restaurant_id: cmd.restaurant_id,
                created_at: Utc::now(),
                status: OrderStatus::Received,
            })
            .await?;

        for line in cmd.items {
            let menu_item = tx
                .find_menu_item(cmd.restaurant_id, line.menu_item_id)
                .await?
                .ok_or(InvalidReference::MenuItem(line.menu_item_id))?;

            tx.insert_order_item(NewOrderItem {
                order_id: order.id,
                menu_item_id: menu_item.id,
                quantity: line.quantity,
                price: menu_item.price,
                special_instructions: line.special_instructions,
            })
            .await?;
        }

        let view = hydrate_one(&mut tx, order).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Returns the order only if `customer_id` placed it.
    ///
    /// Another customer's order is reported exactly like a missing one.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_for_customer(
        &self,
        customer_id: UserId,
        order_id: OrderId,
    ) -> Result<OrderView, DomainError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .filter(|order| order.customer_id == customer_id)
            .ok_or_else(|| DomainError::order_not_found(order_id))?;
        let view = hydrate_one(&mut tx, order).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Returns any order by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderView, DomainError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or_else(|| DomainError::order_not_found(order_id))?;
        let view = hydrate_one(&mut tx, order).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Lists every order, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderView>, DomainError> {
        let mut tx = self.store.begin().await?;
        let orders = tx.list_orders().await?;
        let views = hydrate(&mut tx, orders).await?;
        tx.commit().await?;
        Ok(views)
    }

    /// Changes the status of an order according to the configured policy.
    ///
    /// Unknown status values and disallowed transitions leave the order
    /// untouched.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_status(&self, cmd: UpdateStatus) -> Result<OrderView, DomainError> {
        let status: OrderStatus = cmd.status.parse()?;

        let mut tx = self.store.begin().await?;
        let current = tx
            .find_order_for_update(cmd.order_id)
            .await?
            .ok_or_else(|| DomainError::order_not_found(cmd.order_id))?;
        self.policy.check(current.status, status)?;

        let updated = tx
            .update_order_status(cmd.order_id, status)
            .await?
            .ok_or_else(|| DomainError::order_not_found(cmd.order_id))?;
        let view = hydrate_one(&mut tx, updated).await?;
        tx.commit().await?;

        metrics::counter!("order_status_updates_total", "status" => status.as_str()).increment(1);
        tracing::info!(from = %current.status, to = %status, "Order status updated");
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use common::{MenuItemId, Money, RestaurantId};
    use store::{
        AdminRepository, InMemoryStore, MenuItem, NewMenuItem, NewRestaurant, NewUser,
        Restaurant, User,
    };

    use super::*;
    use crate::order::CartItem;

    struct Fixture {
        service: OrderService<InMemoryStore>,
        store: InMemoryStore,
        alice: User,
        bob: User,
        restaurant: Restaurant,
        pizza: MenuItem,
        burger: MenuItem,
        elsewhere: MenuItem,
    }

    async fn fixture(policy: TransitionPolicy) -> Fixture {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let alice = tx
            .insert_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        let bob = tx
            .insert_user(NewUser {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .await
            .unwrap();
        let restaurant = tx
            .insert_restaurant(NewRestaurant::new("R", "Main St 1"))
            .await
            .unwrap();
        let other = tx
            .insert_restaurant(NewRestaurant::new("Other", "Side St 2"))
            .await
            .unwrap();
        let pizza = tx
            .insert_menu_item(NewMenuItem::new(restaurant.id, "P", Money::from_cents(2000)))
            .await
            .unwrap();
        let burger = tx
            .insert_menu_item(NewMenuItem::new(restaurant.id, "B", Money::from_cents(1500)))
            .await
            .unwrap();
        let elsewhere = tx
            .insert_menu_item(NewMenuItem::new(other.id, "X", Money::from_cents(900)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        Fixture {
            service: OrderService::new(store.clone(), policy),
            store,
            alice,
            bob,
            restaurant,
            pizza,
            burger,
            elsewhere,
        }
    }

    fn cart(f: &Fixture) -> PlaceOrder {
        PlaceOrder::new(
            f.alice.id,
            f.restaurant.id,
            vec![
                CartItem::new(f.pizza.id, 1),
                CartItem::new(f.burger.id, 2).with_instructions("extra"),
            ],
        )
    }

    #[tokio::test]
    async fn test_place_order() {
        let f = fixture(TransitionPolicy::Strict).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();

        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.customer.username, "alice");
        assert_eq!(order.restaurant, f.restaurant);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].menu_item.name, "P");
        assert_eq!(order.items[0].price, Money::from_cents(2000));
        assert_eq!(order.items[1].quantity, 2);
        assert_eq!(order.items[1].special_instructions.as_deref(), Some("extra"));
        assert_eq!(order.total(), Money::from_cents(5000));
    }

    #[tokio::test]
    async fn test_unknown_restaurant_is_invalid_reference() {
        let f = fixture(TransitionPolicy::Strict).await;
        let cmd = PlaceOrder::new(
            f.alice.id,
            RestaurantId::new(999),
            vec![CartItem::new(f.pizza.id, 1)],
        );
        let err = f.service.place_order(cmd).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidReference(InvalidReference::Restaurant(_))
        ));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_item_of_other_restaurant_rolls_back() {
        let f = fixture(TransitionPolicy::Strict).await;
        let cmd = PlaceOrder::new(
            f.alice.id,
            f.restaurant.id,
            vec![CartItem::new(f.pizza.id, 1), CartItem::new(f.elsewhere.id, 1)],
        );
        let err = f.service.place_order(cmd).await.unwrap_err();
        assert!(
            matches!(err, DomainError::InvalidReference(InvalidReference::MenuItem(id)) if id == f.elsewhere.id)
        );
        assert_eq!(f.store.order_count().await, 0);
        assert_eq!(f.store.order_item_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected_without_writes() {
        let f = fixture(TransitionPolicy::Strict).await;
        let cmd = PlaceOrder::new(f.alice.id, f.restaurant.id, vec![]);
        assert!(matches!(
            f.service.place_order(cmd).await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_menu_item_is_named() {
        let f = fixture(TransitionPolicy::Strict).await;
        let cmd = PlaceOrder::new(
            f.alice.id,
            f.restaurant.id,
            vec![CartItem::new(MenuItemId::new(4242), 1)],
        );
        let err = f.service.place_order(cmd).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid menu item ID: 4242 for the given restaurant."
        );
    }

    #[tokio::test]
    async fn test_other_customers_order_is_not_found() {
        let f = fixture(TransitionPolicy::Strict).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();

        let own = f
            .service
            .get_order_for_customer(f.alice.id, order.id)
            .await
            .unwrap();
        assert_eq!(own, order);

        let foreign = f.service.get_order_for_customer(f.bob.id, order.id).await;
        let missing = f
            .service
            .get_order_for_customer(f.bob.id, OrderId::new(999))
            .await;
        assert!(matches!(foreign, Err(DomainError::NotFound { entity: "order", .. })));
        assert!(matches!(missing, Err(DomainError::NotFound { entity: "order", .. })));
    }

    #[tokio::test]
    async fn test_list_orders_is_ordered_by_id() {
        let f = fixture(TransitionPolicy::Strict).await;
        let first = f.service.place_order(cart(&f)).await.unwrap();
        let second = f
            .service
            .place_order(PlaceOrder::new(
                f.bob.id,
                f.restaurant.id,
                vec![CartItem::new(f.burger.id, 1)],
            ))
            .await
            .unwrap();

        let orders = f.service.list_orders().await.unwrap();
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(orders[1].customer.username, "bob");
    }

    #[tokio::test]
    async fn test_strict_status_walk() {
        let f = fixture(TransitionPolicy::Strict).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();

        for status in ["preparing", "ready", "delivered"] {
            let updated = f
                .service
                .update_status(UpdateStatus::new(order.id, status))
                .await
                .unwrap();
            assert_eq!(updated.status.as_str(), status);
        }

        let err = f
            .service
            .update_status(UpdateStatus::new(order.id, "received"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(
            f.service.get_order(order.id).await.unwrap().status,
            OrderStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_strict_rejects_skipping() {
        let f = fixture(TransitionPolicy::Strict).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();
        let err = f
            .service
            .update_status(UpdateStatus::new(order.id, "ready"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: OrderStatus::Received,
                to: OrderStatus::Ready
            }
        ));
    }

    #[tokio::test]
    async fn test_unrestricted_allows_any_status() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();
        let delivered = f
            .service
            .update_status(UpdateStatus::new(order.id, "delivered"))
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        let back = f
            .service
            .update_status(UpdateStatus::new(order.id, "received"))
            .await
            .unwrap();
        assert_eq!(back.status, OrderStatus::Received);
    }

    #[tokio::test]
    async fn test_invalid_status_leaves_order_unchanged() {
        let f = fixture(TransitionPolicy::Unrestricted).await;
        let order = f.service.place_order(cart(&f)).await.unwrap();
        let err = f
            .service
            .update_status(UpdateStatus::new(order.id, "cancelled"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "\"cancelled\" is not a valid choice.");
        assert_eq!(
            f.service.get_order(order.id).await.unwrap().status,
            OrderStatus::Received
        );
    }

    #[tokio::test]
    async fn test_update_missing_order_is_not_found() {
        let f = fixture(TransitionPolicy::Strict).await;
        let err = f
            .service
            .update_status(UpdateStatus::new(OrderId::new(77), "preparing"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "order", id: 77 }));
    }
}
