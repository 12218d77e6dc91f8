//! Demo data for local development.

use chrono::Utc;
use common::{Money, OrderId, OrderStatus, RestaurantId};
use serde::Serialize;
use store::{
    AdminRepository, DeleteReport, IdentityRepository, MenuItem, NewMenuItem, NewOrder,
    NewOrderItem, NewRestaurant, NewUser, OrderRepository, Store, Transaction,
};

use crate::error::DomainError;
use crate::identity::PasswordHasher;

pub const TEST_USERNAME: &str = "testuser";
pub const TEST_PASSWORD: &str = "$ecret123";
pub const TEST_EMAIL: &str = "testuser@example.com";

const RESTAURANTS: &[(&str, &str, &[(&str, i64)])] = &[
    (
        "Teszt Étterem 1",
        "Teszt Cím 1",
        &[("Pizza Margherita", 1250), ("Hamburger", 899), ("Saláta", 675)],
    ),
    (
        "Teszt Étterem 2",
        "Teszt Cím 2",
        &[("Sushi Válogatás", 1999), ("Ramen", 1450)],
    ),
];

/// What [`Fixtures::populate`] created.
#[derive(Debug, Clone, Serialize)]
pub struct PopulateReport {
    pub user_created: bool,
    pub restaurants: Vec<RestaurantId>,
    pub menu_items: usize,
    pub order_id: OrderId,
}

/// What [`Fixtures::clear`] removed.
#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub catalog: DeleteReport,
    /// `None` if the test user did not exist.
    pub user: Option<DeleteReport>,
}

/// Seeds and removes the demo data set.
pub struct Fixtures<S: Store> {
    store: S,
    hasher: PasswordHasher,
}

impl<S: Store> Fixtures<S> {
    pub fn new(store: S, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Creates the test user (if absent), two restaurants with menus and one
    /// order for the test user from the first restaurant.
    #[tracing::instrument(skip(self))]
    pub async fn populate(&self) -> Result<PopulateReport, DomainError> {
        let mut tx = self.store.begin().await?;

        let (user, user_created) = match tx.find_user_by_username(TEST_USERNAME).await? {
            Some(user) => (user, false),
            None => {
                let user = tx
                    .insert_user(NewUser {
                        username: TEST_USERNAME.to_string(),
                        email: TEST_EMAIL.to_string(),
                        password_hash: self.hasher.hash(TEST_PASSWORD),
                    })
                    .await?;
                (user, true)
            }
        };

        let mut restaurants = Vec::with_capacity(RESTAURANTS.len());
        let mut menus: Vec<Vec<MenuItem>> = Vec::with_capacity(RESTAURANTS.len());
        for (name, address, items) in RESTAURANTS {
            let restaurant = tx
                .insert_restaurant(NewRestaurant::new(*name, *address))
                .await?;
            let mut menu = Vec::with_capacity(items.len());
            for (item_name, cents) in *items {
                menu.push(
                    tx.insert_menu_item(NewMenuItem::new(
                        restaurant.id,
                        *item_name,
                        Money::from_cents(*cents),
                    ))
                    .await?,
                );
            }
            restaurants.push(restaurant.id);
            menus.push(menu);
        }

        let order = tx
            .insert_order(NewOrder {
                customer_id: user.id,
                restaurant_id: restaurants[0],
                created_at: Utc::now(),
                status: OrderStatus::Received,
            })
            .await?;
        for item in &menus[0] {
            tx.insert_order_item(NewOrderItem {
                order_id: order.id,
                menu_item_id: item.id,
                quantity: 1,
                price: item.price,
                special_instructions: None,
            })
            .await?;
        }
        tx.commit().await?;

        let report = PopulateReport {
            user_created,
            restaurants,
            menu_items: menus.iter().map(Vec::len).sum(),
            order_id: order.id,
        };
        tracing::info!(?report, "Test data created");
        Ok(report)
    }

    /// Removes all restaurants, menu items, orders and order items, then the
    /// test user.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<ClearReport, DomainError> {
        let mut tx = self.store.begin().await?;
        let catalog = tx.clear_catalog().await?;
        let user = tx.delete_user(TEST_USERNAME).await?;
        tx.commit().await?;

        let report = ClearReport { catalog, user };
        tracing::info!(?report, "Test data deleted");
        Ok(report)
    }
}
