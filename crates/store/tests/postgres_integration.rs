//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{Money, OrderStatus, RestaurantId};
use sqlx::PgPool;
use store::{
    AdminRepository, AuthToken, CatalogRepository, DeletePolicy, IdentityRepository, MenuItem,
    NewMenuItem, NewOrder, NewOrderItem, NewRestaurant, NewUser, OrderRepository, PostgresStore,
    Restaurant, Store, StoreError, Transaction, User,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, menu_items, restaurants, auth_tokens, users RESTART IDENTITY",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

async fn seed(store: &PostgresStore) -> (User, Restaurant, MenuItem) {
    let mut tx = store.begin().await.unwrap();
    let user = tx
        .insert_user(NewUser {
            username: "orderuser".to_string(),
            email: "order@example.com".to_string(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap();
    let restaurant = tx
        .insert_restaurant(NewRestaurant::new("Rendelő Étterem", "Rendelő Cím"))
        .await
        .unwrap();
    let item = tx
        .insert_menu_item(
            NewMenuItem::new(restaurant.id, "Pizza", Money::from_cents(2000))
                .with_description("Margherita"),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    (user, restaurant, item)
}

#[tokio::test]
async fn committed_order_is_visible_with_items() {
    let store = get_test_store().await;
    let (user, restaurant, item) = seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let order = tx
        .insert_order(NewOrder {
            customer_id: user.id,
            restaurant_id: restaurant.id,
            created_at: Utc::now(),
            status: OrderStatus::Received,
        })
        .await
        .unwrap();
    tx.insert_order_item(NewOrderItem {
        order_id: order.id,
        menu_item_id: item.id,
        quantity: 2,
        price: item.price,
        special_instructions: Some("extra".to_string()),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let loaded = tx.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Received);
    let items = tx.list_order_items(order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].price, Money::from_cents(2000));
    assert_eq!(items[0].special_instructions.as_deref(), Some("extra"));
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let store = get_test_store().await;
    let (user, restaurant, _) = seed(&store).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(NewOrder {
            customer_id: user.id,
            restaurant_id: restaurant.id,
            created_at: Utc::now(),
            status: OrderStatus::Received,
        })
        .await
        .unwrap();
    }

    let mut tx = store.begin().await.unwrap();
    assert!(tx.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn menu_item_lookup_is_scoped_to_restaurant() {
    let store = get_test_store().await;
    let (_, restaurant, item) = seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let other = tx
        .insert_restaurant(NewRestaurant::new("Other", "Elsewhere"))
        .await
        .unwrap();

    let found = tx.find_menu_item(restaurant.id, item.id).await.unwrap();
    assert_eq!(found.unwrap().description.as_deref(), Some("Margherita"));
    assert!(tx.find_menu_item(other.id, item.id).await.unwrap().is_none());
}

#[tokio::test]
async fn status_update_round_trips() {
    let store = get_test_store().await;
    let (user, restaurant, _) = seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let order = tx
        .insert_order(NewOrder {
            customer_id: user.id,
            restaurant_id: restaurant.id,
            created_at: Utc::now(),
            status: OrderStatus::Received,
        })
        .await
        .unwrap();
    let updated = tx
        .update_order_status(order.id, OrderStatus::Preparing)
        .await
        .unwrap()
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(updated.status, OrderStatus::Preparing);
    assert_eq!(updated.created_at, order.created_at);
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let store = get_test_store().await;
    seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .insert_user(NewUser {
            username: "orderuser".to_string(),
            email: "another@example.com".to_string(),
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap_err();

    match err {
        StoreError::Conflict { constraint } => assert_eq!(constraint, "unique_username"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn token_resolves_to_user() {
    let store = get_test_store().await;
    let (user, _, _) = seed(&store).await;

    let key = "a".repeat(40);
    let mut tx = store.begin().await.unwrap();
    tx.insert_token(AuthToken {
        key: key.clone(),
        user_id: user.id,
        created_at: Utc::now(),
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let resolved = tx.find_user_by_token(&key).await.unwrap().unwrap();
    assert_eq!(resolved.id, user.id);
    assert!(tx.find_user_by_token("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_restaurant_reject_and_cascade() {
    let store = get_test_store().await;
    let (user, restaurant, item) = seed(&store).await;

    let mut tx = store.begin().await.unwrap();
    let order = tx
        .insert_order(NewOrder {
            customer_id: user.id,
            restaurant_id: restaurant.id,
            created_at: Utc::now(),
            status: OrderStatus::Received,
        })
        .await
        .unwrap();
    tx.insert_order_item(NewOrderItem {
        order_id: order.id,
        menu_item_id: item.id,
        quantity: 1,
        price: item.price,
        special_instructions: None,
    })
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .delete_restaurant(restaurant.id, DeletePolicy::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::HasDependents { dependents: 2, .. }));
    drop(tx);

    let mut tx = store.begin().await.unwrap();
    let report = tx
        .delete_restaurant(restaurant.id, DeletePolicy::Cascade)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(report.restaurants, 1);
    assert_eq!(report.menu_items, 1);
    assert_eq!(report.orders, 1);
    assert_eq!(report.order_items, 1);

    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_restaurant(restaurant.id).await.unwrap().is_none());
    assert!(tx.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn menu_item_for_missing_restaurant_is_rejected() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .insert_menu_item(NewMenuItem::new(
            RestaurantId::new(999),
            "Ghost",
            Money::from_cents(100),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference { id: 999, .. }));
}
