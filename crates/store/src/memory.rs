use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{MenuItemId, Money, OrderId, OrderItemId, OrderStatus, RestaurantId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::model::{
    AuthToken, DeletePolicy, DeleteReport, MenuItem, NewMenuItem, NewOrder, NewOrderItem,
    NewRestaurant, NewUser, OrderItemRecord, OrderRecord, Restaurant, User,
};
use crate::repository::{
    AdminRepository, CatalogRepository, IdentityRepository, OrderRepository, Store, Transaction,
};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Default)]
struct Sequences {
    users: i64,
    restaurants: i64,
    menu_items: i64,
    orders: i64,
    order_items: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    tokens: BTreeMap<String, AuthToken>,
    restaurants: BTreeMap<RestaurantId, Restaurant>,
    menu_items: BTreeMap<MenuItemId, MenuItem>,
    orders: BTreeMap<OrderId, OrderRecord>,
    order_items: BTreeMap<OrderItemId, OrderItemRecord>,
    sequences: Sequences,
}

impl Tables {
    /// Removes the given orders and every item that belongs to them or
    /// references one of `menu_item_ids`.
    fn remove_orders(
        &mut self,
        order_ids: &[OrderId],
        menu_item_ids: &[MenuItemId],
        report: &mut DeleteReport,
    ) {
        let before = self.order_items.len();
        self.order_items.retain(|_, item| {
            !order_ids.contains(&item.order_id) && !menu_item_ids.contains(&item.menu_item_id)
        });
        report.order_items += (before - self.order_items.len()) as u64;

        for id in order_ids {
            if self.orders.remove(id).is_some() {
                report.orders += 1;
            }
        }
    }
}

/// In-memory store implementation for testing and local development.
///
/// Committed tables sit behind an `Arc` and are never mutated in place.
/// [`Store::begin`] only clones that `Arc`, so read-only transactions neither
/// copy data nor block each other. The first write of a transaction takes the
/// writer lock, re-reads the committed tables and copies them; commit swaps
/// the copy in. Writers are therefore serialized while readers are not.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Arc<Tables>>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the number of committed order items.
    pub async fn order_item_count(&self) -> usize {
        self.tables.read().await.order_items.len()
    }

    async fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&*self.tables.read().await)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(MemoryTransaction {
            working: self.snapshot().await,
            store: self.clone(),
            writer: None,
        })
    }
}

/// Transaction over an [`InMemoryStore`].
///
/// Reads see the snapshot taken at [`Store::begin`] until the first write,
/// after which they see the transaction's own copy.
pub struct MemoryTransaction {
    store: InMemoryStore,
    working: Arc<Tables>,
    writer: Option<OwnedMutexGuard<()>>,
}

impl MemoryTransaction {
    /// Returns the transaction's private tables, taking the writer lock and
    /// refreshing from the committed state on first use.
    async fn write(&mut self) -> &mut Tables {
        if self.writer.is_none() {
            let guard = Arc::clone(&self.store.writer).lock_owned().await;
            self.working = self.store.snapshot().await;
            self.writer = Some(guard);
        }
        Arc::make_mut(&mut self.working)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        let MemoryTransaction {
            store,
            working,
            writer,
        } = self;
        if writer.is_some() {
            *store.tables.write().await = working;
        }
        drop(writer);
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for MemoryTransaction {
    async fn list_restaurants(&mut self) -> Result<Vec<Restaurant>> {
        Ok(self.working.restaurants.values().cloned().collect())
    }

    async fn find_restaurant(&mut self, id: RestaurantId) -> Result<Option<Restaurant>> {
        Ok(self.working.restaurants.get(&id).cloned())
    }

    async fn list_menu_items(&mut self, restaurant_id: RestaurantId) -> Result<Vec<MenuItem>> {
        Ok(self
            .working
            .menu_items
            .values()
            .filter(|item| item.restaurant_id == restaurant_id)
            .cloned()
            .collect())
    }

    async fn find_menu_item(
        &mut self,
        restaurant_id: RestaurantId,
        menu_item_id: MenuItemId,
    ) -> Result<Option<MenuItem>> {
        Ok(self
            .working
            .menu_items
            .get(&menu_item_id)
            .filter(|item| item.restaurant_id == restaurant_id)
            .cloned())
    }

    async fn find_menu_items(&mut self, ids: &[MenuItemId]) -> Result<Vec<MenuItem>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.menu_items.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let tables = self.write().await;
        if !tables.users.contains_key(&order.customer_id) {
            return Err(StoreError::MissingReference {
                entity: "user",
                id: order.customer_id.as_i64(),
            });
        }
        if !tables.restaurants.contains_key(&order.restaurant_id) {
            return Err(StoreError::MissingReference {
                entity: "restaurant",
                id: order.restaurant_id.as_i64(),
            });
        }

        let record = OrderRecord {
            id: OrderId::new(next_id(&mut tables.sequences.orders)),
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            created_at: order.created_at,
            status: order.status,
        };
        tables.orders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord> {
        let tables = self.write().await;
        if !tables.orders.contains_key(&item.order_id) {
            return Err(StoreError::MissingReference {
                entity: "order",
                id: item.order_id.as_i64(),
            });
        }
        if !tables.menu_items.contains_key(&item.menu_item_id) {
            return Err(StoreError::MissingReference {
                entity: "menu_item",
                id: item.menu_item_id.as_i64(),
            });
        }
        if item.quantity == 0 {
            return Err(StoreError::Decode(
                "order item quantity must be at least 1".to_string(),
            ));
        }

        let record = OrderItemRecord {
            id: OrderItemId::new(next_id(&mut tables.sequences.order_items)),
            order_id: item.order_id,
            menu_item_id: item.menu_item_id,
            quantity: item.quantity,
            price: item.price,
            special_instructions: item.special_instructions,
        };
        tables.order_items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn find_order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let tables = self.write().await;
        Ok(tables.orders.get(&id).cloned())
    }

    async fn list_orders(&mut self) -> Result<Vec<OrderRecord>> {
        Ok(self.working.orders.values().cloned().collect())
    }

    async fn list_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        Ok(self
            .working
            .order_items
            .values()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<OrderRecord>> {
        let tables = self.write().await;
        Ok(tables.orders.get_mut(&id).map(|order| {
            order.status = status;
            order.clone()
        }))
    }
}

#[async_trait]
impl IdentityRepository for MemoryTransaction {
    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        let tables = self.write().await;
        if tables
            .users
            .values()
            .any(|u| u.username == user.username)
        {
            return Err(StoreError::Conflict {
                constraint: "unique_username".to_string(),
            });
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict {
                constraint: "unique_email".to_string(),
            });
        }

        let record = User {
            id: UserId::new(next_id(&mut tables.sequences.users)),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            date_joined: chrono::Utc::now(),
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_users(&mut self, ids: &[UserId]) -> Result<Vec<User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.users.get(id).cloned())
            .collect())
    }

    async fn find_token_for_user(&mut self, user_id: UserId) -> Result<Option<AuthToken>> {
        Ok(self
            .working
            .tokens
            .values()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn insert_token(&mut self, token: AuthToken) -> Result<AuthToken> {
        let tables = self.write().await;
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::MissingReference {
                entity: "user",
                id: token.user_id.as_i64(),
            });
        }
        if tables.tokens.contains_key(&token.key) {
            return Err(StoreError::Conflict {
                constraint: "auth_tokens_pkey".to_string(),
            });
        }
        if tables
            .tokens
            .values()
            .any(|t| t.user_id == token.user_id)
        {
            return Err(StoreError::Conflict {
                constraint: "unique_token_user".to_string(),
            });
        }

        tables.tokens.insert(token.key.clone(), token.clone());
        Ok(token)
    }

    async fn find_user_by_token(&mut self, key: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .tokens
            .get(key)
            .and_then(|token| self.working.users.get(&token.user_id))
            .cloned())
    }
}


#[async_trait]
impl AdminRepository for MemoryTransaction {
    async fn insert_restaurant(&mut self, restaurant: NewRestaurant) -> Result<Restaurant> {
        let tables = self.write().await;
        let record = Restaurant {
            id: RestaurantId::new(next_id(&mut tables.sequences.restaurants)),
            name: restaurant.name,
            address: restaurant.address,
        };
        tables.restaurants.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_menu_item(&mut self, item: NewMenuItem) -> Result<MenuItem> {
        let tables = self.write().await;
        if !tables.restaurants.contains_key(&item.restaurant_id) {
            return Err(StoreError::MissingReference {
                entity: "restaurant",
                id: item.restaurant_id.as_i64(),
            });
        }

        let record = MenuItem {
            id: MenuItemId::new(next_id(&mut tables.sequences.menu_items)),
            restaurant_id: item.restaurant_id,
            name: item.name,
            description: item.description,
            price: item.price,
        };
        tables.menu_items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_menu_item_price(
        &mut self,
        id: MenuItemId,
        price: Money,
    ) -> Result<Option<MenuItem>> {
        let tables = self.write().await;
        Ok(tables.menu_items.get_mut(&id).map(|item| {
            item.price = price;
            item.clone()
        }))
    }

    async fn delete_restaurant(
        &mut self,
        id: RestaurantId,
        policy: DeletePolicy,
    ) -> Result<DeleteReport> {
        let tables = self.write().await;
        let mut report = DeleteReport::default();
        if !tables.restaurants.contains_key(&id) {
            return Ok(report);
        }

        let menu_item_ids: Vec<MenuItemId> = tables
            .menu_items
            .values()
            .filter(|item| item.restaurant_id == id)
            .map(|item| item.id)
            .collect();
        let order_ids: Vec<OrderId> = tables
            .orders
            .values()
            .filter(|order| order.restaurant_id == id)
            .map(|order| order.id)
            .collect();

        if policy == DeletePolicy::Reject {
            let dependents = (menu_item_ids.len() + order_ids.len()) as u64;
            if dependents > 0 {
                return Err(StoreError::HasDependents {
                    entity: "restaurant",
                    id: id.as_i64(),
                    dependents,
                });
            }
        }

        tables.remove_orders(&order_ids, &menu_item_ids, &mut report);
        for item_id in &menu_item_ids {
            tables.menu_items.remove(item_id);
        }
        report.menu_items = menu_item_ids.len() as u64;
        tables.restaurants.remove(&id);
        report.restaurants = 1;

        Ok(report)
    }

    async fn delete_user(&mut self, username: &str) -> Result<Option<DeleteReport>> {
        let tables = self.write().await;
        let Some(user_id) = tables
            .users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id)
        else {
            return Ok(None);
        };

        let mut report = DeleteReport::default();
        let order_ids: Vec<OrderId> = tables
            .orders
            .values()
            .filter(|order| order.customer_id == user_id)
            .map(|order| order.id)
            .collect();

        tables.remove_orders(&order_ids, &[], &mut report);
        tables.tokens.retain(|_, token| token.user_id != user_id);
        tables.users.remove(&user_id);
        report.users = 1;

        Ok(Some(report))
    }

    async fn clear_catalog(&mut self) -> Result<DeleteReport> {
        let tables = self.write().await;
        let report = DeleteReport {
            users: 0,
            restaurants: tables.restaurants.len() as u64,
            menu_items: tables.menu_items.len() as u64,
            orders: tables.orders.len() as u64,
            order_items: tables.order_items.len() as u64,
        };

        tables.order_items.clear();
        tables.orders.clear();
        tables.menu_items.clear();
        tables.restaurants.clear();

        Ok(report)
    }
}
