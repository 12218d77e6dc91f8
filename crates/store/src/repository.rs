//! Repository traits.
//!
//! Every repository method runs against an explicit transaction handle
//! obtained from [`Store::begin`]. Work becomes visible to other transactions
//! only after [`Transaction::commit`]; dropping a transaction without
//! committing rolls it back.

use async_trait::async_trait;
use common::{MenuItemId, Money, OrderId, OrderStatus, RestaurantId, UserId};

use crate::Result;
use crate::model::{
    AuthToken, DeletePolicy, DeleteReport, MenuItem, NewMenuItem, NewOrder, NewOrderItem,
    NewRestaurant, NewUser, OrderItemRecord, OrderRecord, Restaurant, User,
};

/// Read access to restaurants and their menus.
#[async_trait]
pub trait CatalogRepository: Send {
    /// Lists all restaurants in creation order.
    async fn list_restaurants(&mut self) -> Result<Vec<Restaurant>>;

    async fn find_restaurant(&mut self, id: RestaurantId) -> Result<Option<Restaurant>>;

    /// Lists the menu of a restaurant in creation order.
    async fn list_menu_items(&mut self, restaurant_id: RestaurantId) -> Result<Vec<MenuItem>>;

    /// Finds a menu item only if it belongs to `restaurant_id`.
    async fn find_menu_item(
        &mut self,
        restaurant_id: RestaurantId,
        menu_item_id: MenuItemId,
    ) -> Result<Option<MenuItem>>;

    /// Fetches the given menu items regardless of restaurant. Unknown ids are skipped.
    async fn find_menu_items(&mut self, ids: &[MenuItemId]) -> Result<Vec<MenuItem>>;
}

/// Orders and their line items.
#[async_trait]
pub trait OrderRepository: Send {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord>;

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord>;

    async fn find_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Like [`find_order`](Self::find_order), but locks the order until the
    /// transaction ends so a decision based on its current state cannot race
    /// another writer.
    async fn find_order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>>;

    /// Lists all orders in creation order.
    async fn list_orders(&mut self) -> Result<Vec<OrderRecord>>;

    /// Lists the items of an order in insertion order.
    async fn list_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>>;

    /// Sets the status of an order. Returns `None` if the order does not exist.
    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<OrderRecord>>;
}

/// Users and their bearer tokens.
#[async_trait]
pub trait IdentityRepository: Send {
    async fn insert_user(&mut self, user: NewUser) -> Result<User>;

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>>;

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>>;

    /// Fetches several users at once. Unknown ids are skipped.
    async fn find_users(&mut self, ids: &[UserId]) -> Result<Vec<User>>;

    async fn find_token_for_user(&mut self, user_id: UserId) -> Result<Option<AuthToken>>;

    async fn insert_token(&mut self, token: AuthToken) -> Result<AuthToken>;

    /// Resolves a token key to its owner.
    async fn find_user_by_token(&mut self, key: &str) -> Result<Option<User>>;
}

/// Seeding and deletion, used by the admin tooling.
#[async_trait]
pub trait AdminRepository: Send {
    async fn insert_restaurant(&mut self, restaurant: NewRestaurant) -> Result<Restaurant>;

    /// Fails with `MissingReference` if the owning restaurant does not exist.
    async fn insert_menu_item(&mut self, item: NewMenuItem) -> Result<MenuItem>;

    /// Changes the current price of a menu item. Existing order items keep
    /// the price they captured.
    async fn update_menu_item_price(
        &mut self,
        id: MenuItemId,
        price: Money,
    ) -> Result<Option<MenuItem>>;

    /// Deletes a restaurant, treating its menu items and orders per `policy`.
    /// Deleting a restaurant that does not exist reports zero rows.
    async fn delete_restaurant(
        &mut self,
        id: RestaurantId,
        policy: DeletePolicy,
    ) -> Result<DeleteReport>;

    /// Deletes a user together with their token, orders and order items.
    /// Returns `None` if no such user exists.
    async fn delete_user(&mut self, username: &str) -> Result<Option<DeleteReport>>;

    /// Deletes every order item, order, menu item and restaurant.
    async fn clear_catalog(&mut self) -> Result<DeleteReport>;
}

/// A unit of work spanning every repository.
#[async_trait]
pub trait Transaction:
    CatalogRepository + OrderRepository + IdentityRepository + AdminRepository + Send
{
    /// Makes all changes visible atomically.
    async fn commit(self) -> Result<()>;
}

/// Entry point to a storage backend.
///
/// All implementations must be thread-safe and cheap to clone.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: Transaction;

    /// Opens a new transaction (read committed or stronger).
    async fn begin(&self) -> Result<Self::Tx>;
}
