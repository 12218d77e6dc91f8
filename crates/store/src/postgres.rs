use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderItemId, OrderStatus, RestaurantId, UserId};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};

use crate::model::{
    AuthToken, DeletePolicy, DeleteReport, MenuItem, NewMenuItem, NewOrder, NewOrderItem,
    NewRestaurant, NewUser, OrderItemRecord, OrderRecord, Restaurant, User,
};
use crate::repository::{
    AdminRepository, CatalogRepository, IdentityRepository, OrderRepository, Store, Transaction,
};
use crate::{Result, StoreError};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`] connection.
///
/// Dropping it without calling [`Transaction::commit`] rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::Conflict {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
    }
    StoreError::Database(e)
}

fn price_from_row(row: &PgRow) -> Result<Money> {
    Ok(Money::from_cents(row.try_get("price_cents")?))
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        date_joined: row.try_get::<DateTime<Utc>, _>("date_joined")?,
    })
}

fn row_to_restaurant(row: PgRow) -> Result<Restaurant> {
    Ok(Restaurant {
        id: RestaurantId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
    })
}

fn row_to_menu_item(row: PgRow) -> Result<MenuItem> {
    Ok(MenuItem {
        id: MenuItemId::new(row.try_get("id")?),
        restaurant_id: RestaurantId::new(row.try_get("restaurant_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: price_from_row(&row)?,
    })
}

fn row_to_order(row: PgRow) -> Result<OrderRecord> {
    let status: String = row.try_get("status")?;
    Ok(OrderRecord {
        id: OrderId::new(row.try_get("id")?),
        customer_id: UserId::new(row.try_get("customer_id")?),
        restaurant_id: RestaurantId::new(row.try_get("restaurant_id")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItemRecord> {
    let quantity: i32 = row.try_get("quantity")?;
    Ok(OrderItemRecord {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        menu_item_id: MenuItemId::new(row.try_get("menu_item_id")?),
        quantity: u32::try_from(quantity)
            .map_err(|_| StoreError::Decode(format!("negative quantity {quantity}")))?,
        price: price_from_row(&row)?,
        special_instructions: row.try_get("special_instructions")?,
    })
}

fn row_to_token(row: PgRow) -> Result<AuthToken> {
    Ok(AuthToken {
        key: row.try_get("key")?,
        user_id: UserId::new(row.try_get("user_id")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

const USER_COLUMNS: &str = "id, username, email, password_hash, date_joined";
const MENU_ITEM_COLUMNS: &str = "id, restaurant_id, name, description, price_cents";
const ORDER_COLUMNS: &str = "id, customer_id, restaurant_id, created_at, status";
const ORDER_ITEM_COLUMNS: &str =
    "id, order_id, menu_item_id, quantity, price_cents, special_instructions";

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for PostgresTransaction {
    async fn list_restaurants(&mut self) -> Result<Vec<Restaurant>> {
        let rows = sqlx::query("SELECT id, name, address FROM restaurants ORDER BY id ASC")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(row_to_restaurant).collect()
    }

    async fn find_restaurant(&mut self, id: RestaurantId) -> Result<Option<Restaurant>> {
        let row = sqlx::query("SELECT id, name, address FROM restaurants WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_restaurant).transpose()
    }

    async fn list_menu_items(&mut self, restaurant_id: RestaurantId) -> Result<Vec<MenuItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE restaurant_id = $1 ORDER BY id ASC"
        ))
        .bind(restaurant_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_menu_item).collect()
    }

    async fn find_menu_item(
        &mut self,
        restaurant_id: RestaurantId,
        menu_item_id: MenuItemId,
    ) -> Result<Option<MenuItem>> {
        let row = sqlx::query(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE id = $1 AND restaurant_id = $2"
        ))
        .bind(menu_item_id.as_i64())
        .bind(restaurant_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_menu_item).transpose()
    }

    async fn find_menu_items(&mut self, ids: &[MenuItemId]) -> Result<Vec<MenuItem>> {
        let raw: Vec<i64> = ids.iter().map(MenuItemId::as_i64).collect();
        let rows = sqlx::query(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE id = ANY($1) ORDER BY id ASC"
        ))
        .bind(raw)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_menu_item).collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (customer_id, restaurant_id, created_at, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.customer_id.as_i64())
        .bind(order.restaurant_id.as_i64())
        .bind(order.created_at)
        .bind(order.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_order(row)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItemRecord> {
        let quantity = i32::try_from(item.quantity)
            .map_err(|_| StoreError::Decode(format!("quantity {} too large", item.quantity)))?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_items (order_id, menu_item_id, quantity, price_cents, special_instructions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_ITEM_COLUMNS}
            "#
        ))
        .bind(item.order_id.as_i64())
        .bind(item.menu_item_id.as_i64())
        .bind(quantity)
        .bind(item.price.cents())
        .bind(&item.special_instructions)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_order_item(row)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn find_order_for_update(&mut self, id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_order).transpose()
    }

    async fn list_orders(&mut self) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id ASC"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn list_order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItemRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_order_item).collect()
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_order).transpose()
    }
}

#[async_trait]
impl IdentityRepository for PostgresTransaction {
    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_user(row)
    }

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_user).transpose()
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_user).transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_user).transpose()
    }

    async fn find_users(&mut self, ids: &[UserId]) -> Result<Vec<User>> {
        let raw: Vec<i64> = ids.iter().map(UserId::as_i64).collect();
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY id ASC"
        ))
        .bind(raw)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_user).collect()
    }

    async fn find_token_for_user(&mut self, user_id: UserId) -> Result<Option<AuthToken>> {
        let row = sqlx::query("SELECT key, user_id, created_at FROM auth_tokens WHERE user_id = $1")
            .bind(user_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_token).transpose()
    }

    async fn insert_token(&mut self, token: AuthToken) -> Result<AuthToken> {
        let row = sqlx::query(
            r#"
            INSERT INTO auth_tokens (key, user_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING key, user_id, created_at
            "#,
        )
        .bind(&token.key)
        .bind(token.user_id.as_i64())
        .bind(token.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_token(row)
    }

    async fn find_user_by_token(&mut self, key: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash, u.date_joined
            FROM auth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_user).transpose()
    }
}

impl PostgresTransaction {
    async fn count(&mut self, sql: &str, id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count as u64)
    }

    async fn execute(&mut self, sql: &str, id: i64) -> Result<u64> {
        let result = sqlx::query(sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AdminRepository for PostgresTransaction {
    async fn insert_restaurant(&mut self, restaurant: NewRestaurant) -> Result<Restaurant> {
        let row = sqlx::query(
            "INSERT INTO restaurants (name, address) VALUES ($1, $2) RETURNING id, name, address",
        )
        .bind(&restaurant.name)
        .bind(&restaurant.address)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_restaurant(row)
    }

    async fn insert_menu_item(&mut self, item: NewMenuItem) -> Result<MenuItem> {
        if self.find_restaurant(item.restaurant_id).await?.is_none() {
            return Err(StoreError::MissingReference {
                entity: "restaurant",
                id: item.restaurant_id.as_i64(),
            });
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO menu_items (restaurant_id, name, description, price_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING {MENU_ITEM_COLUMNS}
            "#
        ))
        .bind(item.restaurant_id.as_i64())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price.cents())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        row_to_menu_item(row)
    }

    async fn update_menu_item_price(
        &mut self,
        id: MenuItemId,
        price: Money,
    ) -> Result<Option<MenuItem>> {
        let row = sqlx::query(&format!(
            "UPDATE menu_items SET price_cents = $2 WHERE id = $1 RETURNING {MENU_ITEM_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(price.cents())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_menu_item).transpose()
    }

    async fn delete_restaurant(
        &mut self,
        id: RestaurantId,
        policy: DeletePolicy,
    ) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        let raw = id.as_i64();

        // Lock the row so no new dependents appear while we count.
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM restaurants WHERE id = $1 FOR UPDATE")
                .bind(raw)
                .fetch_optional(&mut *self.tx)
                .await?;
        if exists.is_none() {
            return Ok(report);
        }

        if policy == DeletePolicy::Reject {
            let dependents = self
                .count(
                    "SELECT (SELECT COUNT(*) FROM menu_items WHERE restaurant_id = $1) \
                     + (SELECT COUNT(*) FROM orders WHERE restaurant_id = $1)",
                    raw,
                )
                .await?;
            if dependents > 0 {
                return Err(StoreError::HasDependents {
                    entity: "restaurant",
                    id: raw,
                    dependents,
                });
            }
        }

        report.order_items = self
            .execute(
                r#"
                DELETE FROM order_items
                WHERE order_id IN (SELECT id FROM orders WHERE restaurant_id = $1)
                   OR menu_item_id IN (SELECT id FROM menu_items WHERE restaurant_id = $1)
                "#,
                raw,
            )
            .await?;
        report.orders = self
            .execute("DELETE FROM orders WHERE restaurant_id = $1", raw)
            .await?;
        report.menu_items = self
            .execute("DELETE FROM menu_items WHERE restaurant_id = $1", raw)
            .await?;
        report.restaurants = self
            .execute("DELETE FROM restaurants WHERE id = $1", raw)
            .await?;

        tracing::debug!(restaurant_id = raw, ?report, "restaurant deleted");
        Ok(report)
    }

    async fn delete_user(&mut self, username: &str) -> Result<Option<DeleteReport>> {
        let Some(user) = self.find_user_by_username(username).await? else {
            return Ok(None);
        };
        let raw = user.id.as_i64();

        let mut report = DeleteReport {
            order_items: self
                .execute(
                    "DELETE FROM order_items WHERE order_id IN (SELECT id FROM orders WHERE customer_id = $1)",
                    raw,
                )
                .await?,
            ..DeleteReport::default()
        };
        report.orders = self
            .execute("DELETE FROM orders WHERE customer_id = $1", raw)
            .await?;
        self.execute("DELETE FROM auth_tokens WHERE user_id = $1", raw)
            .await?;
        report.users = self.execute("DELETE FROM users WHERE id = $1", raw).await?;

        Ok(Some(report))
    }

    async fn clear_catalog(&mut self) -> Result<DeleteReport> {
        let mut report = DeleteReport::default();
        for (table, slot) in [
            ("order_items", &mut report.order_items),
            ("orders", &mut report.orders),
            ("menu_items", &mut report.menu_items),
            ("restaurants", &mut report.restaurants),
        ] {
            let result = sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *self.tx)
                .await?;
            *slot = result.rows_affected();
        }
        Ok(report)
    }
}
