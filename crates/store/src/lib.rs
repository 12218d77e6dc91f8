//! Persistence layer for the food ordering backend.
//!
//! Provides explicit repository traits over a transaction handle, with an
//! in-memory backend for tests and a PostgreSQL backend for production.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    AuthToken, DeletePolicy, DeleteReport, MenuItem, NewMenuItem, NewOrder, NewOrderItem,
    NewRestaurant, NewUser, OrderItemRecord, OrderRecord, Restaurant, User,
};
pub use postgres::PostgresStore;
pub use repository::{
    AdminRepository, CatalogRepository, IdentityRepository, OrderRepository, Store, Transaction,
};
