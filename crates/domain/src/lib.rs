//! Domain layer for the food ordering backend.
//!
//! This crate provides the services the HTTP gateway delegates to:
//! - `OrderService`: atomic order placement, ownership-checked lookup and the
//!   status lifecycle
//! - `CatalogService`: restaurants and menus
//! - `IdentityService`: registration, login and token authentication
//! - `Fixtures`: demo data for local development

pub mod catalog;
pub mod error;
pub mod fixtures;
pub mod identity;
pub mod order;

pub use catalog::{CatalogService, MenuItemView, RestaurantDetail};
pub use error::{DomainError, FieldErrors, InvalidReference};
pub use fixtures::{ClearReport, Fixtures, PopulateReport};
pub use identity::{IdentityService, Login, PasswordHasher, RegisterUser, UserProfile};
pub use order::{
    CartItem, OrderItemView, OrderService, OrderView, PlaceOrder, TransitionPolicy, UpdateStatus,
};
