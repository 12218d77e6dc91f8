//! Shared identifiers and value types for the food ordering backend.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, UnknownStatus};
pub use types::{MenuItemId, OrderId, OrderItemId, RestaurantId, UserId};
