//! Order commands.

use common::{MenuItemId, OrderId, RestaurantId, UserId};

use crate::error::FieldErrors;

/// Largest quantity a single cart line may request.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

/// One requested line of a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
    pub special_instructions: Option<String>,
}

impl CartItem {
    /// Creates a cart line with the given quantity and no instructions.
    pub fn new(menu_item_id: MenuItemId, quantity: u32) -> Self {
        Self {
            menu_item_id,
            quantity,
            special_instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.special_instructions = Some(instructions.into());
        self
    }
}

/// Command to place a new order from a cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The authenticated customer placing the order.
    pub customer_id: UserId,

    /// The restaurant every item must belong to.
    pub restaurant_id: RestaurantId,

    /// Cart lines, in the order they were submitted.
    pub items: Vec<CartItem>,
}

impl PlaceOrder {
    pub fn new(customer_id: UserId, restaurant_id: RestaurantId, items: Vec<CartItem>) -> Self {
        Self {
            customer_id,
            restaurant_id,
            items,
        }
    }

    /// Checks the cart shape. Catalog references are checked when placing.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.items.is_empty() {
            errors.add("items", "At least one item is required.");
        }
        if self.items.iter().any(|item| item.quantity < 1) {
            errors.add("items", "Quantity must be at least 1.");
        }
        if self.items.iter().any(|item| item.quantity > MAX_QUANTITY) {
            errors.add("items", format!("Quantity must be at most {MAX_QUANTITY}."));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Command to change the status of an order.
///
/// `status` is kept as the raw requested value so that unknown statuses are
/// reported by the service.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: String,
}

impl UpdateStatus {
    pub fn new(order_id: OrderId, status: impl Into<String>) -> Self {
        Self {
            order_id,
            status: status.into(),
        }
    }
}
