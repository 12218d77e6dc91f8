//! Domain error types.

use std::collections::BTreeMap;

use common::{MenuItemId, OrderStatus, RestaurantId, UnknownStatus};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Field-scoped validation messages, keyed by the request field they concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns `Ok(())` when no message was recorded.
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

/// A cart referenced something that does not exist in the catalog
/// (or not within the ordered restaurant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReference {
    Restaurant(RestaurantId),
    MenuItem(MenuItemId),
}

impl InvalidReference {
    /// Request field the reference came from.
    pub fn field(&self) -> &'static str {
        match self {
            InvalidReference::Restaurant(_) => "restaurantId",
            InvalidReference::MenuItem(_) => "items",
        }
    }
}

impl std::fmt::Display for InvalidReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReference::Restaurant(_) => write!(f, "Invalid restaurant ID."),
            InvalidReference::MenuItem(id) => {
                write!(f, "Invalid menu item ID: {id} for the given restaurant.")
            }
        }
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// A referenced restaurant or menu item is unknown or out of scope.
    #[error("{0}")]
    InvalidReference(InvalidReference),

    /// The entity does not exist, or the caller may not see it.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The requested status is not one of the known statuses.
    #[error("{0}")]
    InvalidStatus(#[from] UnknownStatus),

    /// The status change is not allowed from the current status.
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Missing or unknown bearer token.
    #[error("Invalid or missing authentication token")]
    Unauthenticated,

    /// Username/password pair did not match.
    #[error("Invalid credentials.")]
    InvalidCredentials,

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A blocking worker panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<InvalidReference> for DomainError {
    fn from(reference: InvalidReference) -> Self {
        DomainError::InvalidReference(reference)
    }
}

impl From<FieldErrors> for DomainError {
    fn from(errors: FieldErrors) -> Self {
        DomainError::Validation(errors)
    }
}

impl DomainError {
    pub(crate) fn order_not_found(id: common::OrderId) -> Self {
        DomainError::NotFound {
            entity: "order",
            id: id.as_i64(),
        }
    }

    pub(crate) fn restaurant_not_found(id: RestaurantId) -> Self {
        DomainError::NotFound {
            entity: "restaurant",
            id: id.as_i64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_keep_first_message() {
        let mut errors = FieldErrors::new();
        errors.add("password", "too short");
        errors.add("password", "too common");
        errors.add("email", "taken");
        assert_eq!(errors.get("password"), Some("too short"));
        assert_eq!(errors.to_string(), "email: taken; password: too short");
    }

    #[test]
    fn field_errors_serialize_as_flat_object() {
        let errors = FieldErrors::single("restaurantId", "Invalid restaurant ID.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "restaurantId": "Invalid restaurant ID." })
        );
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(matches!(
            FieldErrors::single("items", "x").into_result(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn invalid_reference_messages_name_the_field() {
        let restaurant = InvalidReference::Restaurant(RestaurantId::new(999));
        assert_eq!(restaurant.field(), "restaurantId");
        assert_eq!(restaurant.to_string(), "Invalid restaurant ID.");

        let item = InvalidReference::MenuItem(MenuItemId::new(7));
        assert_eq!(item.field(), "items");
        assert_eq!(
            item.to_string(),
            "Invalid menu item ID: 7 for the given restaurant."
        );
    }
}
