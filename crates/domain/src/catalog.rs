//! Read-only access to restaurants and their menus.

use common::{MenuItemId, Money, RestaurantId};
use serde::Serialize;
use store::{CatalogRepository, MenuItem, Restaurant, Store, Transaction};

use crate::error::DomainError;

/// Public shape of a menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItemView {
    pub id: MenuItemId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
}

impl From<MenuItem> for MenuItemView {
    fn from(item: MenuItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            price: item.price,
        }
    }
}

/// A restaurant together with its full menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestaurantDetail {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub menu: Vec<MenuItemView>,
}

/// Service for browsing the catalog.
#[derive(Clone)]
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists all restaurants in creation order.
    #[tracing::instrument(skip(self))]
    pub async fn list_restaurants(&self) -> Result<Vec<Restaurant>, DomainError> {
        let mut tx = self.store.begin().await?;
        let restaurants = tx.list_restaurants().await?;
        tx.commit().await?;
        Ok(restaurants)
    }

    /// Loads a restaurant with its menu.
    #[tracing::instrument(skip(self))]
    pub async fn get_restaurant(&self, id: RestaurantId) -> Result<RestaurantDetail, DomainError> {
        let mut tx = self.store.begin().await?;
        let restaurant = tx
            .find_restaurant(id)
            .await?
            .ok_or_else(|| DomainError::restaurant_not_found(id))?;
        let menu = tx.list_menu_items(id).await?;
        tx.commit().await?;

        Ok(RestaurantDetail {
            restaurant,
            menu: menu.into_iter().map(MenuItemView::from).collect(),
        })
    }

    /// Lists the menu of a restaurant. Fails with `NotFound` if the
    /// restaurant does not exist (an existing restaurant may have an empty menu).
    #[tracing::instrument(skip(self))]
    pub async fn list_menu(&self, id: RestaurantId) -> Result<Vec<MenuItemView>, DomainError> {
        let mut tx = self.store.begin().await?;
        if tx.find_restaurant(id).await?.is_none() {
            return Err(DomainError::restaurant_not_found(id));
        }
        let menu = tx.list_menu_items(id).await?;
        tx.commit().await?;

        Ok(menu.into_iter().map(MenuItemView::from).collect())
    }

    /// Checks that the store accepts transactions.
    pub async fn probe(&self) -> Result<(), DomainError> {
        let tx = self.store.begin().await?;
        tx.commit().await?;
        Ok(())
    }
}
