use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{OrderStore, ProductStore};
use crate::error::Result;
use crate::models::{BuyerId, Order, Product, ProductId};

/// In-process order and product store
///
/// Backs the unit and integration tests.
#[derive(Default)]
pub struct InMemoryStore {
    orders: RwLock<Vec<Order>>,
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(orders: Vec<Order>, products: Vec<Product>) -> Self {
        Self {
            orders: RwLock::new(orders),
            products: RwLock::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn insert_order(&self, order: Order) {
        self.orders.write().await.push(order);
    }

    pub async fn insert_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.status.is_confirmed())
            .cloned()
            .collect())
    }

    async fn list_buyer_orders(&self, buyer_id: BuyerId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(orders)
    }

    async fn latest_confirmed_order(&self, buyer_id: BuyerId) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.buyer_id == buyer_id && o.status.is_confirmed())
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}
