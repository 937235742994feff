//! Read-side data access for orders and products
//!
//! The recommender only depends on the `OrderStore` / `ProductStore` traits;
//! PostgreSQL and in-memory backends both satisfy them.

pub mod memory;
pub mod order_repo;
pub mod product_repo;

pub use memory::InMemoryStore;
pub use order_repo::PgOrderStore;
pub use product_repo::PgProductStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BuyerId, Order, Product, ProductId};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// All orders whose status is paid, shipped or completed
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>>;

    /// Every order the buyer ever placed, any status
    async fn list_buyer_orders(&self, buyer_id: BuyerId) -> Result<Vec<Order>>;

    /// Most recent confirmed order by `created_at`
    async fn latest_confirmed_order(&self, buyer_id: BuyerId) -> Result<Option<Order>>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Unknown ids are silently skipped; result order is unspecified
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;
}
