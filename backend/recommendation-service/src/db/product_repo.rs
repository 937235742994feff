use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use super::ProductStore;
use crate::error::Result;
use crate::models::{Product, ProductId};

/// PostgreSQL-backed product catalog
#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<
            _,
            (
                i64,           // id
                i64,           // seller_id
                String,        // name
                String,        // category
                String,        // description
                f64,           // price (NUMERIC -> f64)
                i32,           // stock_quantity
                DateTime<Utc>, // created_at
            ),
        >(
            r#"
            SELECT
                id,
                seller_id,
                name,
                category,
                description,
                price::FLOAT8 AS price,
                stock_quantity,
                created_at
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch products: {}", e);
            e
        })?;

        Ok(rows
            .into_iter()
            .map(
                |(id, seller_id, name, category, description, price, stock_quantity, created_at)| {
                    Product {
                        id,
                        seller_id,
                        name,
                        category,
                        description,
                        price,
                        stock_quantity,
                        created_at,
                    }
                },
            )
            .collect())
    }
}
