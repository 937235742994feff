use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, warn};

use super::OrderStore;
use crate::error::Result;
use crate::models::{BuyerId, Order, OrderStatus};

type OrderRow = (i64, i64, i64, i64, i32, String, DateTime<Utc>);

const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, product_id, quantity, status, created_at";

/// PostgreSQL-backed order store
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_order(row: OrderRow) -> Option<Order> {
        let (id, buyer_id, seller_id, product_id, quantity, status, created_at) = row;
        match status.parse::<OrderStatus>() {
            Ok(status) => Some(Order {
                id,
                buyer_id,
                seller_id,
                product_id,
                quantity,
                status,
                created_at,
            }),
            Err(err) => {
                warn!(order_id = id, "Skipping order with {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn list_confirmed_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status = ANY($1) ORDER BY id",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::confirmed_strs())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list confirmed orders: {}", e);
            e
        })?;

        Ok(rows.into_iter().filter_map(Self::into_order).collect())
    }

    async fn list_buyer_orders(&self, buyer_id: BuyerId) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        ))
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(buyer_id, "Failed to list buyer orders: {}", e);
            e
        })?;

        Ok(rows.into_iter().filter_map(Self::into_order).collect())
    }

    async fn latest_confirmed_order(&self, buyer_id: BuyerId) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE buyer_id = $1 AND status = ANY($2)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
            ORDER_COLUMNS
        ))
        .bind(buyer_id)
        .bind(OrderStatus::confirmed_strs())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(buyer_id, "Failed to fetch latest confirmed order: {}", e);
            e
        })?;

        Ok(row.and_then(Self::into_order))
    }
}
