use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BuyerId = i64;
pub type ProductId = i64;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Seller needs to approve
    PendingApproval,
    /// Buyer needs to pay
    PendingPayment,
    Paid,
    Shipped,
    Completed,
    Rejected,
}

impl OrderStatus {
    /// Statuses that count as a genuine purchase signal
    pub const CONFIRMED: [OrderStatus; 3] =
        [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Completed];

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Paid | Self::Shipped | Self::Completed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// SQL-ready list of confirmed status strings
    pub fn confirmed_strs() -> Vec<String> {
        Self::CONFIRMED.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(Self::PendingApproval),
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// A buyer's order for a single product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub buyer_id: BuyerId,
    pub seller_id: i64,
    pub product_id: ProductId,
    pub quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Catalog product listed by a seller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_statuses() {
        assert!(OrderStatus::Paid.is_confirmed());
        assert!(OrderStatus::Shipped.is_confirmed());
        assert!(OrderStatus::Completed.is_confirmed());
        assert!(!OrderStatus::PendingApproval.is_confirmed());
        assert!(!OrderStatus::PendingPayment.is_confirmed());
        assert!(!OrderStatus::Rejected.is_confirmed());
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            OrderStatus::PendingApproval,
            OrderStatus::PendingPayment,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Completed,
            OrderStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PendingPayment).unwrap();
        assert_eq!(json, "\"pending_payment\"");
    }
}
