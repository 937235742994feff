use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::{RecommenderError, Result};
use crate::models::{BuyerId, Order, ProductId};

/// Implicit feedback: the buyer bought the product at least once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interaction {
    pub buyer_id: BuyerId,
    pub product_id: ProductId,
}

/// Deduplicated interactions, iterated in (buyer, product) order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionSet {
    pairs: BTreeSet<Interaction>,
}

impl InteractionSet {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn contains(&self, buyer_id: BuyerId, product_id: ProductId) -> bool {
        self.pairs.contains(&Interaction {
            buyer_id,
            product_id,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.pairs.iter()
    }

    /// Distinct buyers, ascending
    pub fn buyers(&self) -> Vec<BuyerId> {
        let buyers: BTreeSet<BuyerId> = self.pairs.iter().map(|i| i.buyer_id).collect();
        buyers.into_iter().collect()
    }

    /// Distinct products, ascending
    pub fn products(&self) -> Vec<ProductId> {
        let products: BTreeSet<ProductId> = self.pairs.iter().map(|i| i.product_id).collect();
        products.into_iter().collect()
    }
}

impl FromIterator<Interaction> for InteractionSet {
    fn from_iter<T: IntoIterator<Item = Interaction>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Collapse order history into (buyer, product) pairs
///
/// Orders outside the confirmed status set are ignored. Returns
/// `NoInteractionData` when nothing qualifies so the caller can skip training.
pub fn extract_interactions(orders: &[Order]) -> Result<InteractionSet> {
    let set: InteractionSet = orders
        .iter()
        .filter(|o| o.status.is_confirmed())
        .map(|o| Interaction {
            buyer_id: o.buyer_id,
            product_id: o.product_id,
        })
        .collect();

    if set.is_empty() {
        return Err(RecommenderError::NoInteractionData);
    }

    Ok(set)
}

/// Product ids a buyer has ever ordered, regardless of status
pub fn ordered_products(orders: &[Order]) -> HashSet<ProductId> {
    orders.iter().map(|o| o.product_id).collect()
}
