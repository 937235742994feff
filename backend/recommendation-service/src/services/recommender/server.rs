use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::artifacts::ArtifactStamp;
use super::interactions::ordered_products;
use super::{ArtifactStore, LoadedModel, RecommenderError, Result};
use crate::db::{OrderStore, ProductStore};
use crate::metrics;
use crate::models::{BuyerId, Product, ProductId};

struct CachedModel {
    model: Arc<LoadedModel>,
    stamp: ArtifactStamp,
}

/// In-memory copy of the persisted model
///
/// Reloaded when `invalidate` is called (in-process retraining) or when the
/// files on disk change. A reload always reads both artifacts together and
/// `LoadedModel::new` rejects pairs from different runs.
pub struct ModelCache {
    artifacts: ArtifactStore,
    state: RwLock<Option<CachedModel>>,
}

impl ModelCache {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            artifacts,
            state: RwLock::new(None),
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Current model, reloading from disk if stale
    pub async fn get(&self) -> Result<Arc<LoadedModel>> {
        let stamp = match self.artifacts.stamp() {
            Some(stamp) => stamp,
            None => {
                self.invalidate().await;
                return Err(RecommenderError::ArtifactMissing);
            }
        };

        {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if cached.stamp == stamp {
                    return Ok(cached.model.clone());
                }
            }
        }

        let mut state = self.state.write().await;
        // Another task may have reloaded while we waited
        if let Some(cached) = state.as_ref() {
            if cached.stamp == stamp {
                return Ok(cached.model.clone());
            }
        }

        let model = Arc::new(self.artifacts.load()?);
        info!(
            run_id = %model.run_id(),
            items = model.index().n_items(),
            "Recommendation model loaded"
        );
        metrics::record_model_reload(model.index().n_items());

        *state = Some(CachedModel {
            model: model.clone(),
            stamp,
        });
        Ok(model)
    }

    /// Drop the cached model; the next `get` reads from disk
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        if state.take().is_some() {
            debug!("Recommendation model cache invalidated");
        }
    }

    /// Model currently held in memory, without touching disk
    pub async fn cached(&self) -> Option<Arc<LoadedModel>> {
        self.state.read().await.as_ref().map(|c| c.model.clone())
    }
}

/// Why a recommendation came back empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    ZeroRequested,
    ArtifactMissing,
    ArtifactCorrupt,
    ArtifactMismatch,
    NoSeedOrder,
    SeedProductUnseen,
    AllExcluded,
    StoreError,
}

impl EmptyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroRequested => "zero_requested",
            Self::ArtifactMissing => "artifact_missing",
            Self::ArtifactCorrupt => "artifact_corrupt",
            Self::ArtifactMismatch => "artifact_mismatch",
            Self::NoSeedOrder => "no_seed_order",
            Self::SeedProductUnseen => "seed_product_unseen",
            Self::AllExcluded => "all_excluded",
            Self::StoreError => "store_error",
        }
    }

    fn from_error(err: &RecommenderError) -> Self {
        match err {
            RecommenderError::ArtifactMissing => Self::ArtifactMissing,
            RecommenderError::ArtifactMismatch(_) => Self::ArtifactMismatch,
            RecommenderError::NoSeedOrder(_) => Self::NoSeedOrder,
            RecommenderError::SeedProductUnseen(_) => Self::SeedProductUnseen,
            RecommenderError::Store(_) => Self::StoreError,
            _ => Self::ArtifactCorrupt,
        }
    }
}

/// Recommendation plus the diagnostic reason when it is empty
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationOutcome {
    pub product_ids: Vec<ProductId>,
    pub seed_product_id: Option<ProductId>,
    pub empty_reason: Option<EmptyReason>,
}

impl RecommendationOutcome {
    fn empty(reason: EmptyReason) -> Self {
        Self {
            product_ids: Vec::new(),
            seed_product_id: None,
            empty_reason: Some(reason),
        }
    }
}

/// Loaded model summary
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub run_id: Option<Uuid>,
    pub trained_at: Option<DateTime<Utc>>,
    pub products: usize,
    pub buyers: usize,
    pub n_neighbors: usize,
}

impl ModelInfo {
    fn unloaded() -> Self {
        Self {
            loaded: false,
            run_id: None,
            trained_at: None,
            products: 0,
            buyers: 0,
            n_neighbors: 0,
        }
    }
}

/// Online recommender: "similar to your last purchase, minus what you own"
pub struct RecommendationServer {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStore>,
    cache: Arc<ModelCache>,
    max_recommendations: usize,
}

impl RecommendationServer {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStore>,
        cache: Arc<ModelCache>,
        max_recommendations: usize,
    ) -> Self {
        Self {
            orders,
            products,
            cache,
            max_recommendations,
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Ranked product ids, closest first, at most `num_recs`
    ///
    /// Never fails: every problem yields an empty list.
    pub async fn recommend(&self, buyer_id: BuyerId, num_recs: usize) -> Vec<ProductId> {
        self.recommend_explained(buyer_id, num_recs).await.product_ids
    }

    /// Same as `recommend`, with the reason behind an empty result
    pub async fn recommend_explained(
        &self,
        buyer_id: BuyerId,
        num_recs: usize,
    ) -> RecommendationOutcome {
        let num_recs = num_recs.min(self.max_recommendations);
        if num_recs == 0 {
            metrics::record_recommendation(EmptyReason::ZeroRequested.as_str());
            return RecommendationOutcome::empty(EmptyReason::ZeroRequested);
        }

        let outcome = match self.try_recommend(buyer_id, num_recs).await {
            Ok((seed, ids)) if ids.is_empty() => {
                debug!(buyer_id, seed, "Every neighbour already ordered by buyer");
                RecommendationOutcome {
                    product_ids: ids,
                    seed_product_id: Some(seed),
                    empty_reason: Some(EmptyReason::AllExcluded),
                }
            }
            Ok((seed, ids)) => RecommendationOutcome {
                product_ids: ids,
                seed_product_id: Some(seed),
                empty_reason: None,
            },
            Err(err) => {
                match &err {
                    RecommenderError::NoSeedOrder(_) | RecommenderError::SeedProductUnseen(_) => {
                        info!(buyer_id, reason = err.kind(), "No recommendations: {}", err)
                    }
                    RecommenderError::ArtifactMissing => {
                        debug!(buyer_id, "Model files not found, train the model first")
                    }
                    _ => warn!(
                        buyer_id,
                        reason = err.kind(),
                        "Recommendation generation failed: {}",
                        err
                    ),
                }
                RecommendationOutcome::empty(EmptyReason::from_error(&err))
            }
        };

        metrics::record_recommendation(
            outcome
                .empty_reason
                .map(|r| r.as_str())
                .unwrap_or("served"),
        );
        outcome
    }

    /// Materialized products in ranked order
    ///
    /// Ids the product store no longer knows are dropped.
    pub async fn recommend_products(&self, buyer_id: BuyerId, num_recs: usize) -> Vec<Product> {
        let ids = self.recommend(buyer_id, num_recs).await;
        if ids.is_empty() {
            return Vec::new();
        }

        let fetched = match self.products.get_products(&ids).await {
            Ok(products) => products,
            Err(err) => {
                warn!(buyer_id, error = %err, "Failed to load recommended products");
                return Vec::new();
            }
        };

        let mut by_id: HashMap<ProductId, Product> =
            fetched.into_iter().map(|p| (p.id, p)).collect();
        ids.into_iter().filter_map(|id| by_id.remove(&id)).collect()
    }

    /// Summary of the model currently on disk
    pub async fn model_info(&self) -> ModelInfo {
        match self.cache.get().await {
            Ok(model) => ModelInfo {
                loaded: true,
                run_id: Some(model.run_id()),
                trained_at: Some(model.trained_at()),
                products: model.index().n_items(),
                buyers: model.index().n_features(),
                n_neighbors: model.index().n_neighbors(),
            },
            Err(err) => {
                debug!(reason = err.kind(), "No model available for info");
                ModelInfo::unloaded()
            }
        }
    }

    async fn try_recommend(
        &self,
        buyer_id: BuyerId,
        num_recs: usize,
    ) -> Result<(ProductId, Vec<ProductId>)> {
        let model = self.cache.get().await?;

        let seed_order = self
            .orders
            .latest_confirmed_order(buyer_id)
            .await?
            .ok_or(RecommenderError::NoSeedOrder(buyer_id))?;
        let seed_product = seed_order.product_id;

        let seed_idx = model
            .index_of(seed_product)
            .ok_or(RecommenderError::SeedProductUnseen(seed_product))?;

        // The configured neighbour count bounds every query, seed slot included
        let num_recs = num_recs.min(model.index().n_neighbors().saturating_sub(1));

        let neighbors = model
            .index()
            .kneighbors_of(seed_idx, num_recs + 1)
            .ok_or_else(|| {
                RecommenderError::ArtifactMismatch(format!(
                    "seed index {} outside fitted index",
                    seed_idx
                ))
            })?;

        let mut candidates = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            if neighbor.index == seed_idx {
                continue;
            }
            let product_id = model.product_at(neighbor.index).ok_or_else(|| {
                RecommenderError::ArtifactMismatch(format!(
                    "index {} has no product mapping",
                    neighbor.index
                ))
            })?;
            candidates.push(product_id);
        }

        let history = self.orders.list_buyer_orders(buyer_id).await?;
        let already_ordered = ordered_products(&history);

        let recommended: Vec<ProductId> = candidates
            .into_iter()
            .filter(|id| *id != seed_product && !already_ordered.contains(id))
            .take(num_recs)
            .collect();

        debug!(
            buyer_id,
            seed_product,
            count = recommended.len(),
            "Recommendations generated"
        );

        Ok((seed_product, recommended))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{Order, OrderStatus};
    use crate::services::recommender::ModelTrainer;
    use chrono::Duration;
    use tempfile::TempDir;

    fn order(
        id: i64,
        buyer_id: i64,
        product_id: i64,
        status: OrderStatus,
        minutes_ago: i64,
    ) -> Order {
        Order {
            id,
            buyer_id,
            seller_id: 1,
            product_id,
            quantity: 1,
            status,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    async fn setup(orders: Vec<Order>) -> (TempDir, Arc<InMemoryStore>, RecommendationServer) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::with_data(orders, vec![]));
        let artifacts = ArtifactStore::new(dir.path());
        let cache = Arc::new(ModelCache::new(artifacts.clone()));
        let trainer = ModelTrainer::new(store.clone(), artifacts, 10).with_cache(cache.clone());
        let _ = trainer.train().await;
        let server = RecommendationServer::new(store.clone(), store.clone(), cache, 9);
        (dir, store, server)
    }

    #[tokio::test]
    async fn test_zero_requested_is_empty() {
        let (_dir, _store, server) = setup(vec![order(1, 1, 10, OrderStatus::Paid, 5)]).await;
        let outcome = server.recommend_explained(1, 0).await;
        assert!(outcome.product_ids.is_empty());
        assert_eq!(outcome.empty_reason, Some(EmptyReason::ZeroRequested));
    }

    #[tokio::test]
    async fn test_unseen_seed_product() {
        let (_dir, store, server) = setup(vec![
            order(1, 1, 10, OrderStatus::Paid, 50),
            order(2, 2, 20, OrderStatus::Paid, 40),
        ])
        .await;

        // Ordered after training: not in the vocabulary
        store.insert_order(order(3, 1, 99, OrderStatus::Paid, 1)).await;

        let outcome = server.recommend_explained(1, 3).await;
        assert!(outcome.product_ids.is_empty());
        assert_eq!(outcome.empty_reason, Some(EmptyReason::SeedProductUnseen));
    }

    #[tokio::test]
    async fn test_missing_model_reported() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(ModelCache::new(ArtifactStore::new(dir.path())));
        let server = RecommendationServer::new(store.clone(), store, cache, 9);

        let outcome = server.recommend_explained(1, 4).await;
        assert_eq!(outcome.empty_reason, Some(EmptyReason::ArtifactMissing));
        assert!(!server.model_info().await.loaded);
    }

    #[tokio::test]
    async fn test_recommendation_ranked_closest_first() {
        // Product 10 co-bought with 20 by two buyers, with 30 by one
        let (_dir, _store, server) = setup(vec![
            order(1, 1, 10, OrderStatus::Paid, 100),
            order(2, 1, 20, OrderStatus::Paid, 99),
            order(3, 2, 10, OrderStatus::Paid, 98),
            order(4, 2, 20, OrderStatus::Paid, 97),
            order(5, 3, 10, OrderStatus::Paid, 96),
            order(6, 3, 30, OrderStatus::Paid, 95),
            order(7, 9, 10, OrderStatus::Completed, 1),
        ])
        .await;

        let outcome = server.recommend_explained(9, 2).await;
        assert_eq!(outcome.seed_product_id, Some(10));
        assert_eq!(outcome.product_ids, vec![20, 30]);
        assert!(outcome.empty_reason.is_none());
    }

    #[tokio::test]
    async fn test_cache_reused_until_invalidated() {
        let (_dir, _store, server) = setup(vec![order(1, 1, 10, OrderStatus::Paid, 5)]).await;

        let first = server.cache().get().await.unwrap();
        let second = server.cache().get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        server.cache().invalidate().await;
        assert!(server.cache().cached().await.is_none());
        let third = server.cache().get().await.unwrap();
        assert_eq!(third.run_id(), first.run_id());
    }
}
