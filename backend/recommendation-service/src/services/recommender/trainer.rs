use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    extract_interactions, ArtifactStore, InteractionSet, KnnIndex, ModelArtifact, ModelCache,
    ProductMappings, RecommenderError, Result, UserItemMatrix,
};
use crate::db::OrderStore;
use crate::metrics;

/// Summary of a successful training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub interactions: usize,
    pub buyers: usize,
    pub products: usize,
    pub n_neighbors: usize,
    pub model_path: PathBuf,
    pub mappings_path: PathBuf,
    pub duration_ms: u64,
}

/// Fit the item-item index for an interaction set
///
/// Pure: no I/O. Columns follow ascending product id, so two runs over the
/// same interactions produce the same id ↔ index pairs.
pub fn build_model(
    interactions: &InteractionSet,
    n_neighbors: usize,
    run_id: Uuid,
) -> (ModelArtifact, ProductMappings, UserItemMatrix) {
    let user_item = UserItemMatrix::build(interactions);
    let item_user = user_item.item_user();
    let index = KnnIndex::fit(&item_user, n_neighbors);
    let mappings = ProductMappings::from_columns(run_id, &user_item.product_ids);

    let artifact = ModelArtifact {
        run_id,
        trained_at: Utc::now(),
        index,
    };

    (artifact, mappings, user_item)
}

/// Offline trainer: orders → kNN index → artifacts on disk
pub struct ModelTrainer {
    orders: Arc<dyn OrderStore>,
    artifacts: ArtifactStore,
    n_neighbors: usize,
    cache: Option<Arc<ModelCache>>,
    running: Mutex<()>,
}

impl ModelTrainer {
    pub fn new(orders: Arc<dyn OrderStore>, artifacts: ArtifactStore, n_neighbors: usize) -> Self {
        Self {
            orders,
            artifacts,
            n_neighbors,
            cache: None,
            running: Mutex::new(()),
        }
    }

    /// Invalidate `cache` after every successful run
    pub fn with_cache(mut self, cache: Arc<ModelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run one training pass
    ///
    /// `NoInteractionData` leaves existing artifacts untouched. A call made
    /// while another run is active in this process fails with
    /// `TrainingInProgress`.
    pub async fn train(&self) -> Result<TrainingReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| RecommenderError::TrainingInProgress)?;

        match self.train_inner().await {
            Ok(report) => {
                metrics::record_training_run("success");
                Ok(report)
            }
            Err(RecommenderError::NoInteractionData) => {
                info!("No sufficient order data to train the model, skipping");
                metrics::record_training_run("skipped");
                Err(RecommenderError::NoInteractionData)
            }
            Err(err) => {
                error!(error = %err, "Model training failed");
                metrics::record_training_run("error");
                Err(err)
            }
        }
    }

    async fn train_inner(&self) -> Result<TrainingReport> {
        let start = Instant::now();
        info!(model_dir = %self.artifacts.dir().display(), "Starting model training");

        let orders = self.orders.list_confirmed_orders().await?;
        let interactions = extract_interactions(&orders)?;
        info!(
            orders = orders.len(),
            interactions = interactions.len(),
            "Loaded unique buyer-product interactions"
        );

        let run_id = Uuid::new_v4();
        let (artifact, mappings, user_item) =
            build_model(&interactions, self.n_neighbors, run_id);
        info!(
            run_id = %run_id,
            buyers = user_item.buyer_ids.len(),
            products = user_item.product_ids.len(),
            nnz = user_item.matrix.nnz(),
            "KNN model fitted"
        );

        self.artifacts.save(&artifact, &mappings)?;

        if let Some(cache) = &self.cache {
            cache.invalidate().await;
        }

        let duration = start.elapsed();
        metrics::record_training_duration(duration);

        let report = TrainingReport {
            run_id,
            trained_at: artifact.trained_at,
            interactions: interactions.len(),
            buyers: user_item.buyer_ids.len(),
            products: user_item.product_ids.len(),
            n_neighbors: self.n_neighbors,
            model_path: self.artifacts.model_path(),
            mappings_path: self.artifacts.mappings_path(),
            duration_ms: duration.as_millis() as u64,
        };

        info!(
            run_id = %report.run_id,
            duration_ms = report.duration_ms,
            "Training process complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{Order, OrderStatus};
    use crate::services::recommender::Interaction;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn order(id: i64, buyer_id: i64, product_id: i64, status: OrderStatus) -> Order {
        Order {
            id,
            buyer_id,
            seller_id: 1,
            product_id,
            quantity: 1,
            status,
            created_at: Utc::now(),
        }
    }

    fn interactions() -> InteractionSet {
        [(1, 10), (1, 20), (2, 10), (2, 30), (3, 30)]
            .into_iter()
            .map(|(buyer_id, product_id)| Interaction {
                buyer_id,
                product_id,
            })
            .collect()
    }

    #[test]
    fn test_build_model_is_deterministic() {
        let (a1, m1, _) = build_model(&interactions(), 10, Uuid::new_v4());
        let (a2, m2, _) = build_model(&interactions(), 10, Uuid::new_v4());

        let pairs1: BTreeSet<(i64, usize)> = m1.id_to_idx.into_iter().collect();
        let pairs2: BTreeSet<(i64, usize)> = m2.id_to_idx.into_iter().collect();
        assert_eq!(pairs1, pairs2);
        assert_eq!(a1.index, a2.index);
    }

    #[test]
    fn test_build_model_shapes() {
        let (artifact, mappings, user_item) = build_model(&interactions(), 10, Uuid::new_v4());
        assert_eq!(artifact.index.n_items(), 3);
        assert_eq!(artifact.index.n_features(), 3);
        assert_eq!(mappings.id_to_idx.len(), 3);
        assert_eq!(user_item.matrix.nnz(), 5);
        assert_eq!(artifact.run_id, mappings.run_id);
    }

    #[tokio::test]
    async fn test_train_writes_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::with_data(
            vec![
                order(1, 1, 10, OrderStatus::Paid),
                order(2, 1, 20, OrderStatus::Completed),
                order(3, 2, 10, OrderStatus::Shipped),
                order(4, 2, 40, OrderStatus::PendingPayment),
            ],
            vec![],
        ));
        let artifacts = ArtifactStore::new(dir.path().join("saved_models"));
        let trainer = ModelTrainer::new(store, artifacts.clone(), 10);

        let report = trainer.train().await.unwrap();
        assert_eq!(report.interactions, 3);
        assert_eq!(report.products, 2);
        assert!(artifacts.exists());

        let loaded = artifacts.load().unwrap();
        assert_eq!(loaded.run_id(), report.run_id);
        assert!(loaded.index_of(40).is_none());
    }

    #[tokio::test]
    async fn test_train_without_data_keeps_previous_artifacts() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(dir.path());

        let seeded = Arc::new(InMemoryStore::with_data(
            vec![order(1, 1, 10, OrderStatus::Paid)],
            vec![],
        ));
        let first = ModelTrainer::new(seeded, artifacts.clone(), 10)
            .train()
            .await
            .unwrap();

        let empty = Arc::new(InMemoryStore::with_data(
            vec![order(1, 1, 10, OrderStatus::Rejected)],
            vec![],
        ));
        let result = ModelTrainer::new(empty, artifacts.clone(), 10).train().await;
        assert!(matches!(result, Err(RecommenderError::NoInteractionData)));
        assert_eq!(artifacts.load().unwrap().run_id(), first.run_id);
    }

    #[tokio::test]
    async fn test_train_without_data_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactStore::new(dir.path().join("never_created"));
        let trainer = ModelTrainer::new(Arc::new(InMemoryStore::new()), artifacts.clone(), 10);

        assert!(matches!(
            trainer.train().await,
            Err(RecommenderError::NoInteractionData)
        ));
        assert!(!artifacts.dir().exists());
    }

    #[tokio::test]
    async fn test_concurrent_train_rejected() {
        let dir = TempDir::new().unwrap();
        let trainer = ModelTrainer::new(
            Arc::new(InMemoryStore::new()),
            ArtifactStore::new(dir.path()),
            10,
        );

        let _held = trainer.running.lock().await;
        assert!(matches!(
            trainer.train().await,
            Err(RecommenderError::TrainingInProgress)
        ));
    }
}
