// ============================================
// Recommender Training Job
// ============================================
//
// Rebuilds the item-item kNN model from order history.
// Runs once (`--mode train`, e.g. from a Kubernetes CronJob) or in a loop
// (`--mode train-loop`). Only one instance may target a model directory at a
// time; the scheduler enforces that across processes.
//
// Usage:
//   recommendation-service --mode train
//   TRAIN_INTERVAL_SECS=3600 recommendation-service --mode train-loop

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::RecommendationConfig;
use crate::services::recommender::{ModelTrainer, RecommenderError, TrainingReport};

/// Training job configuration
#[derive(Debug, Clone)]
pub struct TrainJobConfig {
    /// Exit after one pass instead of looping
    pub run_once: bool,
    /// Interval between passes when looping
    pub interval_secs: u64,
}

impl Default for TrainJobConfig {
    fn default() -> Self {
        Self {
            run_once: true,
            interval_secs: 3600 * 24,
        }
    }
}

impl TrainJobConfig {
    pub fn once() -> Self {
        Self::default()
    }

    pub fn looping(config: &RecommendationConfig) -> Self {
        Self {
            run_once: false,
            interval_secs: config.train_interval_secs,
        }
    }
}

/// Result of one pass
#[derive(Debug, Clone)]
pub enum TrainPassOutcome {
    Trained(TrainingReport),
    /// No confirmed orders yet; previous artifacts left as they were
    Skipped,
}

pub struct TrainJob {
    config: TrainJobConfig,
    trainer: Arc<ModelTrainer>,
}

impl TrainJob {
    pub fn new(config: TrainJobConfig, trainer: Arc<ModelTrainer>) -> Self {
        Self { config, trainer }
    }

    /// Run until done (`run_once`) or forever
    ///
    /// In loop mode a failed pass is logged and retried at the next interval.
    pub async fn run(&self) -> Result<TrainPassOutcome, RecommenderError> {
        loop {
            let result = self.run_single_pass().await;

            if self.config.run_once {
                return result;
            }

            if let Err(err) = &result {
                error!(error = %err, "Training pass failed, retrying next interval");
            }

            info!(
                interval_secs = self.config.interval_secs,
                "Sleeping until next training pass"
            );
            sleep(Duration::from_secs(self.config.interval_secs)).await;
        }
    }

    /// One training pass; missing data is not a failure
    pub async fn run_single_pass(&self) -> Result<TrainPassOutcome, RecommenderError> {
        match self.trainer.train().await {
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    interactions = report.interactions,
                    products = report.products,
                    duration_ms = report.duration_ms,
                    "Training pass completed"
                );
                Ok(TrainPassOutcome::Trained(report))
            }
            Err(RecommenderError::NoInteractionData) => Ok(TrainPassOutcome::Skipped),
            Err(err) => Err(err),
        }
    }
}

/// Convenience entry point for the binary
pub async fn run_train_job(
    trainer: Arc<ModelTrainer>,
    config: TrainJobConfig,
) -> Result<TrainPassOutcome, RecommenderError> {
    TrainJob::new(config, trainer).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{Order, OrderStatus};
    use crate::services::recommender::ArtifactStore;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_single_pass_skips_without_data() {
        let dir = TempDir::new().unwrap();
        let trainer = Arc::new(ModelTrainer::new(
            Arc::new(InMemoryStore::new()),
            ArtifactStore::new(dir.path()),
            10,
        ));

        let outcome = run_train_job(trainer, TrainJobConfig::once()).await.unwrap();
        assert!(matches!(outcome, TrainPassOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_single_pass_trains() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        store
            .insert_order(Order {
                id: 1,
                buyer_id: 1,
                seller_id: 2,
                product_id: 3,
                quantity: 4,
                status: OrderStatus::Completed,
                created_at: Utc::now(),
            })
            .await;
        let trainer = Arc::new(ModelTrainer::new(
            Arc::new(store),
            ArtifactStore::new(dir.path()),
            10,
        ));

        let outcome = TrainJob::new(TrainJobConfig::once(), trainer)
            .run_single_pass()
            .await
            .unwrap();
        match outcome {
            TrainPassOutcome::Trained(report) => assert_eq!(report.products, 1),
            TrainPassOutcome::Skipped => panic!("expected a trained model"),
        }
    }

    #[test]
    fn test_looping_config_uses_interval() {
        let cfg = RecommendationConfig {
            train_interval_secs: 60,
            ..Default::default()
        };
        let job_cfg = TrainJobConfig::looping(&cfg);
        assert!(!job_cfg.run_once);
        assert_eq!(job_cfg.interval_secs, 60);
    }
}
