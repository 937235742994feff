// ============================================
// Background Jobs Module
// ============================================
//
// Contains background job runners for:
// 1. Recommender model training
//
// These jobs can be triggered via:
// - CronJob (Kubernetes)
// - Command line argument (--mode train / --mode train-loop)
// - HTTP API (POST /api/v1/recommendations/train)

pub mod train_job;

pub use train_job::{run_train_job, TrainJob, TrainJobConfig, TrainPassOutcome};
