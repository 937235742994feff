pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};

// Re-export recommender components
pub use services::recommender::{
    ArtifactStore, EmptyReason, ModelInfo, RecommendationOutcome, TrainingReport,
};
pub use services::{ModelCache, ModelTrainer, RecommendationServer, RecommenderError};
