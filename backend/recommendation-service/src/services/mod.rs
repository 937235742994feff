//! Service layer for recommendation-service
//!
//! - recommender: item-item kNN training and serving

pub mod recommender;

pub use recommender::{ModelCache, ModelTrainer, RecommendationServer, RecommenderError};
