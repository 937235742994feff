// ============================================
// Item-Item Product Recommender
// ============================================
//
// Offline:
//   Orders (paid/shipped/completed) → Interaction set → User-item CSR matrix
//        → transpose → cosine kNN index → knn_model.bin + product_mappings.json
//
// Online:
//   Buyer → latest confirmed order (seed) → kNN(seed, n + 1)
//        → drop seed + already ordered → top-n product ids
//
// Every inference failure degrades to an empty list.

pub mod artifacts;
pub mod interactions;
pub mod knn;
pub mod matrix;
pub mod server;
pub mod trainer;

pub use artifacts::{
    ArtifactStore, LoadedModel, ModelArtifact, ProductMappings, KNN_MODEL_FILE,
    PRODUCT_MAPPINGS_FILE,
};
pub use interactions::{extract_interactions, Interaction, InteractionSet};
pub use knn::{cosine_distance, KnnIndex, Neighbor};
pub use matrix::{SparseBinaryMatrix, UserItemMatrix};
pub use server::{EmptyReason, ModelCache, ModelInfo, RecommendationOutcome, RecommendationServer};
pub use trainer::{build_model, ModelTrainer, TrainingReport};

use thiserror::Error;

use crate::error::AppError;
use crate::models::{BuyerId, ProductId};

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("No confirmed orders available for training")]
    NoInteractionData,

    #[error("Model artifacts not found")]
    ArtifactMissing,

    #[error("Model artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    #[error("Model artifacts inconsistent: {0}")]
    ArtifactMismatch(String),

    #[error("Buyer {0} has no confirmed orders")]
    NoSeedOrder(BuyerId),

    #[error("Seed product {0} not in model vocabulary")]
    SeedProductUnseen(ProductId),

    #[error("A training run is already in progress")]
    TrainingInProgress,

    #[error("Store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecommenderError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoInteractionData => "no_interaction_data",
            Self::ArtifactMissing => "artifact_missing",
            Self::ArtifactCorrupt(_) => "artifact_corrupt",
            Self::ArtifactMismatch(_) => "artifact_mismatch",
            Self::NoSeedOrder(_) => "no_seed_order",
            Self::SeedProductUnseen(_) => "seed_product_unseen",
            Self::TrainingInProgress => "training_in_progress",
            Self::Store(_) => "store_error",
            Self::Io(_) => "io_error",
        }
    }
}

impl From<AppError> for RecommenderError {
    fn from(err: AppError) -> Self {
        RecommenderError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecommenderError>;
