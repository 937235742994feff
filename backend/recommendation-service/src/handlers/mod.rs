pub mod recommendation;

// Re-export handlers for convenience
pub use recommendation::{
    get_model_info, get_recommendations, metrics_endpoint, trigger_training,
    RecommendationHandlerState, RecommendationQuery, RecommendationResponse, TrainResponse,
};
