/// Recommendation API Handlers
///
/// HTTP endpoints for product recommendations and model training
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{BuyerId, Product};
use crate::services::recommender::{ModelInfo, TrainingReport};
use crate::services::{ModelTrainer, RecommendationServer, RecommenderError};

/// Query parameters for GET /api/v1/recommendations/{buyer_id}
#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    /// Number of products to return (defaults to the configured count)
    pub limit: Option<usize>,
}

/// Recommendation response
#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    /// Products in ranked order, closest first
    pub products: Vec<Product>,
    pub count: usize,
}

/// Training trigger response
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    /// "trained" or "skipped"
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TrainingReport>,
}

/// Handler state for recommendation endpoints
pub struct RecommendationHandlerState {
    pub server: Arc<RecommendationServer>,
    pub trainer: Arc<ModelTrainer>,
    pub default_limit: usize,
    pub max_limit: usize,
}

/// GET /api/v1/recommendations/model-info
#[get("/api/v1/recommendations/model-info")]
pub async fn get_model_info(state: web::Data<RecommendationHandlerState>) -> HttpResponse {
    let info: ModelInfo = state.server.model_info().await;
    HttpResponse::Ok().json(info)
}

/// GET /api/v1/recommendations/{buyer_id}
///
/// Recommender failures never surface here; the list is simply empty.
#[get("/api/v1/recommendations/{buyer_id:\\d+}")]
pub async fn get_recommendations(
    path: web::Path<BuyerId>,
    query: web::Query<RecommendationQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> HttpResponse {
    let buyer_id = path.into_inner();
    let limit = query.limit.unwrap_or(state.default_limit).min(state.max_limit);

    debug!(buyer_id, limit, "Getting recommendations");

    let products = state.server.recommend_products(buyer_id, limit).await;
    let count = products.len();
    HttpResponse::Ok().json(RecommendationResponse { products, count })
}

/// POST /api/v1/recommendations/train
/// Internal trigger for a retraining run
#[post("/api/v1/recommendations/train")]
pub async fn trigger_training(
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    match state.trainer.train().await {
        Ok(report) => Ok(HttpResponse::Ok().json(TrainResponse {
            status: "trained",
            report: Some(report),
        })),
        Err(RecommenderError::NoInteractionData) => {
            info!("Training requested but there is no order data yet");
            Ok(HttpResponse::Ok().json(TrainResponse {
                status: "skipped",
                report: None,
            }))
        }
        Err(err) => Err(AppError::from(err)),
    }
}

/// GET /metrics
#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(crate::metrics::gather_text())
}
