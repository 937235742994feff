//! Recommendation Service - Main entry point
//!
//! # Modes
//! - `serve` (default): HTTP API serving recommendations
//! - `train`: fit the kNN model once from order history and exit
//! - `train-loop`: retrain every `TRAIN_INTERVAL_SECS`

use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::config::Config;
use recommendation_service::db::{OrderStore, PgOrderStore, PgProductStore, ProductStore};
use recommendation_service::handlers::{
    get_model_info, get_recommendations, metrics_endpoint, trigger_training,
    RecommendationHandlerState,
};
use recommendation_service::jobs::{run_train_job, TrainJobConfig, TrainPassOutcome};
use recommendation_service::{ArtifactStore, ModelCache, ModelTrainer, RecommendationServer};

/// Service run mode
#[derive(Debug, Clone, PartialEq)]
enum RunMode {
    Serve,
    Train,
    TrainLoop,
}

impl RunMode {
    fn from_args() -> Self {
        let args: Vec<String> = env::args().collect();

        for i in 0..args.len() {
            if args[i] == "--mode" && i + 1 < args.len() {
                return match args[i + 1].as_str() {
                    "serve" => RunMode::Serve,
                    "train" => RunMode::Train,
                    "train-loop" => RunMode::TrainLoop,
                    _ => {
                        warn!("Unknown mode '{}', using default 'serve'", args[i + 1]);
                        RunMode::Serve
                    }
                };
            }
        }

        RunMode::Serve
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},actix_web=info", config.app.log_level).into());

    if config.app.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    init_tracing(&config);

    let mode = RunMode::from_args();
    info!(
        "Starting recommendation-service v{} in {:?} mode",
        env!("CARGO_PKG_VERSION"),
        mode
    );
    info!("Environment: {}", config.app.env);

    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            anyhow::anyhow!("Database connection error: {}", e)
        })?;

    if config.database.run_migrations {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    }

    let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db_pool.clone()));
    let products: Arc<dyn ProductStore> = Arc::new(PgProductStore::new(db_pool));

    let rec_config = config.recommendation.clone();
    let artifacts = ArtifactStore::new(rec_config.model_dir.clone());
    let cache = Arc::new(ModelCache::new(artifacts.clone()));
    let trainer = Arc::new(
        ModelTrainer::new(orders.clone(), artifacts, rec_config.n_neighbors)
            .with_cache(cache.clone()),
    );

    match mode {
        RunMode::Train => run_training(trainer, TrainJobConfig::once()).await,
        RunMode::TrainLoop => run_training(trainer, TrainJobConfig::looping(&rec_config)).await,
        RunMode::Serve => {
            let server = Arc::new(RecommendationServer::new(
                orders,
                products,
                cache,
                rec_config.max_recommendations,
            ));
            run_http(config, server, trainer).await
        }
    }
}

async fn run_training(trainer: Arc<ModelTrainer>, job_config: TrainJobConfig) -> Result<()> {
    match run_train_job(trainer, job_config).await {
        Ok(TrainPassOutcome::Trained(report)) => {
            info!(
                run_id = %report.run_id,
                "Successfully trained and saved the recommendation model"
            );
            Ok(())
        }
        Ok(TrainPassOutcome::Skipped) => {
            info!("No confirmed orders yet, model left unchanged");
            Ok(())
        }
        Err(err) => {
            error!("An error occurred during model training: {}", err);
            Err(err.into())
        }
    }
}

async fn run_http(
    config: Config,
    server: Arc<RecommendationServer>,
    trainer: Arc<ModelTrainer>,
) -> Result<()> {
    let state = web::Data::new(RecommendationHandlerState {
        server,
        trainer,
        default_limit: config.recommendation.default_recommendations,
        max_limit: config.recommendation.max_recommendations,
    });

    let bind_addr = format!("0.0.0.0:{}", config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .service(get_model_info)
            .service(get_recommendations)
            .service(trigger_training)
            .service(metrics_endpoint)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
