use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub log_level: String,
    /// `json` switches the fmt layer to JSON lines
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Apply `./migrations` on startup (local development only)
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Directory holding `knn_model.bin` and `product_mappings.json`
    pub model_dir: PathBuf,
    /// Neighbour count fitted into the index; must exceed `max_recommendations`
    pub n_neighbors: usize,
    pub default_recommendations: usize,
    pub max_recommendations: usize,
    /// Retrain interval for `--mode train-loop`
    pub train_interval_secs: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(default_model_dir()),
            n_neighbors: default_n_neighbors(),
            default_recommendations: default_recommendations(),
            max_recommendations: default_max_recommendations(),
            train_interval_secs: default_train_interval_secs(),
        }
    }
}

impl RecommendationConfig {
    /// Keeps `max_recommendations + 1 <= n_neighbors` so the seed slot always fits
    pub fn normalized(mut self) -> Self {
        if self.n_neighbors < 2 {
            self.n_neighbors = 2;
        }
        if self.max_recommendations + 1 > self.n_neighbors {
            self.max_recommendations = self.n_neighbors - 1;
        }
        self.default_recommendations = self.default_recommendations.min(self.max_recommendations);
        self
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: std::env::var("APP_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()?,
                log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                run_migrations: std::env::var("RUN_MIGRATIONS")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            },
            recommendation: RecommendationConfig {
                model_dir: PathBuf::from(
                    std::env::var("MODEL_DIR").unwrap_or_else(|_| default_model_dir()),
                ),
                n_neighbors: std::env::var("KNN_NEIGHBORS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_n_neighbors),
                default_recommendations: std::env::var("DEFAULT_RECOMMENDATIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_recommendations),
                max_recommendations: std::env::var("MAX_RECOMMENDATIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_max_recommendations),
                train_interval_secs: std::env::var("TRAIN_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_train_interval_secs),
            }
            .normalized(),
        })
    }
}

fn default_model_dir() -> String {
    "./ml_models/saved_models".to_string()
}

fn default_n_neighbors() -> usize {
    10
}

fn default_recommendations() -> usize {
    4
}

fn default_max_recommendations() -> usize {
    9
}

fn default_train_interval_secs() -> u64 {
    3600 * 24
}
