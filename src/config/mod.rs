use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: Option<LangbaseConfig>,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pipes: PipeConfig,
    pub retrieval: RetrievalConfig,
    pub reasoning: ReasoningConfig,
    pub validation: ValidationConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
}

/// Database configuration for the fact graph
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Timeout and retry policy for every external call
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub fallback: String,
}

/// How lexical and dense rankings are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStrategy {
    /// Reciprocal rank fusion: `Σ 1/(k + rank)`.
    ReciprocalRank,
    /// Min-max normalize each ranking, then merge by score.
    MinMax,
}

impl FromStr for FusionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rrf" | "reciprocal_rank" => Ok(FusionStrategy::ReciprocalRank),
            "min_max" | "minmax" => Ok(FusionStrategy::MinMax),
            _ => Err(format!("Unknown fusion strategy: {}", s)),
        }
    }
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub fusion: FusionStrategy,
    pub rrf_k: u32,
    pub embedding_dimensions: usize,
    /// Neural embedding model code; feature hashing when unset.
    pub embedding_model: Option<String>,
    pub bm25_k1: f64,
    pub bm25_b: f64,
}

/// Path reasoning and answer assembly configuration
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub max_hops: usize,
    pub evidence_limit: usize,
    pub batch_concurrency: usize,
}

/// Settings for the built-in fact checkers
#[derive(Debug, Clone, Default)]
pub struct ValidationConfig {
    pub sanctions_list: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = env::var("LANGBASE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| LangbaseConfig {
                api_key,
                base_url: env::var("LANGBASE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            });

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/fact_graph.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_env("MAX_RETRIES", 3),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let pipes = PipeConfig {
            fallback: env::var("PIPE_FALLBACK")
                .unwrap_or_else(|_| "multihop-fallback-v1".to_string()),
        };

        let fusion = match env::var("FUSION_STRATEGY") {
            Ok(value) => value
                .parse()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => FusionStrategy::ReciprocalRank,
        };

        let retrieval = RetrievalConfig {
            top_k: parse_env::<usize>("TOP_K_RETRIEVAL", 5).max(1),
            fusion,
            rrf_k: parse_env("RRF_K", 60),
            embedding_dimensions: parse_env::<usize>("EMBEDDING_DIMENSIONS", 256).max(1),
            embedding_model: env::var("EMBEDDING_MODEL")
                .ok()
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty()),
            bm25_k1: parse_env("BM25_K1", 1.2),
            bm25_b: parse_env("BM25_B", 0.75),
        };

        let reasoning = ReasoningConfig {
            max_hops: parse_env::<usize>("MAX_HOPS", 3).max(1),
            evidence_limit: parse_env("EVIDENCE_LIMIT", 3),
            batch_concurrency: parse_env::<usize>("BATCH_CONCURRENCY", 1).max(1),
        };

        let validation = ValidationConfig {
            sanctions_list: env::var("SANCTIONS_LIST")
                .map(|list| {
                    list.split(',')
                        .map(|name| name.trim().to_string())
                        .filter(|name| !name.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            retrieval,
            reasoning,
            validation,
        })
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            langbase: None,
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            pipes: PipeConfig {
                fallback: "multihop-fallback-v1".to_string(),
            },
            retrieval: RetrievalConfig::default(),
            reasoning: ReasoningConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/fact_graph.db"),
            max_connections: 5,
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fusion: FusionStrategy::ReciprocalRank,
            rrf_k: 60,
            embedding_dimensions: 256,
            embedding_model: None,
            bm25_k1: 1.2,
            bm25_b: 0.75,
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            evidence_limit: 3,
            batch_concurrency: 1,
        }
    }
}
