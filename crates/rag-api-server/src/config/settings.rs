use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub cache: CacheConfig,
    pub vector_index: VectorIndexConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub jwt: JwtConfig,
    pub rag: RagConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_file_size_mb: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BusConfig {
    pub url: String,
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    pub dead_letter_queue: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub url: String,
    pub cache_ttl_seconds: u64,
    pub frequency_ttl_seconds: u64,
    pub frequency_threshold: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorIndexConfig {
    pub base_url: String,
    pub api_key: String,
    pub index_name: String,
    pub metadata_text_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_expiry_minutes: i64,
    pub refresh_expiry_days: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub chunk_max_tokens: usize,
    pub chunk_overlap: usize,
    pub merge_peers: bool,
    pub retrieval_top_k: usize,
    pub max_per_doc: usize,
    pub max_total_sources: usize,
    pub max_question_length: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    pub per_user_limit: u32,
    pub per_user_window_seconds: u64,
    pub global_limit: u32,
    pub global_window_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The store MUST refuse to start with a JWT secret shorter than 32
    /// characters (spec §6).
    fn validate(&self) -> Result<()> {
        if self.jwt.secret.len() < 32 {
            bail!("JWT secret must be at least 32 characters long");
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.server.max_file_size_mb * 1024 * 1024
    }
}
