//! Generalizes the teacher's `config/settings.rs` (drops the
//! llama-server-process and document-root-path sections — the embedder
//! is a pluggable HTTP backend here, not a locally managed process) onto
//! the bus/vector-index/cache sections `rag-api-server::config` already
//! defines, since both binaries share the same metadata store and bus.

use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub cache: CacheConfig,
    pub vector_index: VectorIndexConfig,
    pub embedding: EmbeddingConfig,
    pub worker: WorkerConfig,
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
pub struct WorkerConfig {
    pub prefetch_count: u16,
    #[serde(default = "default_progress_interval")]
    pub progress_publish_every: i64,
    #[serde(default = "default_retries")]
    pub embed_retries: u32,
}

fn default_progress_interval() -> i64 {
    5
}

fn default_retries() -> u32 {
    3
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

    fn validate(&self) -> Result<()> {
        if self.worker.prefetch_count == 0 {
            bail!("worker.prefetch_count must be greater than zero");
        }
        Ok(())
    }
}
