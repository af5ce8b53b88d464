use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use rag_embedding_worker::bus::BusConsumer;
use rag_embedding_worker::cache::RedisProgressPublisher;
use rag_embedding_worker::config::Settings;
use rag_embedding_worker::database::{DbPool, Repository};
use rag_embedding_worker::embedding_client::HttpEmbedder;
use rag_embedding_worker::processor::ChunkProcessor;
use rag_embedding_worker::utils;
use rag_embedding_worker::vector_index::PineconeIndex;

#[tokio::main]
async fn main() -> Result<()> {
    utils::logger::init_logger()?;
    info!("starting rag-embedding-worker");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    let repository = Arc::new(Repository::new(db_pool));
    info!("database ready");

    let embedder: Arc<dyn edtech_core::traits::Embedder> = Arc::new(HttpEmbedder::new(
        settings.embedding.clone(),
        settings.worker.embed_retries,
    ));
    let vector_index: Arc<dyn edtech_core::traits::VectorIndex> =
        Arc::new(PineconeIndex::new(settings.vector_index.clone()));
    let progress: Arc<dyn edtech_core::traits::ProgressPublisher> =
        Arc::new(RedisProgressPublisher::connect(&settings.cache)?);

    let processor = ChunkProcessor::new(
        repository,
        embedder,
        vector_index,
        progress,
        settings.worker.clone(),
    );

    let consumer = BusConsumer::connect(settings.bus.clone(), settings.worker.prefetch_count).await?;
    info!("message bus connected, consuming chunk jobs");

    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        result = consumer.run(|job| async { processor.process(job).await }) => {
            match result {
                Ok(()) => info!("consumer stream closed"),
                Err(e) => error!(error = %e, "consumer loop failed"),
            }
        }
        _ = shutdown => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}
