//! Durable chunk-job publisher (spec §6 "Message-bus payload").
//!
//! Grounded in `original_source/services/document-processor/publisher/
//! rabbitmq_publisher.py`: a direct exchange `document_processing`
//! binding a durable `chunks.processing` queue under routing-key `chunk`,
//! with a companion `chunks.failed` dead-letter queue bound as the main
//! queue's `x-dead-letter-exchange` so a nacked-without-requeue chunk job
//! (spec §4.8 step 1, final embed failure) is routed there automatically
//! by the broker. `lapin`'s `Connection::connect` with
//! `ConnectionProperties::default()` plays the role of
//! `aio_pika.connect_robust`.
//!
//! [`declare_topology`] is called identically by both this publisher and
//! `rag-embedding-worker::bus`'s consumer — whichever process starts
//! first establishes the exchange/queue/DLX graph, and the other's
//! redeclare is a no-op as long as the arguments match exactly.

use async_trait::async_trait;
use edtech_core::error::{ApiError, ApiResult};
use edtech_core::traits::{ChunkJob, MessageBus};
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

use crate::config::BusConfig;

/// Declares the exchange, the durable work queue (dead-lettering into
/// `config.dead_letter_queue`), and the dead-letter queue itself.
pub async fn declare_topology(channel: &Channel, config: &BusConfig) -> ApiResult<()> {
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    let dlx = format!("{}.dlx", config.exchange);
    channel
        .exchange_declare(
            &dlx,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    let mut queue_args = FieldTable::default();
    queue_args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(dlx.clone().into()));
    queue_args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(config.routing_key.clone().into()),
    );

    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            queue_args,
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    channel
        .queue_declare(
            &config.dead_letter_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    channel
        .queue_bind(
            &config.dead_letter_queue,
            &dlx,
            &config.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

    Ok(())
}

pub struct AmqpBus {
    connection: Connection,
    config: BusConfig,
}

impl AmqpBus {
    pub async fn connect(config: BusConfig) -> ApiResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

        declare_topology(&channel, &config).await?;

        info!(exchange = %config.exchange, queue = %config.queue, "connected to message bus");
        Ok(Self { connection, config })
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish_chunk_job(&self, job: &ChunkJob) -> ApiResult<()> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| ApiError::Queue(e.to_string()))?;

        let body = serde_json::to_vec(job).map_err(|e| ApiError::Queue(e.to_string()))?;

        channel
            .basic_publish(
                &self.config.exchange,
                &self.config.routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| ApiError::Queue(e.to_string()))?
            .await
            .map_err(|e| ApiError::Queue(e.to_string()))?;

        Ok(())
    }
}
