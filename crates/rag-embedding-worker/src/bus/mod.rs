//! Durable chunk-job consumer (spec §4.8).
//!
//! Shares the exchange/queue/dead-letter topology declared by
//! `rag-api-server::bus::AmqpBus` — both processes redeclare it
//! idempotently on startup, so either one can come up first. A failed
//! job is `nack`ed without requeue, which the queue's
//! `x-dead-letter-exchange` argument routes straight to
//! `chunks.failed`.

use std::future::Future;

use edtech_core::error::{ApiError, ApiResult};
use edtech_core::traits::ChunkJob;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{error, info, warn};

use crate::config::BusConfig;

pub struct BusConsumer {
    _connection: Connection,
    channel: Channel,
    config: BusConfig,
}

impl BusConsumer {
    pub async fn connect(config: BusConfig, prefetch_count: u16) -> ApiResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

        declare_topology(&channel, &config).await?;

        channel
            .basic_qos(prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))?;

        info!(queue = %config.queue, prefetch_count, "bus consumer ready");
        Ok(Self {
            _connection: connection,
            channel,
            config,
        })
    }

    async fn consumer(&self) -> ApiResult<Consumer> {
        self.channel
            .basic_consume(
                &self.config.queue,
                "rag-embedding-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ApiError::external("rabbitmq", e.to_string()))
    }

    /// Drives deliveries through `handler` until the channel closes.
    /// Acks on `Ok`, nacks without requeue on `Err` (routing to the
    /// dead-letter queue).
    pub async fn run<F, Fut>(&self, handler: F) -> ApiResult<()>
    where
        F: Fn(ChunkJob) -> Fut,
        Fut: Future<Output = ApiResult<()>>,
    {
        let mut consumer = self.consumer().await?;
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "lost delivery from bus");
                    continue;
                }
            };

            let job: ChunkJob = match serde_json::from_slice(&delivery.data) {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "undecodable chunk job, routing to dead letter");
                    let _ = delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await;
                    continue;
                }
            };

            let document_id = job.document_id;
            let chunk_index = job.chunk_index;
            match handler(job).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!(%document_id, chunk_index, error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    error!(%document_id, chunk_index, error = %e, "chunk processing failed, sending to dead letter");
                    if let Err(e) = delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await
                    {
                        error!(%document_id, chunk_index, error = %e, "nack failed");
                    }
                }
            }
        }
        Ok(())
    }
}

async fn declare_topology(channel: &Channel, config: &BusConfig) -> ApiResult<()> {
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
