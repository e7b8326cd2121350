use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    config::Config,
    pipeline::{
        ports::{DeliveryAcker, MessageBroker},
        worker::Delivery,
    },
    utils::retry_with_backoff,
};

const DELAY_HEADER: &str = "x-delay";
const JSON_CONTENT_TYPE: &str = "application/json";
const PERSISTENT: u8 = 2;

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        debug!(prefetch_count = config.prefetch_count, "Prefetch count set");

        for queue in [&config.autoresponder_queue_name, &config.blast_queue_name] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

            debug!(queue = %queue, "Queue declared");
        }

        info!("RabbitMQ connection established");

        Ok(Self {
            connection,
            channel,
        })
    }

    /// Startup connect; exhausting the attempts is fatal for the caller.
    pub async fn connect_with_retry(config: &Config) -> Result<Self, Error> {
        retry_with_backoff(&config.broker_retry_config(), || Self::connect(config)).await
    }

    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer for {}: {}", queue, e))?;

        info!(queue, consumer_tag, "Consumer created");

        Ok(consumer)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.channel
            .close(200, "shutdown".into())
            .await
            .map_err(|e| anyhow!("Failed to close RabbitMQ channel: {}", e))?;
        self.connection
            .close(200, "shutdown".into())
            .await
            .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {}", e))?;

        info!("RabbitMQ connection closed");

        Ok(())
    }
}

/// Strips lapin deliveries down to what the worker pool needs.
pub fn deliveries(consumer: Consumer) -> impl Stream<Item = Result<Delivery, lapin::Error>> + Unpin {
    consumer.map(|delivery| {
        delivery.map(|delivery| Delivery {
            delivery_tag: delivery.delivery_tag,
            data: delivery.data,
        })
    })
}

#[async_trait]
impl DeliveryAcker for RabbitMqClient {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| anyhow!("Failed to reject message: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RabbitMqClient {
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_content_type(JSON_CONTENT_TYPE.into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish to {}: {}", exchange, e))?;

        Ok(())
    }

    async fn schedule(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        delay: Duration,
    ) -> Result<()> {
        let mut headers = FieldTable::default();
        headers.insert(
            DELAY_HEADER.into(),
            AMQPValue::LongLongInt(delay.as_millis() as i64),
        );

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_content_type(JSON_CONTENT_TYPE.into())
                    .with_delivery_mode(PERSISTENT)
                    .with_headers(headers),
            )
            .await
            .map_err(|e| anyhow!("Failed to schedule publish to {}: {}", exchange, e))?;

        debug!(exchange, routing_key, delay_ms = delay.as_millis() as u64, "Delayed publish sent");

        Ok(())
    }
}
