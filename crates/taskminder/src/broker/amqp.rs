/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! AMQP broker backed by `lapin`.
//!
//! One [`AmqpBroker`] owns the connection. Each role opens its own channel
//! from it: the publisher gets a channel in confirm mode so a broker-side
//! rejection surfaces as a publish error, and the consumer gets a channel
//! with a QoS prefetch limit. Channels are never shared between roles.
//!
//! Queues are declared durable, non-exclusive and non-auto-deleting, so they
//! survive a broker restart and can be shared by several consumers.

use super::{
    BrokerConnection, Delivery, DeliverySource, MessagePublisher, OutgoingMessage,
    DELIVERY_COUNT_HEADER,
};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

/// AMQP delivery mode for messages that must survive a broker restart.
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Reply code for a normal channel or connection close.
const REPLY_SUCCESS: u16 = 200;

/// Builds an `amqp://` URI from the broker settings.
///
/// Credentials and vhost are percent-encoded, so a vhost of `/` becomes
/// `%2F`.
pub fn amqp_uri(config: &BrokerConfig) -> String {
    format!(
        "amqp://{}:{}@{}:{}/{}",
        urlencoding::encode(&config.username),
        urlencoding::encode(&config.password),
        config.host,
        config.port,
        urlencoding::encode(&config.vhost)
    )
}

/// Declares `queue` as a durable, shared queue on `channel`.
async fn declare_durable_queue(channel: &Channel, queue: &str) -> Result<(), BrokerError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                passive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::QueueDeclare {
            queue: queue.to_string(),
            message: e.to_string(),
        })?;
    Ok(())
}

/// Connection to an AMQP broker.
pub struct AmqpBroker {
    connection: Connection,
}

impl AmqpBroker {
    /// Connects to the broker described by `config`.
    ///
    /// A failure here is fatal for the worker: it cannot do anything useful
    /// without a queue.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&amqp_uri(config), ConnectionProperties::default())
            .await
            .map_err(|e| {
                BrokerError::Connection(format!(
                    "{}:{} (vhost '{}'): {}",
                    config.host, config.port, config.vhost, e
                ))
            })?;

        info!(
            "Connected to AMQP broker at {}:{} (vhost '{}')",
            config.host, config.port, config.vhost
        );
        Ok(Self { connection })
    }

    async fn open_channel(&self) -> Result<Channel, BrokerError> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to create channel: {}", e)))
    }

    /// Opens the publish-role channel and declares `queues` on it.
    pub async fn publisher(&self, queues: &[&str]) -> Result<AmqpPublisher, BrokerError> {
        let channel = self.open_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to enable publisher confirms: {}", e)))?;

        for queue in queues {
            declare_durable_queue(&channel, queue).await?;
        }

        debug!("Opened publisher channel {}", channel.id());
        Ok(AmqpPublisher { channel })
    }

    /// Opens the consume-role channel, declares `queue`, applies the prefetch
    /// limit and starts a manual-ack subscription.
    pub async fn consumer(
        &self,
        queue: &str,
        prefetch: u16,
        consumer_tag: &str,
    ) -> Result<AmqpDeliverySource, BrokerError> {
        let channel = self.open_channel().await?;
        declare_durable_queue(&channel, queue).await?;

        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to set prefetch {}: {}", prefetch, e)))?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to consume from '{}': {}", queue, e)))?;

        info!(
            "Consuming from '{}' with prefetch {} as '{}'",
            queue, prefetch, consumer_tag
        );
        Ok(AmqpDeliverySource {
            _channel: channel,
            consumer,
        })
    }

    /// Closes the connection, which also closes any channel still open.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection
            .close(REPLY_SUCCESS, "worker shutdown")
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to close connection: {}", e)))?;
        info!("AMQP connection closed");
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for AmqpBroker {
    async fn close(&self) -> Result<(), BrokerError> {
        AmqpBroker::close(self).await
    }
}

/// Publish-role channel.
pub struct AmqpPublisher {
    channel: Channel,
}

fn properties_for(message: &OutgoingMessage) -> BasicProperties {
    let mut properties =
        BasicProperties::default().with_content_type(ShortString::from(message.content_type.clone()));
    if message.persistent {
        properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
    }
    if let Some(message_id) = &message.message_id {
        properties = properties.with_message_id(ShortString::from(message_id.clone()));
    }
    if !message.headers.is_empty() {
        let mut headers = FieldTable::default();
        for (key, value) in &message.headers {
            headers.insert(
                ShortString::from(key.clone()),
                AMQPValue::LongString(LongString::from(value.clone())),
            );
        }
        properties = properties.with_headers(headers);
    }
    properties
}

#[async_trait]
impl MessagePublisher for AmqpPublisher {
    async fn publish(&self, queue: &str, message: OutgoingMessage) -> Result<(), BrokerError> {
        let publish_error = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            message: e.to_string(),
        };

        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &message.payload,
                properties_for(&message),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        if confirmation.is_nack() {
            return Err(BrokerError::Rejected {
                queue: queue.to_string(),
            });
        }
        Ok(())
    }
}

/// Consume-role channel and its subscription stream.
///
/// Channels are closed with the connection.
pub struct AmqpDeliverySource {
    _channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl DeliverySource for AmqpDeliverySource {
    async fn next_delivery(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>> {
        let next = self.consumer.next().await?;
        Some(
            next.map(|delivery| Box::new(AmqpDelivery { delivery }) as Box<dyn Delivery>)
                .map_err(|e| BrokerError::Channel(format!("Delivery stream error: {}", e))),
        )
    }
}

/// One AMQP delivery.
pub struct AmqpDelivery {
    delivery: lapin::message::Delivery,
}

fn header_as_u32(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn delivery_tag(&self) -> u64 {
        self.delivery.delivery_tag
    }

    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    fn redelivered(&self) -> bool {
        self.delivery.redelivered
    }

    fn delivery_count(&self) -> Option<u32> {
        self.delivery
            .properties
            .headers()
            .as_ref()?
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)
            .and_then(|(_, value)| header_as_u32(value))
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Settle {
                delivery_tag: self.delivery.delivery_tag,
                message: e.to_string(),
            })
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue,
            })
            .await
            .map_err(|e| BrokerError::Settle {
                delivery_tag: self.delivery.delivery_tag,
                message: e.to_string(),
            })
    }
}
