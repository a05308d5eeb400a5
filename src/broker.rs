//! Message broker abstraction. Production implementation talks AMQP via
//! `lapin`; workers `ack`/`nack` each delivery explicitly and set
//! prefetch=1, since jobs are coarse and widely variable in duration (see
//! the concurrency model).

use crate::error::BrokerError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, warn};

/// A single delivered message. `ack`/`nack_requeue`/`nack_drop` consume
/// `self` so a delivery can only be resolved once.
#[async_trait]
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError>;
    async fn nack_drop(self: Box<Self>) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;
    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Box<dyn Delivery>>, BrokerError>;
}

pub async fn publish_json<T: Serialize + Sync>(
    broker: &dyn MessageBroker,
    queue: &str,
    message: &T,
) -> Result<(), BrokerError> {
    let payload = serde_json::to_vec(message)?;
    broker.publish(queue, &payload).await
}

pub fn decode_json<T: DeserializeOwned>(delivery: &dyn Delivery) -> Result<T, BrokerError> {
    serde_json::from_slice(delivery.payload()).map_err(BrokerError::Decode)
}

pub struct AmqpBroker {
    channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(amqp_url: &str) -> Result<Self, BrokerError> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        Ok(Self { channel })
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await?;
        Ok(())
    }
}

struct AmqpDelivery(lapin::message::Delivery);

#[async_trait]
impl Delivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.0.data
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions { requeue: true, ..Default::default() })
            .await?;
        Ok(())
    }

    async fn nack_drop(self: Box<Self>) -> Result<(), BrokerError> {
        self.0
            .nack(BasicNackOptions { requeue: false, ..Default::default() })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.declare_queue(queue).await?;
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Box<dyn Delivery>>, BrokerError> {
        self.declare_queue(queue).await?;
        self.channel
            .basic_qos(1, BasicQosOptions::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.filter_map(|res| match res {
            Ok(delivery) => Some(Box::new(AmqpDelivery(delivery)) as Box<dyn Delivery>),
            Err(e) => {
                error!(error = %e, "consumer stream error");
                None
            }
        });

        Ok(Box::pin(stream))
    }
}

/// In-process broker for tests: each queue is a bounded mpsc channel, and
/// `ack`/`nack_drop` simply consume the delivery while `nack_requeue` puts
/// the payload back on the channel.
#[derive(Clone)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<std::collections::HashMap<String, (mpsc::Sender<Vec<u8>>, Arc<Mutex<Option<mpsc::Receiver<Vec<u8>>>>>)>>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(std::collections::HashMap::new())),
        }
    }

    async fn channel_for(&self, queue: &str) -> (mpsc::Sender<Vec<u8>>, Arc<Mutex<Option<mpsc::Receiver<Vec<u8>>>>>) {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(1024);
                (tx, Arc::new(Mutex::new(Some(rx))))
            })
            .clone()
    }
}

struct InMemoryDelivery {
    payload: Vec<u8>,
    requeue_tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack_requeue(self: Box<Self>) -> Result<(), BrokerError> {
        let _ = self.requeue_tx.send(self.payload).await;
        Ok(())
    }

    async fn nack_drop(self: Box<Self>) -> Result<(), BrokerError> {
        warn!("dropping poison message");
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let (tx, _) = self.channel_for(queue).await;
        tx.send(payload.to_vec())
            .await
            .map_err(|_| BrokerError::Malformed("queue closed".to_string()))
    }

    async fn consume(&self, queue: &str) -> Result<BoxStream<'static, Box<dyn Delivery>>, BrokerError> {
        let (tx, rx_slot) = self.channel_for(queue).await;
        let mut rx_guard = rx_slot.lock().await;
        let rx = rx_guard
            .take()
            .ok_or_else(|| BrokerError::Malformed(format!("queue {queue} already has a consumer")))?;
        drop(rx_guard);

        let stream = ReceiverStream::new(rx).map(move |payload| {
            Box::new(InMemoryDelivery {
                payload,
                requeue_tx: tx.clone(),
            }) as Box<dyn Delivery>
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn in_memory_broker_publishes_and_consumes() {
        let broker = InMemoryBroker::new();
        broker.publish("q", b"hello").await.unwrap();

        let mut stream = broker.consume("q").await.unwrap();
        let delivery = stream.next().await.unwrap();
        assert_eq!(delivery.payload(), b"hello");
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn requeue_puts_message_back_on_the_queue() {
        let broker = InMemoryBroker::new();
        broker.publish("q", b"retry-me").await.unwrap();

        let mut stream = broker.consume("q").await.unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.payload(), b"retry-me");
        first.nack_requeue().await.unwrap();

        let second = stream.next().await.unwrap();
        assert_eq!(second.payload(), b"retry-me");
    }
}
