use async_trait::async_trait;
use gather_core::{LogReconciliationSink, ReconciliationCase, ReconciliationSink};
use gather_shared::models::events::{BookingConfirmedEvent, TOPIC_BOOKING_CONFIRMED, TOPIC_BOOKING_RECONCILIATION};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    /// Best effort; a failed publish is logged and dropped.
    pub async fn booking_confirmed(&self, event: &BookingConfirmedEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = self.publish(TOPIC_BOOKING_CONFIRMED, &event.booking_id, &payload).await;
            }
            Err(e) => error!(booking_id = %event.booking_id, "Failed to encode booking event: {}", e),
        }
    }
}

/// Logs every case and also publishes it for the operations queue.
#[async_trait]
impl ReconciliationSink for EventProducer {
    async fn escalate(&self, case: ReconciliationCase) {
        let event = case.to_event();
        LogReconciliationSink.escalate(case).await;
        match serde_json::to_string(&event) {
            Ok(payload) => {
                let _ = self.publish(TOPIC_BOOKING_RECONCILIATION, &event.reference, &payload).await;
            }
            Err(e) => error!(reference = %event.reference, "Failed to encode reconciliation event: {}", e),
        }
    }
}
