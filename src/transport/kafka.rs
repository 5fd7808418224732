use super::{LineSource, RecordSink, SourcePoll, TransportError};
use crate::config::KafkaOptions;
use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};
use spdlog::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Consumes lines from one topic, starting at the latest offset.
pub struct KafkaSource {
    consumer: BaseConsumer,
}

impl KafkaSource {
    pub fn connect(options: &KafkaOptions, topic: &str) -> Result<Self, TransportError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &options.bootstrap_servers)
            .set("group.id", &options.group_id)
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[topic])?;
        info!(
            "[Kafka] Consumer group {} subscribed to {} on {}",
            options.group_id, topic, options.bootstrap_servers
        );
        Ok(Self { consumer })
    }
}

impl LineSource for KafkaSource {
    fn next_line(&mut self, timeout: Duration) -> Result<SourcePoll, TransportError> {
        match self.consumer.poll(timeout) {
            None => Ok(SourcePoll::Pending),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(message)) => Ok(match message.payload() {
                Some(payload) => SourcePoll::Line(String::from_utf8_lossy(payload).into_owned()),
                // Tombstones carry no reading.
                None => SourcePoll::Pending,
            }),
        }
    }
}

/// Logs and counts records the broker never acknowledged.
#[derive(Default)]
pub struct DeliveryTracker {
    failed: AtomicU64,
}

impl DeliveryTracker {
    fn record_failure(&self, topic: &str, key: Option<&[u8]>, reason: &KafkaError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            "[Kafka] Delivery to {} failed for sensor {}: {}",
            topic,
            key.map(String::from_utf8_lossy).unwrap_or_default(),
            reason
        );
    }

    /// Failures since the last call.
    fn take_failures(&self) -> u64 {
        self.failed.swap(0, Ordering::Relaxed)
    }
}

impl ClientContext for DeliveryTracker {}

impl ProducerContext for DeliveryTracker {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _opaque: Self::DeliveryOpaque) {
        if let Err((reason, message)) = delivery_result {
            self.record_failure(message.topic(), message.key(), reason);
        }
    }
}

/// Produces each record to one topic, keyed by the sensor id field.
///
/// [`RecordSink::flush`] fails if any record written since the previous flush
/// was not delivered.
pub struct KafkaSink {
    producer: BaseProducer<DeliveryTracker>,
    topic: String,
}

impl KafkaSink {
    pub fn connect(options: &KafkaOptions, topic: &str) -> Result<Self, TransportError> {
        let producer: BaseProducer<DeliveryTracker> = ClientConfig::new()
            .set("bootstrap.servers", &options.bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create_with_context(DeliveryTracker::default())?;
        info!("[Kafka] Producer for {} on {}", topic, options.bootstrap_servers);
        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

/// Second comma separated field of an encoded spike.
fn record_key(record: &str) -> &str {
    record.split(',').nth(1).unwrap_or_default()
}

impl RecordSink for KafkaSink {
    fn write_record(&mut self, record: &str) -> Result<(), TransportError> {
        let key = record_key(record);
        loop {
            let message = BaseRecord::to(&self.topic).key(key).payload(record);
            match self.producer.send(message) {
                Ok(()) => break,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    warn!("[Kafka] Producer queue full, backing off");
                    self.producer.poll(QUEUE_FULL_BACKOFF);
                }
                Err((e, _)) => return Err(e.into()),
            }
        }
        self.producer.poll(Duration::ZERO);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.producer.flush(FLUSH_TIMEOUT)?;
        match self.producer.context().take_failures() {
            0 => Ok(()),
            failed => Err(TransportError::Undelivered(failed)),
        }
    }
}
