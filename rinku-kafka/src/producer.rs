//! # Kafka 生产者

use crate::config::producer_config;
use rdkafka::{
    producer::{FutureProducer, FutureRecord, Producer as _, future_producer::Delivery},
    util::Timeout,
};
use rinku::{BrokerError, BusError, DeliveryStatus, KafkaConfig, Producer, ProducerClient};
use std::{
    sync::{PoisonError, RwLock},
    time::Duration,
};
use tracing::{debug, error, info, instrument};

/// Kafka 生产者
pub type KafkaProducer = Producer<KafkaProducerClient>;

/// 按连接配置创建生产者
#[instrument(name = "build_producer", skip_all, fields(address = cfg.address()))]
pub fn producer(cfg: &KafkaConfig) -> Result<KafkaProducer, BusError> {
    let producer: FutureProducer = producer_config(cfg)?.create().map_err(|e| {
        error!("生产者创建失败：{e}");
        BrokerError::new(e)
    })?;
    info!("成功创建生产者");
    Ok(Producer::new(KafkaProducerClient::new(producer, cfg.timeout())))
}

/// 基于 [`FutureProducer`] 的生产者客户端
pub struct KafkaProducerClient {
    producer: RwLock<Option<FutureProducer>>,
    timeout: Duration,
}

impl KafkaProducerClient {
    /// 构造函数，`timeout` 为单条发送的队列超时
    pub fn new(producer: FutureProducer, timeout: Duration) -> Self {
        Self {
            producer: RwLock::new(Some(producer)),
            timeout,
        }
    }

    fn current(&self) -> Result<FutureProducer, BrokerError> {
        self.producer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BrokerError::msg("生产者连接已关闭"))
    }
}

impl ProducerClient for KafkaProducerClient {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<DeliveryStatus, BrokerError> {
        let producer = self.current()?;
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
        match producer.send(record, Timeout::After(self.timeout)).await {
            Ok(Delivery {
                partition, offset, ..
            }) => {
                debug!("消息写入 {topic}|{partition} 偏移 {offset}");
                Ok(DeliveryStatus::Persisted)
            }
            Err((e, _)) => Err(BrokerError::new(e)),
        }
    }

    fn enqueue(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let producer = self.current()?;
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
        producer
            .send_result(record)
            .map(drop)
            .map_err(|(e, _)| BrokerError::new(e))
    }

    fn flush(&self, timeout: Duration) -> bool {
        match self.current() {
            Ok(producer) => producer.flush(timeout).is_ok(),
            Err(_) => false,
        }
    }

    fn close(&self) {
        let producer = self
            .producer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if producer.is_some() {
            debug!("释放生产者连接");
        }
    }
}
