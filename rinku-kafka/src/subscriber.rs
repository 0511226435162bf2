//! # Kafka 订阅者
//!
//! 关闭自动提交，处理成功后同步提交下一条待读取的偏移量。

use crate::config::consumer_config;
use rdkafka::{
    Message, Offset, TopicPartitionList,
    consumer::{CommitMode, Consumer, StreamConsumer},
};
use rinku::{
    BrokerError, BusError, ConsumerClient, Handler, KafkaConfig, Record, ScopeFactory, Subscriber,
};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, instrument};

/// Kafka 订阅者
pub type KafkaSubscriber<H, F> = Subscriber<H, KafkaConsumerClient, F>;

/// 按连接配置创建订阅者
///
/// 缺少消费组时立即返回配置错误。
#[instrument(name = "build_subscriber", skip_all, fields(address = cfg.address()))]
pub fn subscriber<H, F>(cfg: &KafkaConfig, scopes: F) -> Result<KafkaSubscriber<H, F>, BusError>
where
    H: Handler,
    F: ScopeFactory<Scope = H::Scope>,
{
    let consumer: StreamConsumer = consumer_config(cfg)?.create().map_err(|e| {
        error!("消费者创建失败：{e}");
        BrokerError::new(e)
    })?;
    info!("成功创建消费者");
    Ok(Subscriber::new(KafkaConsumerClient::new(consumer), scopes))
}

/// 基于 [`StreamConsumer`] 的消费者客户端
pub struct KafkaConsumerClient {
    consumer: RwLock<Option<Arc<StreamConsumer>>>,
}

impl KafkaConsumerClient {
    /// 构造函数
    pub fn new(consumer: StreamConsumer) -> Self {
        Self {
            consumer: RwLock::new(Some(Arc::new(consumer))),
        }
    }

    fn current(&self) -> Result<Arc<StreamConsumer>, BrokerError> {
        self.consumer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| BrokerError::msg("消费者连接已关闭"))
    }
}

impl ConsumerClient for KafkaConsumerClient {
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.current()?
            .subscribe(&[topic])
            .map_err(BrokerError::new)
    }

    fn unsubscribe(&self) {
        if let Ok(consumer) = self.current() {
            consumer.unsubscribe();
        }
    }

    async fn recv(&self) -> Result<Record, BrokerError> {
        let consumer = self.current()?;
        let msg = consumer.recv().await.map_err(BrokerError::new)?;
        Ok(Record {
            topic: msg.topic().to_owned(),
            partition: msg.partition(),
            offset: msg.offset(),
            payload: msg.payload().map(<[u8]>::to_vec),
        })
    }

    fn commit(&self, record: &Record) -> Result<(), BrokerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )
        .map_err(BrokerError::new)?;
        self.current()?
            .commit(&tpl, CommitMode::Sync)
            .map_err(BrokerError::new)
    }

    fn close(&self) {
        let consumer = self
            .consumer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(consumer) = consumer {
            consumer.unsubscribe();
            debug!("释放消费者连接");
        }
    }
}
