//! # 消息代理客户端特征
//!
//! 生产者与订阅者只依赖这里的最小能力集合。

use crate::errors::BrokerError;
use std::{future::Future, time::Duration};

/// 拉取到的消息记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 主题
    pub topic: String,
    /// 分区
    pub partition: i32,
    /// 偏移量
    pub offset: i64,
    /// 负载
    pub payload: Option<Vec<u8>>,
}

/// 消息送达状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// 已持久化
    Persisted,
    /// 可能已持久化
    PossiblyPersisted,
    /// 未持久化
    NotPersisted,
}

/// 生产者客户端特征
pub trait ProducerClient: Send + Sync + 'static {
    /// 发送消息并等待送达确认
    fn send(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<DeliveryStatus, BrokerError>> + Send;

    /// 消息入队，不等待送达
    fn enqueue(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// 刷出发送队列，超时前全部送出时返回 `true`
    fn flush(&self, timeout: Duration) -> bool;

    /// 释放连接，重复调用无副作用
    fn close(&self);
}

/// 消费者客户端特征
pub trait ConsumerClient: Send + Sync + 'static {
    /// 订阅主题
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    /// 取消订阅
    fn unsubscribe(&self);

    /// 拉取下一条记录，丢弃返回的 future 即取消拉取
    fn recv(&self) -> impl Future<Output = Result<Record, BrokerError>> + Send;

    /// 提交记录的偏移量
    fn commit(&self, record: &Record) -> Result<(), BrokerError>;

    /// 释放连接，重复调用无副作用
    fn close(&self);
}
