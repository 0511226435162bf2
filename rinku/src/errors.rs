//! # **rinku** 错误定义

use std::error::Error;
use thiserror::Error;

/// 处理器错误类型
pub type BoxError = Box<dyn Error + Send + Sync>;

/// **rinku** 错误枚举
#[derive(Debug, Error)]
pub enum BusError {
    /// 构造时缺少必要配置
    #[error("配置错误：{0}")]
    Configuration(String),
    /// 当前状态不允许该操作
    #[error("状态错误：{0}")]
    InvalidState(String),
    /// 单条消息发送失败
    #[error(transparent)]
    Send(#[from] SendError),
    /// 批量发送中存在失败的消息
    #[error(transparent)]
    BulkSend(#[from] BulkSendError),
    /// 消息代理错误
    #[error("消息代理错误：{0}")]
    Broker(#[from] BrokerError),
    /// 单条记录消费失败，由消费循环就地恢复
    #[error("消费错误：{0}")]
    Consume(String),
    /// 操作已取消
    #[error("操作已取消")]
    Cancelled,
}

impl BusError {
    /// 是否为取消信号
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BusError::Cancelled)
    }
}

/// 单条消息发送错误
#[derive(Debug, Error)]
pub enum SendError {
    /// 消息编码失败
    #[error("消息编码失败：{0}")]
    Encode(#[from] serde_json::Error),
    /// 消息代理报告发送失败
    #[error("发送消息到主题 {topic} 失败：{source}")]
    Broker {
        /// 目标主题
        topic: String,
        /// 消息代理错误
        #[source]
        source: BrokerError,
    },
    /// 消息已送达但未持久化
    #[error("消息未持久化到主题 {topic}：{reason}")]
    NotPersisted {
        /// 目标主题
        topic: String,
        /// 原因
        reason: String,
    },
}

/// 批量发送聚合错误
///
/// 每条失败的消息对应一个 [`SendError`]，其余消息已正常入队。
#[derive(Debug, Error)]
#[error("批量发送中 {} 条消息失败", errors.len())]
pub struct BulkSendError {
    /// 失败消息的错误，顺序与输入一致
    pub errors: Vec<SendError>,
    /// 等待期内发送队列是否已全部刷出
    pub flushed: bool,
}

/// 消息代理客户端错误
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BrokerError(BoxError);

impl BrokerError {
    /// 包装客户端库错误
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }

    /// 以文本描述构造
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

impl From<&str> for BusError {
    fn from(s: &str) -> Self {
        BusError::InvalidState(s.to_owned())
    }
}
