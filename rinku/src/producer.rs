//! # 生产者
//!
//! 单条发送等待消息代理确认持久化；批量发送只入队，最后统一刷出。

use crate::{
    client::{DeliveryStatus, ProducerClient},
    errors::{BulkSendError, BusError, SendError},
    lifecycle::CloseOnce,
    message::Message,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

/// 批量发送默认的最长刷出等待
pub const DEFAULT_FLUSH_WAIT: Duration = Duration::from_secs(10);

/// 生产者结构
///
/// 可被多个调用方并发使用，通常以 `Arc` 共享。
pub struct Producer<P>
where
    P: ProducerClient,
{
    client: P,
    closer: CloseOnce,
}

impl<P> Producer<P>
where
    P: ProducerClient,
{
    /// 构造函数
    pub fn new(client: P) -> Self {
        Self {
            client,
            closer: CloseOnce::default(),
        }
    }

    /// 发送单条消息，等待消息代理确认持久化
    ///
    /// 取消只表示不再等待确认，消息仍可能送达。
    #[instrument(name = "send_message", skip_all, fields(topic))]
    pub async fn send<M>(
        &self,
        topic: &str,
        message: &M,
        cancel: &CancellationToken,
    ) -> Result<(), BusError>
    where
        M: Message,
    {
        Span::current().record("topic", topic);
        self.ensure_open()?;
        let payload = message.to_payload()?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("等待发送确认时收到取消信号");
                return Err(BusError::Cancelled);
            }
            res = self.client.send(topic, &payload) => res.map_err(|source| SendError::Broker {
                topic: topic.to_owned(),
                source,
            })?,
        };

        match status {
            DeliveryStatus::Persisted => {
                debug!("消息已持久化");
                Ok(())
            }
            status => Err(SendError::NotPersisted {
                topic: topic.to_owned(),
                reason: format!("消息持久化失败，送达状态为{status:?}"),
            }
            .into()),
        }
    }

    /// 批量发送消息，阻塞至发送队列刷出或超过 `max_wait`
    ///
    /// 单条消息失败不会中断后续消息，刷出总会执行。存在失败消息时返回
    /// [`BulkSendError`]，否则返回发送队列是否在等待期内全部刷出。
    #[instrument(name = "send_bulk", skip_all, fields(topic))]
    pub fn send_bulk<'a, M>(
        &self,
        topic: &str,
        messages: impl IntoIterator<Item = &'a M>,
        max_wait: Option<Duration>,
    ) -> Result<bool, BusError>
    where
        M: Message,
    {
        Span::current().record("topic", topic);
        self.ensure_open()?;

        let mut errors = Vec::new();
        let mut count: usize = 0;
        for message in messages {
            count += 1;
            let enqueued = message.to_payload().and_then(|payload| {
                self.client
                    .enqueue(topic, &payload)
                    .map_err(|source| SendError::Broker {
                        topic: topic.to_owned(),
                        source,
                    })
            });
            if let Err(e) = enqueued {
                warn!("第 {count} 条消息入队失败：{e}");
                errors.push(e);
            }
        }

        let flushed = self.client.flush(max_wait.unwrap_or(DEFAULT_FLUSH_WAIT));
        if !flushed {
            warn!("等待期内发送队列未全部刷出");
        }

        if !errors.is_empty() {
            return Err(BulkSendError { errors, flushed }.into());
        }
        debug!("批量入队 {count} 条消息");
        Ok(flushed)
    }

    /// 释放连接，重复调用无副作用
    pub fn close(&self) {
        if self.closer.close(|| self.client.close()) {
            info!("生产者已关闭");
        }
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closer.is_closed() {
            return Err("生产者已关闭".into());
        }
        Ok(())
    }
}

impl<P> Drop for Producer<P>
where
    P: ProducerClient,
{
    fn drop(&mut self) {
        self.close();
    }
}
