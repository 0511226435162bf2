//! # 订阅者
//!
//! 订阅者持有一个处理器与一个后台消费任务。消息处理成功后才提交偏移量，
//! 处理失败的消息会在下次分配时重新投递。

use crate::{
    client::{ConsumerClient, Record},
    errors::BusError,
    handler::{Handler, ScopeFactory, ScopedHandler},
    lifecycle::{CloseOnce, Session},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

/// 拉取失败后的重试间隔
pub const PULL_RETRY: Duration = Duration::from_millis(100);

/// 订阅者状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// 未注册处理器
    Idle,
    /// 已订阅，后台任务未运行
    Subscribed,
    /// 后台任务运行中
    Handling,
    /// 取消订阅中
    ///
    /// 过渡状态，只在 [`Subscriber::unsubscribe`] 执行期间存在。该方法持有独占借用，
    /// 调用方观察不到，仅出现在取消订阅的日志中。
    Unsubscribing,
}

/// 订阅者结构
pub struct Subscriber<H, C, F>
where
    H: Handler,
    C: ConsumerClient,
    F: ScopeFactory<Scope = H::Scope>,
{
    consumer: Arc<C>,
    scopes: Arc<F>,
    handler: Option<Arc<H>>,
    session: Option<Session>,
    unsubscribing: bool,
    closer: CloseOnce,
}

impl<H, C, F> Subscriber<H, C, F>
where
    H: Handler,
    C: ConsumerClient,
    F: ScopeFactory<Scope = H::Scope>,
{
    /// 构造函数
    pub fn new(consumer: C, scopes: F) -> Self {
        Self {
            consumer: Arc::new(consumer),
            scopes: Arc::new(scopes),
            handler: None,
            session: None,
            unsubscribing: false,
            closer: CloseOnce::default(),
        }
    }

    /// 当前状态
    pub fn state(&self) -> SubscriberState {
        if self.unsubscribing {
            SubscriberState::Unsubscribing
        } else if self.handler.is_none() {
            SubscriberState::Idle
        } else if self.session.as_ref().is_some_and(|s| !s.is_finished()) {
            SubscriberState::Handling
        } else {
            SubscriberState::Subscribed
        }
    }

    /// 注册处理器并订阅其主题
    ///
    /// 订阅本身不会开始处理消息，需再调用 [`Self::begin_handle`]。
    #[instrument(name = "subscribe", skip_all, fields(topic))]
    pub fn subscribe(&mut self, handler: H) -> Result<(), BusError> {
        let topic = handler.topic();
        Span::current().record("topic", topic);
        if self.closer.is_closed() {
            return Err("订阅者已关闭".into());
        }
        if let Some(current) = &self.handler {
            return Err(BusError::InvalidState(format!(
                "已订阅主题 {}，需先取消订阅",
                current.topic()
            )));
        }

        debug!("开始订阅主题");
        self.consumer.subscribe(topic)?;
        info!("成功订阅主题 {topic}");
        self.handler = Some(Arc::new(handler));
        Ok(())
    }

    /// 启动后台消费任务，立即返回
    ///
    /// `cancel` 取消时后台任务同样结束。
    #[instrument(name = "begin_handle", skip_all, fields(topic))]
    pub fn begin_handle(&mut self, cancel: &CancellationToken) -> Result<(), BusError> {
        let handler = self.handler.clone().ok_or("处理器尚未注册")?;
        Span::current().record("topic", handler.topic());
        match &self.session {
            Some(session) if !session.is_finished() => {
                return Err("后台消费任务已在运行".into());
            }
            Some(_) => debug!("回收已结束的后台消费任务"),
            None => (),
        }

        let consumer = Arc::clone(&self.consumer);
        let scopes = Arc::clone(&self.scopes);
        info!("开始处理主题 {} 的消息", handler.topic());
        self.session = Some(Session::start(cancel, move |token| {
            consume(consumer, handler, scopes, token)
        }));
        Ok(())
    }

    /// 停止后台消费任务并等待其结束，未运行时不做任何事
    #[instrument(name = "stop_handle", skip_all)]
    pub async fn stop_handle(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
            info!("已停止处理消息");
        }
    }

    /// 停止处理并取消订阅，未注册处理器时返回 `false`
    #[instrument(name = "unsubscribe", skip_all, fields(topic))]
    pub async fn unsubscribe(&mut self) -> bool {
        let Some(handler) = self.handler.clone() else {
            return false;
        };
        Span::current().record("topic", handler.topic());

        self.unsubscribing = true;
        debug!(state = ?self.state(), "开始取消订阅");
        self.stop_handle().await;
        self.consumer.unsubscribe();
        self.handler = None;
        self.unsubscribing = false;
        info!("已取消订阅主题 {}", handler.topic());
        true
    }

    /// 取消订阅并释放连接，重复调用无副作用
    pub async fn close(&mut self) {
        self.unsubscribe().await;
        self.stop_handle().await;
        if self.closer.close(|| self.consumer.close()) {
            info!("订阅者已关闭");
        }
    }
}

impl<H, C, F> Drop for Subscriber<H, C, F>
where
    H: Handler,
    C: ConsumerClient,
    F: ScopeFactory<Scope = H::Scope>,
{
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.closer.close(|| self.consumer.close());
    }
}

#[instrument(name = "consume", skip_all, fields(topic = handler.topic()))]
async fn consume<H, C, F>(
    consumer: Arc<C>,
    handler: Arc<H>,
    scopes: Arc<F>,
    token: CancellationToken,
) -> Result<(), BusError>
where
    H: Handler,
    C: ConsumerClient,
    F: ScopeFactory<Scope = H::Scope>,
{
    while !token.is_cancelled() {
        let scoped = handler.bind_scope(scopes.create_scope());

        let record = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("消费被取消");
                return Err(BusError::Cancelled);
            }
            data = consumer.recv() => match data {
                Ok(record) => record,
                Err(e) => {
                    warn!("拉取消息失败，{}ms 后重试：{e}", PULL_RETRY.as_millis());
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            info!("消费被取消");
                            return Err(BusError::Cancelled);
                        }
                        _ = tokio::time::sleep(PULL_RETRY) => continue,
                    }
                }
            }
        };

        match process(handler.as_ref(), &scoped, &record, &token).await {
            Ok(true) => {
                if let Err(e) = consumer.commit(&record) {
                    warn!("提交偏移量 {} 失败：{e}", record.offset);
                } else {
                    debug!("提交偏移量 {}", record.offset);
                }
            }
            Ok(false) => warn!("消息处理失败，不提交偏移量 {}", record.offset),
            Err(BusError::Cancelled) => {
                info!("消费被取消");
                return Err(BusError::Cancelled);
            }
            Err(e) => warn!("消费失败，消息偏移量：{}，{e}", record.offset),
        }
    }

    Err(BusError::Cancelled)
}

async fn process<H>(
    handler: &H,
    scoped: &H::Scoped,
    record: &Record,
    token: &CancellationToken,
) -> Result<bool, BusError>
where
    H: Handler,
{
    let message = record
        .payload
        .as_deref()
        .and_then(|payload| handler.parse(payload))
        .ok_or_else(|| {
            BusError::Consume(format!(
                "无法解析 {}|{} 偏移量 {} 的消息",
                record.topic, record.partition, record.offset
            ))
        })?;

    match scoped.handle(message, token).await {
        Ok(handled) => Ok(handled),
        Err(_) if token.is_cancelled() => Err(BusError::Cancelled),
        Err(e) => Err(BusError::Consume(format!("处理器错误：{e}"))),
    }
}
