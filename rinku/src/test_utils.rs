//! # 测试工具
//!
//! 内存消息代理与记录型处理器，不依赖真实消息代理。

use crate::{
    client::{ConsumerClient, DeliveryStatus, ProducerClient, Record},
    errors::{BoxError, BrokerError},
    handler::{Handler, ScopeFactory, ScopedHandler},
    message::Message,
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

type Reject = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;
type Decide<M> = Arc<dyn Fn(&M) -> Result<bool, BoxError> + Send + Sync>;

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<Vec<u8>>>,
    commits: HashMap<String, Vec<i64>>,
    flushes: usize,
}

/// 内存消息代理
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    /// 构造函数
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建生产者客户端
    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            status: DeliveryStatus::Persisted,
            reject: None,
            drained: true,
            hanging: false,
            closed: AtomicBool::new(false),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 创建消费者客户端
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            cursor: Mutex::new(None),
            pull_failures: AtomicUsize::new(0),
            commit_failures: AtomicUsize::new(0),
            subscribe_fails: false,
            closed: AtomicBool::new(false),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 直接写入一条记录，返回其偏移量
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = {
            let mut state = self.state();
            let records = state.topics.entry(topic.to_owned()).or_default();
            records.push(payload.into());
            records.len() as i64 - 1
        };
        self.notify.notify_waiters();
        offset
    }

    /// 主题中的记录数
    pub fn records(&self, topic: &str) -> usize {
        self.state().topics.get(topic).map_or(0, Vec::len)
    }

    /// 主题已提交的偏移量，按提交顺序
    pub fn committed(&self, topic: &str) -> Vec<i64> {
        self.state().commits.get(topic).cloned().unwrap_or_default()
    }

    /// 刷出次数
    pub fn flushes(&self) -> usize {
        self.state().flushes
    }
}

/// 内存生产者客户端
pub struct MemoryProducer {
    broker: MemoryBroker,
    status: DeliveryStatus,
    reject: Option<Reject>,
    drained: bool,
    hanging: bool,
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
}

impl MemoryProducer {
    /// 单条发送返回的送达状态
    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }

    /// 拒绝满足条件的负载
    pub fn reject_when(mut self, reject: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        self.reject = Some(Arc::new(reject));
        self
    }

    /// 刷出总是超时
    pub fn stalled(mut self) -> Self {
        self.drained = false;
        self
    }

    /// 单条发送永不确认
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }

    /// 释放连接的次数计数
    pub fn closes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn accept(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::msg("生产者连接已关闭"));
        }
        if self.reject.as_ref().is_some_and(|reject| reject(payload)) {
            return Err(BrokerError::msg(format!("主题 {topic} 拒绝消息")));
        }
        Ok(())
    }
}

impl ProducerClient for MemoryProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<DeliveryStatus, BrokerError> {
        self.accept(topic, payload)?;
        if self.hanging {
            std::future::pending::<()>().await;
        }
        if self.status != DeliveryStatus::NotPersisted {
            self.broker.publish(topic, payload);
        }
        Ok(self.status)
    }

    fn enqueue(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.accept(topic, payload)?;
        self.broker.publish(topic, payload);
        Ok(())
    }

    fn flush(&self, _timeout: Duration) -> bool {
        self.broker.state().flushes += 1;
        self.drained
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 内存消费者客户端
///
/// 订阅后从该主题最后提交的位置之后开始读取。
pub struct MemoryConsumer {
    broker: MemoryBroker,
    cursor: Mutex<Option<(String, i64)>>,
    pull_failures: AtomicUsize,
    commit_failures: AtomicUsize,
    subscribe_fails: bool,
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
}

fn take_failure(failures: &AtomicUsize) -> bool {
    failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryConsumer {
    /// 接下来 `count` 次拉取返回错误
    pub fn fail_pulls(self, count: usize) -> Self {
        self.pull_failures.store(count, Ordering::SeqCst);
        self
    }

    /// 接下来 `count` 次提交返回错误
    pub fn fail_commits(self, count: usize) -> Self {
        self.commit_failures.store(count, Ordering::SeqCst);
        self
    }

    /// 订阅总是失败
    pub fn fail_subscribe(mut self) -> Self {
        self.subscribe_fails = true;
        self
    }

    /// 释放连接的次数计数
    pub fn closes(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn cursor(&self) -> MutexGuard<'_, Option<(String, i64)>> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_next(&self) -> Result<Option<Record>, BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::msg("消费者连接已关闭"));
        }
        if take_failure(&self.pull_failures) {
            return Err(BrokerError::msg("拉取失败"));
        }

        let mut cursor = self.cursor();
        let Some((topic, position)) = cursor.as_mut() else {
            return Ok(None);
        };
        let state = self.broker.state();
        let record = state
            .topics
            .get(topic.as_str())
            .and_then(|records| records.get(*position as usize))
            .map(|payload| Record {
                topic: topic.clone(),
                partition: 0,
                offset: *position,
                payload: Some(payload.clone()),
            });
        if record.is_some() {
            *position += 1;
        }
        Ok(record)
    }
}

impl ConsumerClient for MemoryConsumer {
    fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::msg("消费者连接已关闭"));
        }
        if self.subscribe_fails {
            return Err(BrokerError::msg(format!("订阅主题 {topic} 失败")));
        }
        let position = self
            .broker
            .committed(topic)
            .into_iter()
            .max()
            .map_or(0, |offset| offset + 1);
        *self.cursor() = Some((topic.to_owned(), position));
        self.broker.notify.notify_waiters();
        Ok(())
    }

    fn unsubscribe(&self) {
        *self.cursor() = None;
    }

    async fn recv(&self) -> Result<Record, BrokerError> {
        loop {
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(record) = self.try_next()? {
                return Ok(record);
            }
            notified.await;
        }
    }

    fn commit(&self, record: &Record) -> Result<(), BrokerError> {
        if take_failure(&self.commit_failures) {
            return Err(BrokerError::msg(format!("提交偏移量 {} 失败", record.offset)));
        }
        self.broker
            .state()
            .commits
            .entry(record.topic.clone())
            .or_default()
            .push(record.offset);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 计数型作用域工厂
#[derive(Clone, Default)]
pub struct CountingScopes {
    created: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl CountingScopes {
    /// 已创建的作用域数
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 已释放的作用域数
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ScopeFactory for CountingScopes {
    type Scope = ScopeGuard;

    fn create_scope(&self) -> ScopeGuard {
        self.created.fetch_add(1, Ordering::SeqCst);
        ScopeGuard {
            released: Arc::clone(&self.released),
        }
    }
}

/// 作用域，释放时计数
pub struct ScopeGuard {
    released: Arc<AtomicUsize>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// 记录型处理器，克隆体共享记录
pub struct RecordingHandler<M> {
    topic: String,
    messages: Arc<Mutex<Vec<M>>>,
    decide: Decide<M>,
}

impl<M> Clone for RecordingHandler<M> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            messages: Arc::clone(&self.messages),
            decide: Arc::clone(&self.decide),
        }
    }
}

impl<M> RecordingHandler<M>
where
    M: Message + Clone,
{
    /// 构造函数，所有消息均处理成功
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            messages: Arc::new(Mutex::new(Vec::new())),
            decide: Arc::new(|_| Ok(true)),
        }
    }

    /// 自定义处理结果
    pub fn deciding(
        mut self,
        decide: impl Fn(&M) -> Result<bool, BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.decide = Arc::new(decide);
        self
    }

    /// 已处理的消息
    pub fn messages(&self) -> Vec<M> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 处理次数
    pub fn handled(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<M> Handler for RecordingHandler<M>
where
    M: Message + Clone,
{
    type Message = M;
    type Scope = ScopeGuard;
    type Scoped = ScopedRecorder<M>;

    fn topic(&self) -> &str {
        &self.topic
    }

    fn bind_scope(&self, scope: ScopeGuard) -> ScopedRecorder<M> {
        ScopedRecorder {
            _scope: scope,
            messages: Arc::clone(&self.messages),
            decide: Arc::clone(&self.decide),
        }
    }
}

/// 绑定作用域的记录型处理器
pub struct ScopedRecorder<M> {
    _scope: ScopeGuard,
    messages: Arc<Mutex<Vec<M>>>,
    decide: Decide<M>,
}

impl<M> ScopedHandler for ScopedRecorder<M>
where
    M: Message + Clone,
{
    type Message = M;

    async fn handle(&self, message: M, _cancel: &CancellationToken) -> Result<bool, BoxError> {
        let result = (self.decide)(&message);
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        result
    }
}

/// 轮询等待条件成立，超时返回 `false`
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
