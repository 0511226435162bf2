//! # 订阅处理器特征

use crate::{errors::BoxError, message::Message};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// 订阅处理器特征
///
/// 由应用实现，订阅者同一时刻只持有一个处理器。
pub trait Handler: Send + Sync + 'static {
    /// 消息类型
    type Message: Message;
    /// 每条消息独享的作用域资源
    type Scope: Send + 'static;
    /// 绑定作用域后的处理器
    type Scoped: ScopedHandler<Message = Self::Message>;

    /// 订阅的主题
    fn topic(&self) -> &str;

    /// 解析消息负载，无法解析时返回 `None`
    #[inline]
    fn parse(&self, payload: &[u8]) -> Option<Self::Message> {
        Self::Message::from_payload(payload)
    }

    /// 绑定作用域，作用域随返回值在本轮处理结束时释放
    fn bind_scope(&self, scope: Self::Scope) -> Self::Scoped;
}

/// 绑定作用域的处理器特征
pub trait ScopedHandler: Send + Sync + 'static {
    /// 消息类型
    type Message: Message;

    /// 处理消息，返回是否处理成功
    ///
    /// 错误应以 `Err` 返回。恐慌会结束后台消费任务，需再次调用
    /// [`Subscriber::begin_handle`](crate::Subscriber::begin_handle) 恢复处理。
    fn handle(
        &self,
        message: Self::Message,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;
}

/// 作用域工厂特征
pub trait ScopeFactory: Send + Sync + 'static {
    /// 作用域类型
    type Scope: Send + 'static;

    /// 创建作用域
    fn create_scope(&self) -> Self::Scope;
}

impl<F, S> ScopeFactory for F
where
    F: Fn() -> S + Send + Sync + 'static,
    S: Send + 'static,
{
    type Scope = S;

    #[inline]
    fn create_scope(&self) -> S {
        self()
    }
}
