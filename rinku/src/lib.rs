//! # **rinku** 核心库
//!
//! 基于消息代理的类型化生产者与订阅者。投递语义为至少一次：
//! 消息处理成功后才提交偏移量。

#![warn(missing_docs)]

extern crate self as rinku;

pub(crate) mod lifecycle;

pub mod client;
pub mod config;
pub mod errors;
pub mod handler;
pub mod message;
pub mod producer;
pub mod subscriber;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;


/// # **rinku** 宏
pub mod macros {
    pub use rinku_macros::*;
}

pub use client::{ConsumerClient, DeliveryStatus, ProducerClient, Record};
pub use config::KafkaConfig;
pub use errors::{BoxError, BrokerError, BulkSendError, BusError, SendError};
pub use handler::{Handler, ScopeFactory, ScopedHandler};
pub use message::Message;
pub use producer::Producer;
pub use rinku_macros::Message;
pub use subscriber::{Subscriber, SubscriberState};
pub use tokio_util::sync::CancellationToken;
