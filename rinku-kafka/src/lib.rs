//! # **rinku** 的 Kafka 实现
//!
//! 基于 rdkafka 的生产者与消费者客户端，以及按连接配置构造门面的函数。

pub mod config;
pub mod producer;
pub mod subscriber;

pub use producer::{KafkaProducer, KafkaProducerClient, producer};
pub use subscriber::{KafkaConsumerClient, KafkaSubscriber, subscriber};
