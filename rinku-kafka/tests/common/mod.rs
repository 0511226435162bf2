#![allow(dead_code)]

use rdkafka::{
    ClientConfig,
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
};
use rinku::{KafkaConfig, Message};
use serde::{Deserialize, Serialize};
use std::sync::Once;
use tokio::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::fmt;
use uuid::Uuid;

pub const BOOTSTRAP: &str = "localhost:9092";
pub const WAIT: Duration = Duration::from_secs(30);

static LOGGING: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Message)]
pub struct Ticket {
    pub id: u32,
    pub title: String,
}

impl Ticket {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            title: format!("ticket-{id}"),
        }
    }
}

pub fn init_logging() {
    LOGGING.call_once(|| {
        fmt().with_test_writer().with_max_level(Level::DEBUG).init();
        info!("启用 {} 测试日志输出", Level::DEBUG);
    });
}

pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

pub fn broker_config(group: &str) -> KafkaConfig {
    KafkaConfig::new(BOOTSTRAP, unique("rinku-test")).with_consumer_group(group)
}

pub async fn create_topic(name: &str) {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", BOOTSTRAP)
        .create()
        .unwrap();
    let opts = AdminOptions::new()
        .operation_timeout(Some(Duration::from_secs(3)))
        .request_timeout(Some(Duration::from_secs(5)));
    let topic = NewTopic::new(name, 1, TopicReplication::Fixed(1));
    admin.create_topics(&[topic], &opts).await.unwrap();
}
