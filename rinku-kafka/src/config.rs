//! # 客户端配置
//!
//! 由 [`KafkaConfig`] 生成 rdkafka 的 [`ClientConfig`]，默认值之后再应用追加配置项。

use rdkafka::ClientConfig;
use rinku::{BusError, KafkaConfig};
use tracing::debug;

/// 生产者客户端配置
pub fn producer_config(cfg: &KafkaConfig) -> Result<ClientConfig, BusError> {
    cfg.check()?;
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", cfg.address())
        .set("client.id", cfg.client_id());
    apply_common(&mut config, cfg);
    debug!("生产者客户端配置：{cfg:?}");
    Ok(config)
}

/// 消费者客户端配置，缺少消费组时返回配置错误
pub fn consumer_config(cfg: &KafkaConfig) -> Result<ClientConfig, BusError> {
    cfg.check()?;
    let group = cfg.consumer_group()?;
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", cfg.address())
        .set("client.id", cfg.client_id())
        .set("group.id", group)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("partition.assignment.strategy", "cooperative-sticky");
    apply_common(&mut config, cfg);
    debug!("消费者客户端配置：{cfg:?}");
    Ok(config)
}

fn apply_common(config: &mut ClientConfig, cfg: &KafkaConfig) {
    if let Some((user, password)) = cfg.credentials() {
        config
            .set("sasl.username", user)
            .set("sasl.password", password)
            .set("sasl.mechanism", "PLAIN")
            .set("security.protocol", "SASL_PLAINTEXT");
    }
    for (key, value) in cfg.settings() {
        config.set(key, value);
    }
}
