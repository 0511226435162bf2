//! # 连接配置
//!
//! 配置值构造后不可变。生产者与订阅者只接收已构造的配置，
//! 不会自行读取环境变量。

use crate::errors::BusError;
use config::{Config, Environment};
use serde::Deserialize;
use std::{collections::HashMap, fmt, time::Duration};
use tracing::{error, info};
use validator::{Validate, ValidationError};

const ENV_PREFIX: &str = "RINKU_KAFKA";

/// Kafka 连接配置
#[derive(Clone, Deserialize, Validate)]
pub struct KafkaConfig {
    #[validate(custom(function = "not_blank"))]
    address: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[validate(custom(function = "not_blank"))]
    client_id: String,
    #[serde(default)]
    consumer_group_id: Option<String>,
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    timeout: u64,
    #[serde(default)]
    settings: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    45
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

impl KafkaConfig {
    /// 构造函数
    pub fn new(address: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: None,
            password: None,
            client_id: client_id.into(),
            consumer_group_id: None,
            timeout: default_timeout(),
            settings: HashMap::new(),
        }
    }

    /// 设置认证信息
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// 设置消费组，订阅者必需
    pub fn with_consumer_group(mut self, group_id: impl Into<String>) -> Self {
        self.consumer_group_id = Some(group_id.into());
        self
    }

    /// 设置单条发送的队列超时
    ///
    /// 精度为秒，不足一秒的部分向上取整，最小为一秒。
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.timeout = secs.max(1);
        self
    }

    /// 追加客户端库配置项，覆盖默认值
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// 从环境变量加载
    ///
    /// 读取 `RINKU_KAFKA_ADDRESS`、`RINKU_KAFKA_USER`、`RINKU_KAFKA_PASSWORD`、
    /// `RINKU_KAFKA_CLIENT_ID`、`RINKU_KAFKA_CONSUMER_GROUP_ID` 与 `RINKU_KAFKA_TIMEOUT`。
    pub fn from_env() -> Result<Self, BusError> {
        Self::load(Environment::with_prefix(ENV_PREFIX))
    }

    pub(crate) fn load(env: Environment) -> Result<Self, BusError> {
        let cfg = Config::builder()
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize::<KafkaConfig>())
            .map_err(|e| {
                error!("加载连接配置失败：{e}");
                BusError::Configuration(e.to_string())
            })?;
        cfg.check()?;
        info!("成功加载连接配置：{}", cfg.address);
        Ok(cfg)
    }

    /// 校验配置
    pub fn check(&self) -> Result<(), BusError> {
        self.validate()
            .map_err(|e| BusError::Configuration(e.to_string()))
    }

    /// 消息代理地址
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 客户端标识
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 认证信息，用户名与密码同时存在时才生效
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }

    /// 消费组，缺失时返回配置错误
    pub fn consumer_group(&self) -> Result<&str, BusError> {
        match self.consumer_group_id.as_deref() {
            Some(group) if !group.trim().is_empty() => Ok(group),
            _ => Err(BusError::Configuration(
                "创建订阅者必须设置消费组".to_owned(),
            )),
        }
    }

    /// 单条发送的队列超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// 追加的客户端库配置项
    pub fn settings(&self) -> &HashMap<String, String> {
        &self.settings
    }
}

impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("consumer_group_id", &self.consumer_group_id)
            .field("timeout", &self.timeout)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn load_from_env() {
        let cfg = KafkaConfig::load(env(&[
            ("RINKU_KAFKA_ADDRESS", "localhost:9092"),
            ("RINKU_KAFKA_USER", "user"),
            ("RINKU_KAFKA_PASSWORD", "secret"),
            ("RINKU_KAFKA_CLIENT_ID", "client"),
            ("RINKU_KAFKA_CONSUMER_GROUP_ID", "group"),
        ]))
        .unwrap();
        assert_eq!(cfg.address(), "localhost:9092");
        assert_eq!(cfg.client_id(), "client");
        assert_eq!(cfg.credentials(), Some(("user", "secret")));
        assert_eq!(cfg.consumer_group().unwrap(), "group");
        assert_eq!(cfg.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn load_timeout_from_env() {
        let cfg = KafkaConfig::load(env(&[
            ("RINKU_KAFKA_ADDRESS", "localhost:9092"),
            ("RINKU_KAFKA_CLIENT_ID", "client"),
            ("RINKU_KAFKA_TIMEOUT", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert!(cfg.credentials().is_none());
    }

    #[rstest]
    #[case::missing_address(&[("RINKU_KAFKA_CLIENT_ID", "client")])]
    #[case::missing_client_id(&[("RINKU_KAFKA_ADDRESS", "localhost:9092")])]
    #[case::blank_client_id(&[("RINKU_KAFKA_ADDRESS", "localhost:9092"), ("RINKU_KAFKA_CLIENT_ID", "  ")])]
    fn load_incomplete_env(#[case] vars: &[(&str, &str)]) {
        let result = KafkaConfig::load(env(vars));
        assert!(matches!(result, Err(BusError::Configuration(_))));
    }

    #[test]
    fn consumer_group_is_required() {
        let cfg = KafkaConfig::new("localhost:9092", "client");
        assert!(matches!(
            cfg.consumer_group(),
            Err(BusError::Configuration(_))
        ));
        let cfg = cfg.with_consumer_group("group");
        assert_eq!(cfg.consumer_group().unwrap(), "group");
    }

    #[test]
    fn credentials_need_user_and_password() {
        let mut cfg = KafkaConfig::new("localhost:9092", "client");
        cfg.user = Some("user".to_string());
        assert!(cfg.credentials().is_none());
        let cfg = cfg.with_credentials("user", "secret");
        assert_eq!(cfg.credentials(), Some(("user", "secret")));
    }

    #[rstest]
    #[case(Duration::ZERO, 1)]
    #[case(Duration::from_millis(300), 1)]
    #[case(Duration::from_secs(2), 2)]
    #[case(Duration::from_millis(1900), 2)]
    #[case(Duration::from_millis(2001), 3)]
    fn timeout_rounds_up_to_seconds(#[case] timeout: Duration, #[case] secs: u64) {
        let cfg = KafkaConfig::new("localhost:9092", "client").with_timeout(timeout);
        assert_eq!(cfg.timeout(), Duration::from_secs(secs));
    }

    #[test]
    fn debug_hides_password() {
        let cfg = KafkaConfig::new("localhost:9092", "client").with_credentials("user", "secret");
        let text = format!("{cfg:?}");
        assert!(!text.contains("secret"));
        assert!(text.contains("***"));
    }

    #[test]
    fn check_rejects_blank_address() {
        let cfg = KafkaConfig::new(" ", "client");
        assert!(matches!(cfg.check(), Err(BusError::Configuration(_))));
        assert!(KafkaConfig::new("localhost:9092", "client").check().is_ok());
    }
}
