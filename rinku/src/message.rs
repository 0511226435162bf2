//! # 消息信封
//!
//! 应用消息以 JSON 形式在主题中传输。

use crate::errors::SendError;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// 消息特征
///
/// 一般通过 `#[derive(Message)]` 实现。
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 编码为传输负载
    #[inline]
    fn to_payload(&self) -> Result<Vec<u8>, SendError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 从传输负载解码，无法解析时返回 `None`
    #[inline]
    fn from_payload(payload: &[u8]) -> Option<Self> {
        match serde_json::from_slice(payload) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("消息负载解析失败：{e}");
                None
            }
        }
    }
}
