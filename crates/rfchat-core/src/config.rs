//! 聊天核心配置。
//!
//! 以 TOML 描述，所有字段均有默认值：
//!
//! ```toml
//! read_buffer_size = 1024
//!
//! [endpoint]
//! name = "BluetoothChat"
//! uuid = "fa98c1d1-afac-22de-9a49-0900200c9a77"
//! ```

use serde::Deserialize;

use crate::{endpoint::ServiceEndpoint, error::ChatError};

/// 单次读取使用的缓冲区大小。
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// 聊天核心配置。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// 监听与外连共用的服务端点。
    pub endpoint: ServiceEndpoint,
    /// 收发泵每次读取的上限字节数。
    pub read_buffer_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: ServiceEndpoint::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ChatConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ChatError> {
        let config: ChatConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 替换服务端点。
    pub fn with_endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// 替换读缓冲大小。
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.read_buffer_size == 0 {
            return Err(ChatError::InvalidConfig {
                detail: "read_buffer_size must be non-zero".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ChatConfig::from_toml_str("").expect("空配置应可解析");
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn endpoint_fields_are_overridable() {
        let config = ChatConfig::from_toml_str(
            r#"
            read_buffer_size = 64

            [endpoint]
            name = "LabChat"
            uuid = "00000000-0000-0000-0000-000000000042"
            "#,
        )
        .expect("合法配置应可解析");
        assert_eq!(config.read_buffer_size, 64);
        assert_eq!(config.endpoint.name(), "LabChat");
        assert_eq!(config.endpoint.uuid(), Uuid::from_u128(0x42));
    }

    #[test]
    fn partial_endpoint_keeps_default_uuid() {
        let config = ChatConfig::from_toml_str("[endpoint]\nname = \"Other\"\n").expect("解析");
        assert_eq!(config.endpoint.uuid(), ServiceEndpoint::DEFAULT_UUID);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = ChatConfig::from_toml_str("read_buffer_size = 0").unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig { .. }), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ChatConfig::from_toml_str("retries = 3").unwrap_err();
        assert!(matches!(err, ChatError::Config(_)), "{err}");
    }
}
