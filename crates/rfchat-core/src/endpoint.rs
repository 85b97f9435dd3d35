//! 服务端点与对端句柄。

use core::fmt;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

/// 本应用对外广播的服务端点：稳定标识 + 可读名称。
///
/// # 契约 (What)
/// - 监听与外连使用同一端点；双方标识一致时才能免发现直连；
/// - 进程生命周期内不可变，内部以 `Arc<str>` 共享名称，克隆廉价。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(from = "EndpointRepr")]
pub struct ServiceEndpoint {
    uuid: Uuid,
    name: Arc<str>,
}

impl ServiceEndpoint {
    /// 聊天服务的默认 SDP 记录名。
    pub const DEFAULT_NAME: &'static str = "BluetoothChat";
    /// 聊天服务的默认标识。
    pub const DEFAULT_UUID: Uuid = Uuid::from_u128(0xfa98c1d1_afac_22de_9a49_0900200c9a77);

    /// 以给定标识与名称构造端点。
    pub fn new(uuid: Uuid, name: impl Into<Arc<str>>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }

    /// 服务标识。
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// 服务名称。
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self::new(Self::DEFAULT_UUID, Self::DEFAULT_NAME)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

#[derive(Deserialize)]
struct EndpointRepr {
    #[serde(default = "default_uuid")]
    uuid: Uuid,
    #[serde(default = "default_name")]
    name: String,
}

fn default_uuid() -> Uuid {
    ServiceEndpoint::DEFAULT_UUID
}

fn default_name() -> String {
    ServiceEndpoint::DEFAULT_NAME.to_owned()
}

impl From<EndpointRepr> for ServiceEndpoint {
    fn from(repr: EndpointRepr) -> Self {
        Self::new(repr.uuid, repr.name)
    }
}

/// 远端设备的不透明引用：地址 + 可选显示名。
///
/// 由 `connect` 的调用方提供，或由监听工作者在接受入站连接时生成。
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PeerHandle {
    address: String,
    name: Option<String>,
}

impl PeerHandle {
    /// 仅以地址构造。
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// 附加显示名。
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 设备地址。
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 设备自报的名称（若有）。
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// 展示用名称：有名称取名称，否则退回地址。
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} [{}]", self.address),
            None => f.write_str(&self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_matches_chat_service_record() {
        let endpoint = ServiceEndpoint::default();
        assert_eq!(endpoint.name(), "BluetoothChat");
        assert_eq!(
            endpoint.uuid().to_string(),
            "fa98c1d1-afac-22de-9a49-0900200c9a77"
        );
    }

    #[test]
    fn display_name_falls_back_to_address() {
        let bare = PeerHandle::new("00:11:22:33:44:55");
        assert_eq!(bare.display_name(), "00:11:22:33:44:55");
        let named = bare.with_name("Pixel");
        assert_eq!(named.display_name(), "Pixel");
        assert_eq!(named.to_string(), "Pixel [00:11:22:33:44:55]");
    }
}
