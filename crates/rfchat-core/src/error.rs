//! # error 模块说明
//!
//! - [`TransportError`]：传输层 IO 失败，附带操作种类与稳定错误码；
//! - [`ChatError`]：构造期与内部不变式错误。
//!
//! 两者都不会从 [`ChatService`](crate::ChatService) 的控制操作向调用方抛出，
//! 运行期失败统一经由 [`ChatEvent::Failure`](crate::ChatEvent::Failure) 呈现。

use core::fmt;
use std::io;

use thiserror::Error;

use crate::state::ConnectionState;

/// 传输操作种类，用于错误分类与日志字段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransportOp {
    /// 绑定服务端点并开始监听。
    Listen,
    /// 接受下一条入站连接。
    Accept,
    /// 向对端发起连接。
    Connect,
    /// 从会话读取。
    Read,
    /// 向会话写入。
    Write,
}

impl TransportOp {
    /// 稳定错误码，可直接作为指标标签。
    pub const fn code(self) -> &'static str {
        match self {
            TransportOp::Listen => "rfchat.transport.listen_failed",
            TransportOp::Accept => "rfchat.transport.accept_failed",
            TransportOp::Connect => "rfchat.transport.connect_failed",
            TransportOp::Read => "rfchat.transport.read_failed",
            TransportOp::Write => "rfchat.transport.write_failed",
        }
    }
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportOp::Listen => "listen",
            TransportOp::Accept => "accept",
            TransportOp::Connect => "connect",
            TransportOp::Read => "read",
            TransportOp::Write => "write",
        };
        f.write_str(label)
    }
}

/// 传输层错误域。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 底层 IO 失败。
    #[error("{op} failed: {source}")]
    Io {
        op: TransportOp,
        #[source]
        source: io::Error,
    },

    /// 句柄已关闭，操作被中止。
    #[error("{op} aborted: transport handle closed")]
    Closed { op: TransportOp },

    /// 对端不可达（无此设备或未广播该服务）。
    #[error("peer `{address}` is unreachable")]
    Unreachable { address: String },

    /// 对端握手不符合服务端点约定。
    #[error("handshake rejected: {reason}")]
    Rejected { reason: String },
}

impl TransportError {
    /// 以操作种类包装 IO 错误。
    pub fn io(op: TransportOp, source: io::Error) -> Self {
        TransportError::Io { op, source }
    }

    /// 构造“句柄已关闭”错误。
    pub fn closed(op: TransportOp) -> Self {
        TransportError::Closed { op }
    }

    /// 失败对应的操作种类（若可确定）。
    pub fn op(&self) -> Option<TransportOp> {
        match self {
            TransportError::Io { op, .. } | TransportError::Closed { op } => Some(*op),
            TransportError::Unreachable { .. } => Some(TransportOp::Connect),
            TransportError::Rejected { .. } => None,
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Rejected { .. } => "rfchat.transport.handshake_rejected",
            other => other.op().map_or("rfchat.transport.unknown", TransportOp::code),
        }
    }
}

/// 聊天核心错误域。
#[derive(Debug, Error)]
pub enum ChatError {
    /// 构造服务时找不到可承载工作者的 Tokio 运行时。
    #[error("no tokio runtime available to host chat workers")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// 配置文本无法解析。
    #[error("invalid chat configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// 配置字段取值非法。
    #[error("invalid chat configuration: {detail}")]
    InvalidConfig { detail: String },

    /// 状态机拒绝非法跃迁。
    #[error("illegal connection state transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_operation() {
        let err = TransportError::io(TransportOp::Read, io::ErrorKind::ConnectionReset.into());
        assert_eq!(err.code(), "rfchat.transport.read_failed");
        let err = TransportError::Unreachable {
            address: "aa".into(),
        };
        assert_eq!(err.code(), "rfchat.transport.connect_failed");
        let err = TransportError::Rejected {
            reason: "uuid".into(),
        };
        assert_eq!(err.code(), "rfchat.transport.handshake_rejected");
    }

    #[test]
    fn transition_error_is_readable() {
        let err = ChatError::InvalidTransition {
            from: ConnectionState::Connected,
            to: ConnectionState::Connecting,
        };
        assert_eq!(
            err.to_string(),
            "illegal connection state transition connected -> connecting"
        );
    }
}
