use std::io;

use rfchat_core::{TransportError, TransportOp};

use crate::handshake::HandshakeError;

/// 将 IO 错误映射为核心传输错误。
///
/// 外连阶段的拒绝/不可达归类为 [`TransportError::Unreachable`]，与内存传输对
/// 未登记地址的报告保持一致。
pub(crate) fn map_io_error(op: TransportOp, address: &str, error: io::Error) -> TransportError {
    use io::ErrorKind;
    match (op, error.kind()) {
        (
            TransportOp::Connect,
            ErrorKind::ConnectionRefused | ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable,
        ) => TransportError::Unreachable {
            address: address.to_owned(),
        },
        _ => TransportError::io(op, error),
    }
}

/// 握手失败统一视为对端拒绝。
pub(crate) fn map_handshake_error(error: HandshakeError) -> TransportError {
    match error {
        HandshakeError::Io(source) => TransportError::io(TransportOp::Connect, source),
        other => TransportError::Rejected {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_is_unreachable() {
        let err = map_io_error(
            TransportOp::Connect,
            "127.0.0.1:9",
            io::ErrorKind::ConnectionRefused.into(),
        );
        assert!(matches!(err, TransportError::Unreachable { ref address } if address == "127.0.0.1:9"));
    }

    #[test]
    fn refused_read_stays_io() {
        let err = map_io_error(TransportOp::Read, "peer", io::ErrorKind::ConnectionReset.into());
        assert_eq!(err.code(), "rfchat.transport.read_failed");
    }
}
