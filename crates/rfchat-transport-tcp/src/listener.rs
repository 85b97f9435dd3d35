use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use rfchat_core::{
    Cancellation, PeerHandle, ServiceListener, Session, TransportError, TransportOp,
    run_until_cancelled,
};
use tokio::net::TcpListener as TokioTcpListener;

use crate::{
    handshake::{self, Hello},
    session::TcpSession,
};

/// 绑定了服务端点的 TCP 监听器。
///
/// 每条入站连接先完成服务握手；握手失败（标识不符、超时、对端提前关闭）的
/// 套接字被丢弃，`accept` 继续等待下一条连接，调用方看不到这些失败。
#[derive(Debug)]
pub struct TcpServiceListener {
    inner: TokioTcpListener,
    local_addr: SocketAddr,
    hello: Hello,
    handshake_timeout: Duration,
    closed: Cancellation,
}

impl TcpServiceListener {
    pub(crate) fn new(
        inner: TokioTcpListener,
        local_addr: SocketAddr,
        hello: Hello,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            local_addr,
            hello,
            handshake_timeout,
            closed: Cancellation::new(),
        }
    }

    /// 实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl ServiceListener for TcpServiceListener {
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerHandle), TransportError> {
        loop {
            let (mut stream, peer_addr) = run_until_cancelled(&self.closed, self.inner.accept())
                .await
                .ok_or_else(|| TransportError::closed(TransportOp::Accept))?
                .map_err(|err| TransportError::io(TransportOp::Accept, err))?;

            let greeting = handshake::respond(&mut stream, &self.hello, self.handshake_timeout);
            match run_until_cancelled(&self.closed, greeting).await {
                Some(Ok(remote)) => {
                    tracing::debug!(peer = %peer_addr, device = remote.device_name(), "handshake accepted");
                    let peer = PeerHandle::new(peer_addr.to_string()).with_name(remote.device_name());
                    let session: Arc<dyn Session> = Arc::new(TcpSession::new(stream, peer_addr));
                    return Ok((session, peer));
                }
                Some(Err(err)) => {
                    tracing::warn!(peer = %peer_addr, %err, "dropping inbound connection");
                }
                None => return Err(TransportError::closed(TransportOp::Accept)),
            }
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}
