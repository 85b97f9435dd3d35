use std::net::SocketAddr;

use async_trait::async_trait;
use rfchat_core::{Cancellation, Session, TransportError, TransportOp, run_until_cancelled};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex as AsyncMutex,
};

use crate::error::map_io_error;

/// 完成握手的 TCP 会话。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 收发泵的接收循环与调用方的写入运行在不同任务中，读写必须能并发进行；
///   因此把流拆为读写半部，各自用 `tokio::sync::Mutex` 保护。
///
/// ## 契约 (What)
/// - `read` 返回 `Ok(0)` 表示对端关闭；
/// - `close` 同步、幂等：挂起中的读写立刻以 [`TransportError::Closed`] 返回，
///   之后的调用同样失败；套接字在最后一个引用释放时关闭。
#[derive(Debug)]
pub struct TcpSession {
    reader: AsyncMutex<OwnedReadHalf>,
    writer: AsyncMutex<OwnedWriteHalf>,
    closed: Cancellation,
    peer_addr: SocketAddr,
}

impl TcpSession {
    pub(crate) fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, %err, "failed to disable nagle");
        }
        let (reader, writer) = stream.into_split();
        Self {
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
            closed: Cancellation::new(),
            peer_addr,
        }
    }

    /// 对端套接字地址。
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn peer_label(&self) -> String {
        self.peer_addr.to_string()
    }
}

#[async_trait]
impl Session for TcpSession {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let read = async {
            let mut reader = self.reader.lock().await;
            reader.read(buf).await
        };
        match run_until_cancelled(&self.closed, read).await {
            Some(Ok(len)) => Ok(len),
            Some(Err(err)) => Err(map_io_error(TransportOp::Read, &self.peer_label(), err)),
            None => Err(TransportError::closed(TransportOp::Read)),
        }
    }

    async fn write_all(&self, buf: &[u8]) -> Result<(), TransportError> {
        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(buf).await?;
            writer.flush().await
        };
        match run_until_cancelled(&self.closed, write).await {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(map_io_error(TransportOp::Write, &self.peer_label(), err)),
            None => Err(TransportError::closed(TransportOp::Write)),
        }
    }

    fn close(&self) {
        if self.closed.cancel() {
            tracing::debug!(peer = %self.peer_addr, "tcp session closed");
        }
    }
}
