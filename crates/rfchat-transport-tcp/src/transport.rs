use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rfchat_core::{
    PeerHandle, RfcommTransport, ServiceEndpoint, ServiceListener, Session, TransportError,
    TransportOp,
};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};

use crate::{
    error::{map_handshake_error, map_io_error},
    handshake::{self, Hello},
    listener::TcpServiceListener,
    session::TcpSession,
};

/// TCP 传输配置。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TcpTransportConfig {
    /// 监听地址；端口为 0 时由系统分配。
    pub listen_addr: SocketAddr,
    /// 握手中报告给对端的设备名。
    pub device_name: String,
    /// 握手的超时上限。
    pub handshake_timeout: Duration,
}

impl TcpTransportConfig {
    pub const DEFAULT_PORT: u16 = 7070;
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, Self::DEFAULT_PORT)),
            device_name: "rfchat".to_owned(),
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// 绑定失败（端口仍被上一个监听占用）时的重试次数与间隔。
const BIND_ATTEMPTS: usize = 5;
const BIND_RETRY_DELAY: Duration = Duration::from_millis(50);

/// 以 TCP 模拟 RFCOMM 的传输；克隆共享同一配置与绑定记录。
#[derive(Clone, Debug)]
pub struct TcpRfcommTransport {
    config: Arc<TcpTransportConfig>,
    bound: Arc<Mutex<Option<SocketAddr>>>,
}

impl TcpRfcommTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config: Arc::new(config),
            bound: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    /// 最近一次成功绑定的监听地址。
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }

    async fn bind(&self) -> Result<TokioTcpListener, TransportError> {
        let mut attempt = 1;
        loop {
            match TokioTcpListener::bind(self.config.listen_addr).await {
                Ok(listener) => return Ok(listener),
                Err(err)
                    if err.kind() == std::io::ErrorKind::AddrInUse && attempt < BIND_ATTEMPTS =>
                {
                    tracing::debug!(attempt, addr = %self.config.listen_addr, "address in use; retrying bind");
                    attempt += 1;
                    tokio::time::sleep(BIND_RETRY_DELAY).await;
                }
                Err(err) => return Err(TransportError::io(TransportOp::Listen, err)),
            }
        }
    }
}

#[async_trait]
impl RfcommTransport for TcpRfcommTransport {
    async fn listen(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<Box<dyn ServiceListener>, TransportError> {
        let inner = self.bind().await?;
        let local_addr = inner
            .local_addr()
            .map_err(|err| TransportError::io(TransportOp::Listen, err))?;
        *self.bound.lock() = Some(local_addr);
        tracing::info!(addr = %local_addr, service = %endpoint, "service record published");

        let hello = Hello::new(endpoint.uuid(), &self.config.device_name);
        Ok(Box::new(TcpServiceListener::new(
            inner,
            local_addr,
            hello,
            self.config.handshake_timeout,
        )))
    }

    async fn connect(
        &self,
        peer: &PeerHandle,
        endpoint: &ServiceEndpoint,
    ) -> Result<(Arc<dyn Session>, PeerHandle), TransportError> {
        let address = peer.address();
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|err| map_io_error(TransportOp::Connect, address, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(TransportOp::Connect, address, err))?;

        let hello = Hello::new(endpoint.uuid(), &self.config.device_name);
        let remote = handshake::initiate(&mut stream, &hello, self.config.handshake_timeout)
            .await
            .map_err(map_handshake_error)?;
        tracing::debug!(peer = %peer_addr, device = remote.device_name(), "handshake completed");
        let remote_peer = peer.clone().with_name(remote.device_name());
        Ok((Arc::new(TcpSession::new(stream, peer_addr)), remote_peer))
    }
}
