//! # 服务握手
//!
//! RFCOMM 以 SDP 记录中的服务标识决定连接落到哪个服务；TCP 没有这一层，
//! 因此建连后双方交换一帧问候：
//!
//! ```text
//! +----------------+-------------+-------------------+
//! | uuid (16 字节) | name_len u8 | name (UTF-8)      |
//! +----------------+-------------+-------------------+
//! ```
//!
//! - 外连端先发问候，再等待回礼；
//! - 监听端先读问候并校验标识，通过后回礼；不匹配时不回礼，直接丢弃套接字。

use std::{io, time::Duration};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// 设备名在帧内的最大字节数。
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// 握手失败原因。
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("service mismatch: expected {expected}, found {found}")]
    ServiceMismatch { expected: Uuid, found: Uuid },
    #[error("device name is not valid UTF-8")]
    InvalidName,
    #[error("peer closed the connection during handshake")]
    Closed,
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// 问候帧：服务标识 + 设备名。
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hello {
    service: Uuid,
    device_name: String,
}

impl Hello {
    /// 构造问候帧；超长设备名在字符边界处截断到 [`MAX_NAME_LEN`] 字节。
    pub fn new(service: Uuid, device_name: &str) -> Self {
        Self {
            service,
            device_name: truncate_name(device_name).to_owned(),
        }
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// 编码为线上字节。
    pub fn encode(&self) -> Vec<u8> {
        let name = self.device_name.as_bytes();
        let mut frame = Vec::with_capacity(17 + name.len());
        frame.extend_from_slice(self.service.as_bytes());
        // `new` 已保证长度不超过 u8::MAX。
        frame.push(name.len() as u8);
        frame.extend_from_slice(name);
        frame
    }

    /// 从流中读取一帧。
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, HandshakeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut service = [0_u8; 16];
        read_exact(reader, &mut service).await?;
        let mut len = [0_u8; 1];
        read_exact(reader, &mut len).await?;
        let mut name = vec![0_u8; usize::from(len[0])];
        read_exact(reader, &mut name).await?;
        let device_name = String::from_utf8(name).map_err(|_| HandshakeError::InvalidName)?;
        Ok(Self {
            service: Uuid::from_bytes(service),
            device_name,
        })
    }

    /// 写出一帧。
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), HandshakeError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn expect_service(&self, expected: Uuid) -> Result<(), HandshakeError> {
        if self.service == expected {
            Ok(())
        } else {
            Err(HandshakeError::ServiceMismatch {
                expected,
                found: self.service,
            })
        }
    }
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(HandshakeError::Closed),
        Err(err) => Err(HandshakeError::Io(err)),
    }
}

fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// 外连端：发送问候并校验回礼。
pub(crate) async fn initiate<S>(
    stream: &mut S,
    local: &Hello,
    limit: Duration,
) -> Result<Hello, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        local.write_to(stream).await?;
        let reply = Hello::read_from(stream).await?;
        reply.expect_service(local.service)?;
        Ok::<_, HandshakeError>(reply)
    };
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| HandshakeError::Timeout(limit))?
}

/// 监听端：读取问候、校验标识后回礼。
pub(crate) async fn respond<S>(
    stream: &mut S,
    local: &Hello,
    limit: Duration,
) -> Result<Hello, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        let hello = Hello::read_from(stream).await?;
        hello.expect_service(local.service)?;
        local.write_to(stream).await?;
        Ok::<_, HandshakeError>(hello)
    };
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| HandshakeError::Timeout(limit))?
}
