//! # 传输契约
//!
//! 把无线传输（RFCOMM 风格的面向连接信道）抽象为三个对象安全的异步 trait，
//! 状态机只通过它们操作底层句柄。
//!
//! ## 契约 (What)
//! - [`RfcommTransport`]：按服务端点监听、向对端发起单次连接、停止设备发现；
//! - [`ServiceListener`]：逐个接受入站连接；`close` 之后挂起的 `accept` 应以错误返回；
//! - [`Session`]：全双工字节流；`read` 与 `write_all` 可在不同任务中并发调用，
//!   `close` 同步、幂等，并解除挂起中的读。
//!
//! ## 注意事项
//! - 工作者在调用这些方法时总会叠加 [`run_until_cancelled`](crate::run_until_cancelled)，
//!   实现方即便无法在 `close` 后立刻解除阻塞，也不会拖住退役流程；
//! - `read` 返回 `Ok(0)` 表示对端关闭，收发泵将其视为连接丢失。

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    endpoint::{PeerHandle, ServiceEndpoint},
    error::TransportError,
};

/// 面向连接的无线传输。
#[async_trait]
pub trait RfcommTransport: Send + Sync + 'static {
    /// 以服务端点开始监听。
    async fn listen(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<Box<dyn ServiceListener>, TransportError>;

    /// 向对端的服务端点发起一次连接。
    ///
    /// 返回的对端句柄可携带握手中得知的设备名，供 `PeerConnected` 展示。
    async fn connect(
        &self,
        peer: &PeerHandle,
        endpoint: &ServiceEndpoint,
    ) -> Result<(Arc<dyn Session>, PeerHandle), TransportError>;

    /// 停止进行中的设备发现。发现会拖慢建连，外连前总会调用。
    fn cancel_discovery(&self) {}
}

/// 已绑定服务端点的监听句柄。
#[async_trait]
pub trait ServiceListener: Send + Sync {
    /// 等待下一条入站连接，返回会话与对端句柄。
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerHandle), TransportError>;

    /// 关闭监听句柄。
    fn close(&self);
}

/// 已建立的全双工字节流。
#[async_trait]
pub trait Session: Send + Sync {
    /// 读取可用字节到 `buf`，返回读取长度。
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// 写入整个缓冲区。
    async fn write_all(&self, buf: &[u8]) -> Result<(), TransportError>;

    /// 关闭会话。
    fn close(&self);
}
