//! # 进程内传输
//!
//! [`MemoryTransport`] 在内存中模拟监听、入站拨入与外连，供测试与演示使用。
//! 测试侧通过 [`MemoryRemote`] 扮演对端：注入数据、制造读失败、挂断、检查写出内容。
//!
//! ## 可模拟的情形
//! - 绑定失败：[`MemoryTransport::fail_next_listen`]；
//! - 接受失败：[`MemoryTransport::fail_accept`]；
//! - 入站连接：[`MemoryTransport::dial_in`]；
//! - 外连结果：[`MemoryTransport::accept_connections_to`] / [`MemoryTransport::stall_connections_to`]，
//!   未登记的地址返回 [`TransportError::Unreachable`]。

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    endpoint::{PeerHandle, ServiceEndpoint},
    error::{TransportError, TransportOp},
    transport::{RfcommTransport, ServiceListener, Session},
};

/// 受 `Notify` 保护的共享状态，任何修改都会唤醒等待者。
#[derive(Debug, Default)]
struct Watched<S> {
    state: Mutex<S>,
    changed: Notify,
}

impl<S> Watched<S> {
    fn update<R>(&self, apply: impl FnOnce(&mut S) -> R) -> R {
        let result = apply(&mut self.state.lock());
        self.changed.notify_waiters();
        result
    }

    fn read<R>(&self, inspect: impl FnOnce(&S) -> R) -> R {
        inspect(&self.state.lock())
    }

    async fn wait_for<R>(&self, mut poll: impl FnMut(&mut S) -> Option<R>) -> R {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let ready = poll(&mut self.state.lock());
            if let Some(value) = ready {
                self.changed.notify_waiters();
                return value;
            }
            notified.await;
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Route {
    Accept,
    Stall,
}

#[derive(Debug, Default)]
struct TransportState {
    listen_calls: usize,
    listen_failures: usize,
    listeners: Vec<Arc<Watched<QueueState>>>,
    routes: HashMap<String, Route>,
    outbound: VecDeque<MemoryRemote>,
    connect_attempts: Vec<String>,
    discovery_cancels: usize,
}

impl TransportState {
    fn active_listener(&self) -> Option<&Arc<Watched<QueueState>>> {
        self.listeners
            .iter()
            .rev()
            .find(|queue| !queue.read(|state| state.closed))
    }
}

/// 内存传输；克隆共享同一状态。
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    shared: Arc<Watched<TransportState>>,
}

impl MemoryTransport {
    /// 创建空传输：无路由、无失败注入。
    pub fn new() -> Self {
        Self::default()
    }

    /// 令接下来 `count` 次 `listen` 以绑定失败返回。
    pub fn fail_next_listen(&self, count: usize) {
        self.shared.update(|state| state.listen_failures += count);
    }

    /// 令当前活动监听的下一次 `accept` 失败。没有活动监听时返回 `false`。
    pub fn fail_accept(&self) -> bool {
        let queue = self.shared.read(|state| state.active_listener().cloned());
        match queue {
            Some(queue) => {
                queue.update(|state| state.fail_next = true);
                true
            }
            None => false,
        }
    }

    /// 以 `peer` 身份拨入当前活动监听，返回对端句柄。没有活动监听时返回 `None`。
    pub fn dial_in(&self, peer: PeerHandle) -> Option<MemoryRemote> {
        let queue = self.shared.read(|state| state.active_listener().cloned())?;
        let (session, remote) = memory_pair();
        queue.update(|state| state.pending.push_back((session, peer)));
        Some(remote)
    }

    /// 到 `address` 的外连立即成功；对端句柄经 [`next_outbound`](Self::next_outbound) 取得。
    pub fn accept_connections_to(&self, address: impl Into<String>) {
        self.shared
            .update(|state| state.routes.insert(address.into(), Route::Accept));
    }

    /// 到 `address` 的外连永久挂起，直到连接工作者被退役。
    pub fn stall_connections_to(&self, address: impl Into<String>) {
        self.shared
            .update(|state| state.routes.insert(address.into(), Route::Stall));
    }

    /// 等待下一条成功建立的外连，返回对端句柄。
    pub async fn next_outbound(&self) -> MemoryRemote {
        self.shared.wait_for(|state| state.outbound.pop_front()).await
    }

    /// 等待 `listen` 被调用至少 `count` 次（含失败的调用）。
    pub async fn wait_for_listen_calls(&self, count: usize) {
        self.shared
            .wait_for(|state| (state.listen_calls >= count).then_some(()))
            .await;
    }

    /// 等待出现未关闭的监听句柄。
    pub async fn wait_for_active_listener(&self) {
        self.shared
            .wait_for(|state| state.active_listener().map(|_| ()))
            .await;
    }

    /// 等待到 `address` 的外连尝试至少 `count` 次。
    pub async fn wait_for_connect_attempts(&self, address: &str, count: usize) {
        self.shared
            .wait_for(|state| {
                let seen = state
                    .connect_attempts
                    .iter()
                    .filter(|attempt| attempt.as_str() == address)
                    .count();
                (seen >= count).then_some(())
            })
            .await;
    }

    /// `listen` 的累计调用次数。
    pub fn listen_calls(&self) -> usize {
        self.shared.read(|state| state.listen_calls)
    }

    /// 未关闭的监听句柄数量。
    pub fn active_listeners(&self) -> usize {
        self.shared.read(|state| {
            state
                .listeners
                .iter()
                .filter(|queue| !queue.read(|queue| queue.closed))
                .count()
        })
    }

    /// `cancel_discovery` 的累计调用次数。
    pub fn discovery_cancels(&self) -> usize {
        self.shared.read(|state| state.discovery_cancels)
    }
}

#[async_trait]
impl RfcommTransport for MemoryTransport {
    async fn listen(
        &self,
        endpoint: &ServiceEndpoint,
    ) -> Result<Box<dyn ServiceListener>, TransportError> {
        self.shared.update(|state| {
            state.listen_calls += 1;
            if state.listen_failures > 0 {
                state.listen_failures -= 1;
                return Err(TransportError::io(
                    TransportOp::Listen,
                    io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("service `{}` already registered", endpoint.name()),
                    ),
                ));
            }
            let queue = Arc::new(Watched::<QueueState>::default());
            state.listeners.push(Arc::clone(&queue));
            Ok(Box::new(MemoryListener { queue }) as Box<dyn ServiceListener>)
        })
    }

    async fn connect(
        &self,
        peer: &PeerHandle,
        _endpoint: &ServiceEndpoint,
    ) -> Result<(Arc<dyn Session>, PeerHandle), TransportError> {
        let route = self.shared.update(|state| {
            state.connect_attempts.push(peer.address().to_owned());
            let route = state.routes.get(peer.address()).copied();
            if route == Some(Route::Accept) {
                let (session, remote) = memory_pair();
                state.outbound.push_back(remote);
                return Ok(Some(session));
            }
            route.map(|_| None).ok_or_else(|| TransportError::Unreachable {
                address: peer.address().to_owned(),
            })
        })?;
        match route {
            Some(session) => Ok((session, peer.clone())),
            None => std::future::pending().await,
        }
    }

    fn cancel_discovery(&self) {
        self.shared.update(|state| state.discovery_cancels += 1);
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<(Arc<dyn Session>, PeerHandle)>,
    fail_next: bool,
    closed: bool,
}

impl core::fmt::Debug for QueueState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueState")
            .field("pending", &self.pending.len())
            .field("fail_next", &self.fail_next)
            .field("closed", &self.closed)
            .finish()
    }
}

#[derive(Debug)]
struct MemoryListener {
    queue: Arc<Watched<QueueState>>,
}

#[async_trait]
impl ServiceListener for MemoryListener {
    async fn accept(&self) -> Result<(Arc<dyn Session>, PeerHandle), TransportError> {
        self.queue
            .wait_for(|state| {
                if state.closed {
                    return Some(Err(TransportError::closed(TransportOp::Accept)));
                }
                if state.fail_next {
                    state.fail_next = false;
                    return Some(Err(TransportError::io(
                        TransportOp::Accept,
                        io::ErrorKind::ConnectionAborted.into(),
                    )));
                }
                state.pending.pop_front().map(Ok)
            })
            .await
    }

    fn close(&self) {
        self.queue.update(|state| {
            state.closed = true;
            for (session, _) in state.pending.drain(..) {
                session.close();
            }
        });
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        ServiceListener::close(self);
    }
}

#[derive(Debug, Default)]
struct LinkState {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    read_failed: bool,
    hung_up: bool,
    write_fails: bool,
    closed: bool,
}

fn memory_pair() -> (Arc<dyn Session>, MemoryRemote) {
    let link = Arc::new(Watched::<LinkState>::default());
    let session = Arc::new(MemorySession {
        link: Arc::clone(&link),
    });
    (session, MemoryRemote { link })
}

/// 内存会话的本地一侧，交给状态机使用。
#[derive(Debug)]
struct MemorySession {
    link: Arc<Watched<LinkState>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let capacity = buf.len();
        let chunk = self
            .link
            .wait_for(|state| {
                if state.closed {
                    return Some(Err(TransportError::closed(TransportOp::Read)));
                }
                if let Some(mut chunk) = state.incoming.pop_front() {
                    if chunk.len() > capacity {
                        let rest = chunk.split_off(capacity);
                        state.incoming.push_front(rest);
                    }
                    return Some(Ok(chunk));
                }
                if state.read_failed {
                    return Some(Err(TransportError::io(
                        TransportOp::Read,
                        io::ErrorKind::ConnectionReset.into(),
                    )));
                }
                state.hung_up.then(|| Ok(Vec::new()))
            })
            .await?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    async fn write_all(&self, buf: &[u8]) -> Result<(), TransportError> {
        self.link.update(|state| {
            if state.closed {
                return Err(TransportError::closed(TransportOp::Write));
            }
            if state.write_fails {
                return Err(TransportError::io(
                    TransportOp::Write,
                    io::ErrorKind::BrokenPipe.into(),
                ));
            }
            state.written.push(buf.to_vec());
            Ok(())
        })
    }

    fn close(&self) {
        self.link.update(|state| state.closed = true);
    }
}

/// 内存会话的对端一侧，由测试持有。
#[derive(Clone, Debug)]
pub struct MemoryRemote {
    link: Arc<Watched<LinkState>>,
}

impl MemoryRemote {
    /// 向本地会话投递一段字节。
    pub fn send(&self, bytes: &[u8]) {
        self.link
            .update(|state| state.incoming.push_back(bytes.to_vec()));
    }

    /// 令本地会话的读取以 IO 错误结束。
    pub fn fail_read(&self) {
        self.link.update(|state| state.read_failed = true);
    }

    /// 对端挂断：本地读取在排空已投递数据后返回 0。
    pub fn hang_up(&self) {
        self.link.update(|state| state.hung_up = true);
    }

    /// 令本地会话此后的写入失败。
    pub fn fail_writes(&self) {
        self.link.update(|state| state.write_fails = true);
    }

    /// 本地会话写出的每一段字节。
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.link.read(|state| state.written.clone())
    }

    /// 本地会话写出的全部字节，按写入顺序拼接。
    pub fn written(&self) -> Vec<u8> {
        self.link.read(|state| state.written.concat())
    }

    /// 本地会话是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.link.read(|state| state.closed)
    }

    /// 等待本地会话关闭。
    pub async fn closed(&self) {
        self.link
            .wait_for(|state| state.closed.then_some(()))
            .await;
    }
}
