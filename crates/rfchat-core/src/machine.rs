//! # ConnectionStateMachine：单连接状态机
//!
//! ## 核心意图（Why）
//! - 持有唯一权威的 [`ConnectionState`] 以及监听、外连、收发泵三个工作者槽位；
//! - 所有跃迁及其副作用（启动/退役工作者、压入事件）都在同一把 `parking_lot::Mutex`
//!   内完成，任何参与者读取状态都不会看到撕裂的中间态。
//!
//! ## 行为契约（What）
//! - `promote_to_connected`：监听或外连成功后调用；退役其余工作者，启动新的收发泵，
//!   跃迁到 `Connected` 并报告 `PeerConnected`；
//! - `revert_to_listening`：外连失败或会话读失败时调用；退役失败者，报告 `Failure`，
//!   跃迁回 `Listening`，并在监听者缺席时重新启动监听（自愈）；
//! - `stop`：退役全部工作者并跃迁到 `Idle`；在 `Idle` 且无工作者时调用不产生任何事件。
//!
//! ## 工作者标识
//! 每个工作者在启动时分配单调递增的 [`WorkerId`]，回调必须携带 [`Origin`]。
//! 槽位中登记的标识与来源不一致时，回调被视为“已退役工作者的迟到结果”并被丢弃；
//! 若携带会话，该会话会被立即关闭。
//!
//! ## 锁纪律
//! 互斥区内只做同步操作：修改槽位、取消令牌、关闭句柄、`spawn` 任务、压入事件队列。
//! 任何阻塞 IO 都在工作者自己的任务中、锁外执行。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::{
    cancel::Cancellation,
    config::ChatConfig,
    connector::OutboundConnector,
    endpoint::{PeerHandle, ServiceEndpoint},
    error::ChatError,
    event::{CONNECTION_CLOSED, ChatEvent, EventQueue, EventSink},
    listener::ListenerWorker,
    pump::StreamPump,
    state::ConnectionState,
    transport::{RfcommTransport, Session},
};

/// 工作者标识，进程内单调递增。
pub(crate) type WorkerId = u64;

/// 回调来源，用于校验工作者是否仍在槽位中。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Origin {
    Listener(WorkerId),
    Connector(WorkerId),
    Pump(WorkerId),
}

/// 入站或外连会话交给状态机后的处理结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Promotion {
    /// 会话已安装，状态跃迁为 `Connected`。
    Promoted,
    /// 当前状态不接受新会话（单连接策略），会话已关闭。
    Rejected,
    /// 来源工作者已被退役，会话已关闭。
    Retired,
}

/// 监听或外连工作者在槽位中的登记信息。
#[derive(Debug)]
struct WorkerSlot {
    id: WorkerId,
    cancel: Cancellation,
}

impl WorkerSlot {
    fn retire(self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    listener: Option<WorkerSlot>,
    connector: Option<WorkerSlot>,
    pump: Option<Arc<StreamPump>>,
}

impl Inner {
    fn is_registered(&self, origin: Origin) -> bool {
        match origin {
            Origin::Listener(id) => self.listener.as_ref().is_some_and(|slot| slot.id == id),
            Origin::Connector(id) => self.connector.as_ref().is_some_and(|slot| slot.id == id),
            Origin::Pump(id) => self.pump.as_ref().is_some_and(|pump| pump.id() == id),
        }
    }

    fn has_workers(&self) -> bool {
        self.listener.is_some() || self.connector.is_some() || self.pump.is_some()
    }

    fn retire_listener(&mut self) {
        if let Some(slot) = self.listener.take() {
            slot.retire();
        }
    }

    fn retire_connector(&mut self) {
        if let Some(slot) = self.connector.take() {
            slot.retire();
        }
    }

    fn retire_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.cancel();
        }
    }

    fn retire_all(&mut self) {
        self.retire_connector();
        self.retire_pump();
        self.retire_listener();
    }
}

/// 单连接状态机，持有状态与工作者句柄。
///
/// 通过 [`ChatService`](crate::ChatService) 构造与驱动；对外只暴露只读查询。
pub struct ConnectionStateMachine {
    inner: Mutex<Inner>,
    next_worker: AtomicU64,
    transport: Arc<dyn RfcommTransport>,
    config: ChatConfig,
    events: EventQueue,
    runtime: Handle,
}

impl core::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.state())
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

impl ConnectionStateMachine {
    pub(crate) fn new(
        transport: Arc<dyn RfcommTransport>,
        config: ChatConfig,
        sink: Arc<dyn EventSink>,
        runtime: Handle,
    ) -> Arc<Self> {
        let events = EventQueue::spawn(&runtime, sink);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            next_worker: AtomicU64::new(1),
            transport,
            config,
            events,
            runtime,
        })
    }

    /// 当前状态；只取锁读取，不等待任何工作者 IO。
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// 监听与外连共用的服务端点。
    pub fn endpoint(&self) -> &ServiceEndpoint {
        &self.config.endpoint
    }

    pub(crate) fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn RfcommTransport> {
        &self.transport
    }

    pub(crate) fn events(&self) -> &EventQueue {
        &self.events
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn next_worker_id(&self) -> WorkerId {
        self.next_worker.fetch_add(1, Ordering::Relaxed)
    }

    /// 替换当前状态并报告 `StateChanged`。
    ///
    /// 同态跃迁不产生事件；状态表之外的跃迁被拒绝且状态保持不变。
    fn transition(&self, inner: &mut Inner, next: ConnectionState) -> Result<(), ChatError> {
        let from = inner.state;
        if from == next {
            return Ok(());
        }
        if !from.can_transition_to(next) {
            return Err(ChatError::InvalidTransition { from, to: next });
        }
        inner.state = next;
        tracing::debug!(%from, to = %next, "connection state changed");
        self.events.push(ChatEvent::StateChanged(next));
        Ok(())
    }

    fn commit(&self, inner: &mut Inner, next: ConnectionState) {
        if let Err(err) = self.transition(inner, next) {
            tracing::error!(%err, "state machine invariant violated");
        }
    }

    fn spawn_listener(self: &Arc<Self>, inner: &mut Inner) {
        let id = self.next_worker_id();
        let cancel = Cancellation::new();
        ListenerWorker::spawn(Arc::clone(self), id, cancel.clone());
        inner.listener = Some(WorkerSlot { id, cancel });
    }

    fn spawn_connector(self: &Arc<Self>, inner: &mut Inner, peer: PeerHandle) {
        let id = self.next_worker_id();
        let cancel = Cancellation::new();
        OutboundConnector::spawn(Arc::clone(self), id, cancel.clone(), peer);
        inner.connector = Some(WorkerSlot { id, cancel });
    }

    /// `Idle → Listening`，启动监听工作者。
    ///
    /// 非 `Idle` 时不改变状态、不产生事件；唯一例外是监听者因绑定/接受失败已经退出，
    /// 此时在 `Listening`/`Connecting` 下重新启动监听。
    pub(crate) fn start(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ConnectionState::Idle => {
                self.spawn_listener(&mut inner);
                self.commit(&mut inner, ConnectionState::Listening);
            }
            ConnectionState::Listening | ConnectionState::Connecting
                if inner.listener.is_none() =>
            {
                tracing::info!("restarting inert listener");
                self.spawn_listener(&mut inner);
            }
            _ => tracing::debug!(%state, "start ignored: service already running"),
        }
    }

    /// 向 `peer` 发起外连，跃迁到 `Connecting`。
    ///
    /// - `Connected`：先丢弃旧会话（`Failure` → `StateChanged(Listening)`），再进入 `Connecting`；
    /// - `Connecting`：退役进行中的外连并以新目标重试，状态保持不变；
    /// - `Idle`：服务尚未启动，忽略。
    pub(crate) fn connect(self: &Arc<Self>, peer: PeerHandle) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ConnectionState::Idle => {
                tracing::warn!(%peer, "connect ignored: service not started");
                return;
            }
            ConnectionState::Connected => {
                self.revert_locked(&mut inner, CONNECTION_CLOSED);
            }
            ConnectionState::Connecting => inner.retire_connector(),
            ConnectionState::Listening => {}
        }
        tracing::info!(%peer, "connecting");
        self.spawn_connector(&mut inner, peer);
        self.commit(&mut inner, ConnectionState::Connecting);
    }

    /// 安装一个新建立的会话。
    ///
    /// 来源已退役或状态为 `Idle`/`Connected` 时，会话被立即关闭。
    pub(crate) fn promote_to_connected(
        self: &Arc<Self>,
        origin: Origin,
        session: Arc<dyn Session>,
        peer: PeerHandle,
    ) -> Promotion {
        let mut inner = self.inner.lock();
        if !inner.is_registered(origin) {
            tracing::debug!(?origin, %peer, "discarding session from retired worker");
            session.close();
            return Promotion::Retired;
        }
        if !matches!(
            inner.state,
            ConnectionState::Listening | ConnectionState::Connecting
        ) {
            tracing::debug!(state = %inner.state, %peer, "rejecting extra session");
            session.close();
            return Promotion::Rejected;
        }

        inner.retire_all();
        self.commit(&mut inner, ConnectionState::Connected);
        tracing::info!(%peer, "peer connected");
        self.events
            .push(ChatEvent::PeerConnected(peer.display_name().to_owned()));
        // 接收循环必须在 Connected/PeerConnected 入队之后启动。
        let pump = StreamPump::spawn(self, self.next_worker_id(), session, peer);
        inner.pump = Some(pump);
        Promotion::Promoted
    }

    /// 外连失败或会话丢失后回到监听（自愈）。
    ///
    /// 来自已退役工作者的报告被忽略。
    pub(crate) fn revert_to_listening(self: &Arc<Self>, origin: Origin, reason: &str) {
        let mut inner = self.inner.lock();
        if !inner.is_registered(origin) {
            tracing::debug!(?origin, reason, "ignoring failure from retired worker");
            return;
        }
        self.revert_locked(&mut inner, reason);
    }

    fn revert_locked(self: &Arc<Self>, inner: &mut Inner, reason: &str) {
        inner.retire_connector();
        inner.retire_pump();
        self.events.push(ChatEvent::Failure(reason.to_owned()));
        if inner.listener.is_none() {
            self.spawn_listener(inner);
        }
        self.commit(inner, ConnectionState::Listening);
    }

    /// 监听工作者因绑定或接受失败而退出。
    ///
    /// 不报告事件、不改变状态：监听保持失效，直到 `start()` 或下一次自愈重新启动它。
    pub(crate) fn listener_exited(&self, id: WorkerId) {
        let mut inner = self.inner.lock();
        if inner.is_registered(Origin::Listener(id)) {
            inner.listener = None;
            tracing::warn!(worker = id, "listener stopped; call start() to listen again");
        }
    }

    /// 退役全部工作者并回到 `Idle`。
    pub(crate) fn stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Idle && !inner.has_workers() {
            return;
        }
        inner.retire_all();
        self.commit(&mut inner, ConnectionState::Idle);
    }

    /// 已连接时返回当前收发泵。
    pub(crate) fn active_pump(&self) -> Option<Arc<StreamPump>> {
        let inner = self.inner.lock();
        if inner.state.is_connected() {
            inner.pump.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::ChannelSink, memory::MemoryTransport, service::ChatService};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn drain_until(events: &mut UnboundedReceiver<ChatEvent>, wanted: ChatEvent) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = events.recv().await {
                if event == wanted {
                    return;
                }
            }
        })
        .await
        .expect("事件应在超时前到达");
    }

    #[tokio::test]
    async fn session_from_unknown_worker_is_closed() {
        let transport = MemoryTransport::new();
        let (sink, mut events) = ChannelSink::new();
        let service = ChatService::builder(transport.clone())
            .sink(sink)
            .build()
            .expect("构造服务");
        service.start();
        drain_until(
            &mut events,
            ChatEvent::StateChanged(ConnectionState::Listening),
        )
        .await;

        let machine = Arc::clone(&service.machine);
        let (session, remote) = {
            transport.accept_connections_to("stale");
            let (session, _) = transport
                .connect(&PeerHandle::new("stale"), machine.endpoint())
                .await
                .expect("登记地址应可连接");
            (session, transport.next_outbound().await)
        };
        let outcome = machine.promote_to_connected(
            Origin::Connector(u64::MAX),
            session,
            PeerHandle::new("stale"),
        );

        assert_eq!(outcome, Promotion::Retired);
        assert!(remote.is_closed(), "迟到会话必须被关闭");
        assert_eq!(machine.state(), ConnectionState::Listening);
    }

    #[tokio::test]
    async fn failure_from_unknown_pump_is_ignored() {
        let (sink, mut events) = ChannelSink::new();
        let service = ChatService::builder(MemoryTransport::new())
            .sink(sink)
            .build()
            .expect("构造服务");
        service.start();
        drain_until(
            &mut events,
            ChatEvent::StateChanged(ConnectionState::Listening),
        )
        .await;

        service
            .machine
            .revert_to_listening(Origin::Pump(u64::MAX), CONNECTION_CLOSED);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err(), "不应产生任何事件");
    }

    #[tokio::test]
    async fn illegal_transition_is_refused_without_event() {
        let (sink, mut events) = ChannelSink::new();
        let service = ChatService::builder(MemoryTransport::new())
            .sink(sink)
            .build()
            .expect("构造服务");
        let machine = &service.machine;
        let err = {
            let mut inner = machine.inner.lock();
            machine
                .transition(&mut inner, ConnectionState::Connected)
                .unwrap_err()
        };
        assert!(matches!(
            err,
            ChatError::InvalidTransition {
                from: ConnectionState::Idle,
                to: ConnectionState::Connected
            }
        ));
        assert_eq!(machine.state(), ConnectionState::Idle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }
}
