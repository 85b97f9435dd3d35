//! # ChatService：面向 UI 的控制门面
//!
//! ## 意图（Why）
//! - 为界面层提供 `start` / `connect` / `write` / `stop` / `current_state` 五个操作；
//! - 控制操作从不向调用方返回运行期错误：失败一律经由 [`ChatEvent::Failure`](crate::ChatEvent)
//!   异步报告，调用方只需订阅事件。
//!
//! ## 构造（How）
//! ```no_run
//! # async fn demo() -> Result<(), rfchat_core::ChatError> {
//! use rfchat_core::{ChannelSink, ChatService, PeerHandle, memory::MemoryTransport};
//!
//! let (sink, mut events) = ChannelSink::new();
//! let service = ChatService::builder(MemoryTransport::new()).sink(sink).build()?;
//! service.start();
//! service.connect(PeerHandle::new("00:11:22:33:44:55"));
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 注意事项
//! - 构造时需处于 Tokio 运行时上下文中，或通过 [`ChatServiceBuilder::runtime`] 显式指定；
//! - 服务被丢弃时自动执行 `stop()`。

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    config::ChatConfig,
    endpoint::{PeerHandle, ServiceEndpoint},
    error::ChatError,
    event::{EventSink, NullSink},
    machine::ConnectionStateMachine,
    state::ConnectionState,
    transport::RfcommTransport,
};

/// [`ChatService`] 的构建器。
pub struct ChatServiceBuilder {
    transport: Arc<dyn RfcommTransport>,
    config: ChatConfig,
    sink: Option<Arc<dyn EventSink>>,
    runtime: Option<Handle>,
}

impl ChatServiceBuilder {
    /// 替换配置，默认使用 [`ChatConfig::default`]。
    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置事件接收端；未设置时事件被丢弃。
    pub fn sink<S: EventSink>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// 设置共享的事件接收端。
    pub fn shared_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 指定承载工作者的运行时。
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 校验配置并构造服务，初始状态为 `Idle`。
    pub fn build(self) -> Result<ChatService, ChatError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let machine = ConnectionStateMachine::new(self.transport, self.config, sink, runtime);
        tracing::debug!(endpoint = %machine.endpoint(), "chat service created");
        Ok(ChatService { machine })
    }
}

/// 单连接聊天服务。
#[derive(Debug)]
pub struct ChatService {
    pub(crate) machine: Arc<ConnectionStateMachine>,
}

impl ChatService {
    /// 以给定传输开始构建服务。
    pub fn builder<T: RfcommTransport>(transport: T) -> ChatServiceBuilder {
        Self::builder_shared(Arc::new(transport))
    }

    /// 以共享传输开始构建服务。
    pub fn builder_shared(transport: Arc<dyn RfcommTransport>) -> ChatServiceBuilder {
        ChatServiceBuilder {
            transport,
            config: ChatConfig::default(),
            sink: None,
            runtime: None,
        }
    }

    /// 以默认配置和给定接收端构造服务。
    pub fn new<T, S>(transport: T, sink: S) -> Result<Self, ChatError>
    where
        T: RfcommTransport,
        S: EventSink,
    {
        Self::builder(transport).sink(sink).build()
    }

    /// 开始监听入站连接。非 `Idle` 时不产生状态事件。
    pub fn start(&self) {
        self.machine.start();
    }

    /// 向对端发起连接；已连接时先丢弃当前会话。
    pub fn connect(&self, peer: PeerHandle) {
        self.machine.connect(peer);
    }

    /// 向已连接的对端写入字节；未连接时静默丢弃。
    pub async fn write(&self, bytes: &[u8]) {
        match self.machine.active_pump() {
            Some(pump) => pump.write(bytes).await,
            None => tracing::trace!(len = bytes.len(), "write dropped: not connected"),
        }
    }

    /// 停止全部工作者并回到 `Idle`。
    pub fn stop(&self) {
        self.machine.stop();
    }

    /// 当前连接状态。
    pub fn current_state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// 本服务使用的服务端点。
    pub fn endpoint(&self) -> &ServiceEndpoint {
        self.machine.endpoint()
    }

    /// 底层状态机的只读视图。
    pub fn state_machine(&self) -> &ConnectionStateMachine {
        &self.machine
    }
}

impl Drop for ChatService {
    fn drop(&mut self) {
        self.machine.stop();
    }
}
