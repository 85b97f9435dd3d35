//! # 事件投递
//!
//! 核心向消费者报告生命周期与数据事件的唯一通道。
//!
//! ## 投递模型
//! - 状态机在互斥区内把事件压入内部无界队列，队列顺序即线性化顺序；
//! - 调度任务在运行时上排空队列并调用 [`EventSink::on_event`]，
//!   因此回调运行在中立上下文中，可以安全地回调 [`ChatService`](crate::ChatService)；
//! - 观察到 `StateChanged(Connected)` 时，会话已安装完毕。

use std::sync::Arc;

use tokio::{runtime::Handle, sync::mpsc};

use crate::state::ConnectionState;

/// 连接建立失败时的提示文案。
pub const CONNECT_FAILED: &str = "Unable to connect device";
/// 已建立会话读失败时的提示文案。
pub const CONNECTION_LOST: &str = "Device connection was lost";
/// 在已连接状态下发起新外连、旧会话被丢弃时的提示文案。
pub const CONNECTION_CLOSED: &str = "Device connection was closed";
/// 写入失败时的提示文案。
pub const WRITE_FAILED: &str = "Unable to write to device";

/// 核心发往消费者的事件。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChatEvent {
    /// 状态发生跃迁。
    StateChanged(ConnectionState),
    /// 与对端建立会话，携带展示名。
    PeerConnected(String),
    /// 收到一段字节。
    MessageReceived(Vec<u8>),
    /// 一段字节已完整写入传输。
    MessageSent(Vec<u8>),
    /// 人类可读的失败原因，通常呈现为一次性提示。
    Failure(String),
}

/// 消费者实现的事件接收端。
///
/// 回调可能来自运行时的任意工作线程，实现方需自行保证线程安全。
pub trait EventSink: Send + Sync + 'static {
    /// 处理单个事件。
    fn on_event(&self, event: ChatEvent);
}

impl<F> EventSink for F
where
    F: Fn(ChatEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: ChatEvent) {
        self(event)
    }
}

/// 将事件转发到 Tokio 无界通道的接收端。
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl ChannelSink {
    /// 创建接收端与配对的事件流。
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped; discarding event");
        }
    }
}

/// 丢弃所有事件的接收端。
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: ChatEvent) {}
}

/// 状态机内部使用的事件队列。
#[derive(Clone, Debug)]
pub(crate) struct EventQueue {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl EventQueue {
    /// 启动调度任务并返回队列写端。
    ///
    /// 所有写端被丢弃后，调度任务在排空剩余事件后退出。
    pub(crate) fn spawn(runtime: &Handle, sink: Arc<dyn EventSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.on_event(event);
            }
        });
        Self { tx }
    }

    pub(crate) fn push(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dispatcher stopped; discarding event");
        }
    }
}
