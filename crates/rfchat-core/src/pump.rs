//! # StreamPump：已建立会话的收发泵
//!
//! ## 意图（Why）
//! - 每条已建立的会话恰好对应一个收发泵：后台接收循环持续读取，前台 `write` 直接写出；
//! - 读失败（含对端关闭）时经状态机自愈回到监听。
//!
//! ## 契约（What）
//! - 接收循环每次读取至多 `read_buffer_size` 字节，成功即报告 `MessageReceived`，
//!   不做消息分帧；
//! - `write` 成功报告 `MessageSent`，失败报告 `Failure("Unable to write to device")`，
//!   写失败不改变连接状态；
//! - `cancel` 取消令牌并关闭会话，挂起中的读随之结束；此后的失败报告会被状态机按
//!   工作者标识丢弃。

use std::sync::Arc;

use tracing::Instrument;

use crate::{
    cancel::{Cancellation, run_until_cancelled},
    endpoint::PeerHandle,
    event::{CONNECTION_LOST, ChatEvent, EventQueue, WRITE_FAILED},
    machine::{ConnectionStateMachine, Origin, WorkerId},
    transport::Session,
};

/// 单条会话的收发泵。
pub struct StreamPump {
    id: WorkerId,
    peer: PeerHandle,
    session: Arc<dyn Session>,
    cancel: Cancellation,
    events: EventQueue,
}

impl core::fmt::Debug for StreamPump {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamPump")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StreamPump {
    /// 创建收发泵并立即启动接收循环。
    pub(crate) fn spawn(
        machine: &Arc<ConnectionStateMachine>,
        id: WorkerId,
        session: Arc<dyn Session>,
        peer: PeerHandle,
    ) -> Arc<Self> {
        let pump = Arc::new(Self {
            id,
            peer,
            session,
            cancel: Cancellation::new(),
            events: machine.events().clone(),
        });
        let span = tracing::info_span!("stream_pump", worker = id, peer = %pump.peer);
        let buffer_size = machine.config().read_buffer_size;
        machine.runtime().spawn(
            receive_loop(Arc::clone(machine), Arc::clone(&pump), buffer_size).instrument(span),
        );
        pump
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    /// 会话对端。
    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// 收发泵是否已被退役。
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 写出一段字节并报告结果。
    ///
    /// 收发泵在写入途中被退役时放弃本次写入，不报告事件。
    pub async fn write(&self, bytes: &[u8]) {
        match run_until_cancelled(&self.cancel, self.session.write_all(bytes)).await {
            Some(Ok(())) => self.events.push(ChatEvent::MessageSent(bytes.to_vec())),
            Some(Err(err)) => {
                tracing::warn!(worker = self.id, code = err.code(), %err, "write failed");
                self.events.push(ChatEvent::Failure(WRITE_FAILED.to_owned()));
            }
            None => tracing::debug!(worker = self.id, "write abandoned: pump retired"),
        }
    }

    /// 退役：取消令牌并关闭会话。幂等。
    pub(crate) fn cancel(&self) {
        if self.cancel.cancel() {
            self.session.close();
        }
    }
}

async fn receive_loop(
    machine: Arc<ConnectionStateMachine>,
    pump: Arc<StreamPump>,
    buffer_size: usize,
) {
    let mut buf = vec![0_u8; buffer_size];
    loop {
        match run_until_cancelled(&pump.cancel, pump.session.read(&mut buf)).await {
            Some(Ok(0)) => {
                tracing::info!("peer closed the session");
                break;
            }
            Some(Ok(len)) => pump
                .events
                .push(ChatEvent::MessageReceived(buf[..len].to_vec())),
            Some(Err(err)) => {
                tracing::warn!(code = err.code(), %err, "read failed");
                break;
            }
            None => {
                tracing::debug!("receive loop interrupted: pump retired");
                break;
            }
        }
    }
    machine.revert_to_listening(Origin::Pump(pump.id), CONNECTION_LOST);
}
