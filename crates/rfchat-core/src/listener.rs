//! # 监听工作者
//!
//! 绑定服务端点后循环接受入站连接：
//! - 首个被状态机接纳的会话结束本工作者（单连接策略下监听随之退役）；
//! - 状态机拒绝的会话被关闭，循环继续；
//! - 绑定或接受失败只记录日志并从状态机注销，不产生事件，监听保持失效直到下一次
//!   `start()` 或自愈。

use std::sync::Arc;

use tracing::Instrument;

use crate::{
    cancel::{Cancellation, run_until_cancelled},
    machine::{ConnectionStateMachine, Origin, Promotion, WorkerId},
};

pub(crate) struct ListenerWorker;

impl ListenerWorker {
    pub(crate) fn spawn(machine: Arc<ConnectionStateMachine>, id: WorkerId, cancel: Cancellation) {
        let span = tracing::info_span!("listener", worker = id, service = %machine.endpoint());
        let runtime = machine.runtime().clone();
        runtime.spawn(run(machine, id, cancel).instrument(span));
    }
}

async fn run(machine: Arc<ConnectionStateMachine>, id: WorkerId, cancel: Cancellation) {
    let transport = Arc::clone(machine.transport());
    let endpoint = machine.endpoint().clone();

    let listener = match run_until_cancelled(&cancel, transport.listen(&endpoint)).await {
        Some(Ok(listener)) => listener,
        Some(Err(err)) => {
            tracing::warn!(code = err.code(), %err, "listen failed");
            machine.listener_exited(id);
            return;
        }
        None => return,
    };
    tracing::debug!("listening");

    loop {
        let (session, peer) = match run_until_cancelled(&cancel, listener.accept()).await {
            Some(Ok(accepted)) => accepted,
            Some(Err(err)) => {
                tracing::warn!(code = err.code(), %err, "accept failed");
                machine.listener_exited(id);
                break;
            }
            None => {
                tracing::debug!("listener retired");
                break;
            }
        };
        match machine.promote_to_connected(Origin::Listener(id), session, peer) {
            // 提升与 stop 总会先退役监听，正常流程下不会走到这里。
            Promotion::Rejected => continue,
            Promotion::Promoted | Promotion::Retired => break,
        }
    }
    listener.close();
}
