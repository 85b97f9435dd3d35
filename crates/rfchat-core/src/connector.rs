//! 外连工作者：停止设备发现后对目标发起单次连接，不重试。

use std::sync::Arc;

use tracing::Instrument;

use crate::{
    cancel::{Cancellation, run_until_cancelled},
    endpoint::PeerHandle,
    event::CONNECT_FAILED,
    machine::{ConnectionStateMachine, Origin, WorkerId},
};

pub(crate) struct OutboundConnector;

impl OutboundConnector {
    pub(crate) fn spawn(
        machine: Arc<ConnectionStateMachine>,
        id: WorkerId,
        cancel: Cancellation,
        peer: PeerHandle,
    ) {
        let span = tracing::info_span!("connector", worker = id, peer = %peer);
        let runtime = machine.runtime().clone();
        runtime.spawn(run(machine, id, cancel, peer).instrument(span));
    }
}

async fn run(
    machine: Arc<ConnectionStateMachine>,
    id: WorkerId,
    cancel: Cancellation,
    peer: PeerHandle,
) {
    let transport = Arc::clone(machine.transport());
    transport.cancel_discovery();

    let endpoint = machine.endpoint().clone();
    match run_until_cancelled(&cancel, transport.connect(&peer, &endpoint)).await {
        Some(Ok((session, remote))) => {
            let outcome = machine.promote_to_connected(Origin::Connector(id), session, remote);
            tracing::debug!(?outcome, "outbound session handed over");
        }
        Some(Err(err)) => {
            tracing::warn!(code = err.code(), %err, "connect attempt failed");
            machine.revert_to_listening(Origin::Connector(id), CONNECT_FAILED);
        }
        None => tracing::debug!("connect attempt abandoned: connector retired"),
    }
}
