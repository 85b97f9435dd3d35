//! 端到端回环测试：两个聊天服务经本机 TCP 建连、收发并处理握手失败。

use std::{net::SocketAddr, time::Duration};

use rfchat_core::{
    ChannelSink, ChatConfig, ChatEvent, ChatService, ConnectionState, PeerHandle, ServiceEndpoint,
    event::{CONNECT_FAILED, CONNECTION_LOST},
};
use rfchat_transport_tcp::{TcpRfcommTransport, TcpTransportConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

struct Node {
    transport: TcpRfcommTransport,
    service: ChatService,
    events: UnboundedReceiver<ChatEvent>,
}

fn node(name: &str, endpoint: ServiceEndpoint) -> Node {
    let transport = TcpRfcommTransport::new(
        TcpTransportConfig::default()
            .with_listen_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_device_name(name)
            .with_handshake_timeout(Duration::from_secs(2)),
    );
    let (sink, events) = ChannelSink::new();
    let service = ChatService::builder(transport.clone())
        .config(ChatConfig::default().with_endpoint(endpoint))
        .sink(sink)
        .build()
        .expect("构造服务");
    Node {
        transport,
        service,
        events,
    }
}

impl Node {
    async fn next(&mut self) -> ChatEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("等待事件超时")
            .expect("事件流不应结束")
    }

    async fn expect(&mut self, expected: &[ChatEvent]) {
        for wanted in expected {
            assert_eq!(&self.next().await, wanted);
        }
    }

    async fn start_listening(&mut self) -> SocketAddr {
        self.service.start();
        self.expect(&[ChatEvent::StateChanged(ConnectionState::Listening)])
            .await;
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(addr) = self.transport.local_addr() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("监听应在超时前绑定")
    }
}

/// 获取一个当前没有监听者的本机端口。
fn closed_port() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("绑定探测端口");
    probe.local_addr().expect("读取探测端口")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_services_chat_over_loopback() {
    let mut alice = node("alice", ServiceEndpoint::default());
    let mut bob = node("bob", ServiceEndpoint::default());
    let alice_addr = alice.start_listening().await;
    bob.start_listening().await;

    bob.service.connect(PeerHandle::new(alice_addr.to_string()));
    bob.expect(&[
        ChatEvent::StateChanged(ConnectionState::Connecting),
        ChatEvent::StateChanged(ConnectionState::Connected),
        ChatEvent::PeerConnected("alice".to_owned()),
    ])
    .await;
    alice
        .expect(&[
            ChatEvent::StateChanged(ConnectionState::Connected),
            ChatEvent::PeerConnected("bob".to_owned()),
        ])
        .await;

    bob.service.write(b"hello alice").await;
    bob.expect(&[ChatEvent::MessageSent(b"hello alice".to_vec())])
        .await;
    alice
        .expect(&[ChatEvent::MessageReceived(b"hello alice".to_vec())])
        .await;

    alice.service.write(b"hi bob").await;
    bob.expect(&[ChatEvent::MessageReceived(b"hi bob".to_vec())])
        .await;

    alice.service.stop();
    alice
        .expect(&[
            ChatEvent::MessageSent(b"hi bob".to_vec()),
            ChatEvent::StateChanged(ConnectionState::Idle),
        ])
        .await;
    bob.expect(&[
        ChatEvent::Failure(CONNECTION_LOST.to_owned()),
        ChatEvent::StateChanged(ConnectionState::Listening),
    ])
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mismatched_service_is_rejected() {
    let mut alice = node("alice", ServiceEndpoint::default());
    let mut mallory = node(
        "mallory",
        ServiceEndpoint::new(Uuid::from_u128(0xdead_beef), "OtherChat"),
    );
    let alice_addr = alice.start_listening().await;
    mallory.start_listening().await;

    mallory.service.connect(PeerHandle::new(alice_addr.to_string()));
    mallory
        .expect(&[
            ChatEvent::StateChanged(ConnectionState::Connecting),
            ChatEvent::Failure(CONNECT_FAILED.to_owned()),
            ChatEvent::StateChanged(ConnectionState::Listening),
        ])
        .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alice.events.try_recv().is_err(), "监听端不应报告握手失败");
    assert_eq!(alice.service.current_state(), ConnectionState::Listening);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_reports_failure() {
    let mut bob = node("bob", ServiceEndpoint::default());
    bob.start_listening().await;

    bob.service.connect(PeerHandle::new(closed_port().to_string()));
    bob.expect(&[
        ChatEvent::StateChanged(ConnectionState::Connecting),
        ChatEvent::Failure(CONNECT_FAILED.to_owned()),
        ChatEvent::StateChanged(ConnectionState::Listening),
    ])
    .await;
}
