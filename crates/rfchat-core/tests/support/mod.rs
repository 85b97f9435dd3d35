//! 集成测试共享的等待与断言工具。

#![allow(dead_code)]

use std::time::Duration;

use rfchat_core::{ChannelSink, ChatEvent, ChatService, memory::MemoryTransport};
use tokio::sync::mpsc::UnboundedReceiver;

/// 单个事件的等待上限；超过即视为死锁或事件缺失。
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// 判定“没有更多事件”前的静默观察窗口。
pub const QUIET_WINDOW: Duration = Duration::from_millis(100);

/// 以内存传输构造服务，返回服务与事件流。
pub fn memory_service(transport: &MemoryTransport) -> (ChatService, UnboundedReceiver<ChatEvent>) {
    let (sink, events) = ChannelSink::new();
    let service = ChatService::builder(transport.clone())
        .sink(sink)
        .build()
        .expect("测试运行时内应能构造服务");
    (service, events)
}

/// 等待下一个事件。
pub async fn next_event(events: &mut UnboundedReceiver<ChatEvent>) -> ChatEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("等待事件超时")
        .expect("事件流不应提前结束")
}

/// 断言接下来依次收到 `expected` 中的事件。
pub async fn expect_events(events: &mut UnboundedReceiver<ChatEvent>, expected: &[ChatEvent]) {
    for (index, wanted) in expected.iter().enumerate() {
        let got = next_event(events).await;
        assert_eq!(&got, wanted, "第 {index} 个事件不符");
    }
}

/// 断言静默窗口内没有任何事件。
pub async fn assert_quiet(events: &mut UnboundedReceiver<ChatEvent>) {
    tokio::time::sleep(QUIET_WINDOW).await;
    if let Ok(event) = events.try_recv() {
        panic!("不应产生事件，却收到 {event:?}");
    }
}

/// 轮询直到 `check` 成立。
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("等待条件超时：{what}"));
}
