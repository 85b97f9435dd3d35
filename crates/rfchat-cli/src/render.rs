use rfchat_core::{ChatEvent, ConnectionState};

/// 未连接时尝试发送的提示。
pub const NOT_CONNECTED: &str = "You are not connected to a device";

/// 状态在标题栏中的文案。
pub fn state_title(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connecting => "connecting...",
        ConnectionState::Connected => "connected",
        ConnectionState::Listening | ConnectionState::Idle => "not connected",
    }
}

/// 将事件渲染为一行终端输出。
pub fn describe(event: &ChatEvent) -> String {
    match event {
        ChatEvent::StateChanged(state) => format!("-- {}", state_title(*state)),
        ChatEvent::PeerConnected(name) => format!("-- connected to {name}"),
        ChatEvent::MessageReceived(bytes) => format!("peer: {}", String::from_utf8_lossy(bytes)),
        ChatEvent::MessageSent(bytes) => format!("me:   {}", String::from_utf8_lossy(bytes)),
        ChatEvent::Failure(reason) => format!("!! {reason}"),
    }
}
