#![deny(unsafe_code)]
#![doc = "rfchat-core: 点对点 RFCOMM 聊天的连接生命周期核心。"]
#![doc = ""]
#![doc = "== 组成 =="]
#![doc = "- [`ChatService`]：外部唯一入口，提供 `start`/`connect`/`write`/`stop`/`current_state`。"]
#![doc = "- [`ConnectionStateMachine`]：持有唯一权威的 [`ConnectionState`] 与各工作者句柄，所有跃迁在同一互斥区内完成。"]
#![doc = "- 三类工作者：监听（`listener`）、外连（`connector`）与已建立会话的收发泵（[`StreamPump`]）。"]
#![doc = "- [`transport`]：对无线传输的抽象契约；[`memory`] 提供进程内实现，供测试与演示使用。"]
#![doc = ""]
#![doc = "== 单连接不变式 =="]
#![doc = "任一时刻至多存在一个处于 `Connected` 的会话；被退役工作者的迟到结果通过工作者标识校验被丢弃。"]

pub mod cancel;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod machine;
pub mod memory;
pub mod pump;
pub mod service;
pub mod state;
pub mod transport;

mod connector;
mod listener;

pub use cancel::{Cancellation, run_until_cancelled};
pub use config::ChatConfig;
pub use endpoint::{PeerHandle, ServiceEndpoint};
pub use error::{ChatError, TransportError, TransportOp};
pub use event::{ChannelSink, ChatEvent, EventSink, NullSink};
pub use machine::ConnectionStateMachine;
pub use pump::StreamPump;
pub use service::{ChatService, ChatServiceBuilder};
pub use state::ConnectionState;
pub use transport::{RfcommTransport, ServiceListener, Session};
