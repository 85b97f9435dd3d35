#![doc = r#"
# rfchat-transport-tcp

## 设计动机（Why）
- **定位**：在没有蓝牙硬件的环境中，以 TCP 模拟 RFCOMM 服务记录，
  让 `rfchat-core` 的状态机在真实套接字上运行；
- **架构角色**：实现 [`rfchat_core::RfcommTransport`] 契约，供 `rfchat-cli`
  与端到端测试使用。

## 核心契约（What）
- 监听端绑定 [`TcpTransportConfig::listen_addr`]，对每条入站连接执行握手：
  读取对端问候帧 `uuid(16) | name_len(u8) | name`，标识不匹配即丢弃套接字并继续接受；
- 外连端发送问候帧并等待对端回礼，回礼缺失或标识不符时以
  [`TransportError::Rejected`](rfchat_core::TransportError::Rejected) 失败；
- 握手受 [`TcpTransportConfig::handshake_timeout`] 约束。

## 实现策略（How）
- 完全依赖 Tokio 的 `TcpListener` 与 `TcpStream`；会话拆分读写半部，各自以
  `tokio::sync::Mutex` 保护，读与写可并发进行；
- `close()` 通过取消令牌中断挂起的 IO，套接字在最后一个引用释放时关闭。

## 风险与考量（Trade-offs）
- 握手在接受循环内串行执行，慢速对端会延后后续连接的接受，上限为握手超时；
- 对端地址即 `host:port` 文本，不做设备发现。
"#]

mod error;
mod handshake;
mod listener;
mod session;
mod transport;

pub use handshake::{Hello, HandshakeError};
pub use listener::TcpServiceListener;
pub use session::TcpSession;
pub use transport::{TcpRfcommTransport, TcpTransportConfig};
