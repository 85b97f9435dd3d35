use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use rfchat_core::ChatConfig;
use rfchat_transport_tcp::TcpTransportConfig;

/// 点对点聊天终端。
#[derive(Debug, Parser)]
#[command(name = "rfchat", version, about)]
pub struct Args {
    /// 本机监听地址。
    #[arg(long, default_value = "127.0.0.1:7070")]
    pub listen: SocketAddr,

    /// 报告给对端的设备名。
    #[arg(long, default_value = "rfchat")]
    pub name: String,

    /// 启动后立即连接的对端地址（host:port）。
    #[arg(long, value_name = "ADDR")]
    pub connect: Option<String>,

    /// TOML 配置文件（服务端点、读缓冲大小）。
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 握手超时（秒）。
    #[arg(long, default_value_t = 5)]
    pub handshake_timeout: u64,
}

impl Args {
    /// 读取并校验配置文件；未指定时使用默认配置。
    pub fn chat_config(&self) -> anyhow::Result<ChatConfig> {
        let Some(path) = &self.config else {
            return Ok(ChatConfig::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        ChatConfig::from_toml_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn transport_config(&self) -> TcpTransportConfig {
        TcpTransportConfig::default()
            .with_listen_addr(self.listen)
            .with_device_name(self.name.clone())
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout))
    }
}
