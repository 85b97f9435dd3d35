use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

/// 安装全局 Subscriber：`fmt` 输出到 stderr，`RUST_LOG` 缺省时为 `info`。
///
/// 聊天内容走 stdout，日志与之分流，便于重定向。
pub fn install() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
