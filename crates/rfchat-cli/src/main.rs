//! rfchat：命令行聊天终端。
//!
//! 启动即监听；`--connect` 或 `/connect <addr>` 发起外连。事件打印到 stdout，日志打印到 stderr。

mod args;
mod command;
mod logging;
mod render;

use anyhow::Context;
use clap::Parser;
use rfchat_core::{ChannelSink, ChatService, ConnectionState, PeerHandle};
use rfchat_transport_tcp::TcpRfcommTransport;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    args::Args,
    command::Command,
    render::{NOT_CONNECTED, describe, state_title},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::install()?;
    let args = Args::parse();
    let config = args.chat_config()?;

    let transport = TcpRfcommTransport::new(args.transport_config());
    let (sink, mut events) = ChannelSink::new();
    let service = ChatService::builder(transport)
        .config(config)
        .sink(sink)
        .build()
        .context("failed to create chat service")?;
    tracing::info!(listen = %args.listen, service = %service.endpoint(), "rfchat starting");

    service.start();
    if let Some(address) = &args.connect {
        service.connect(PeerHandle::new(address.as_str()));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{}", describe(&event)),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(&service, command).await,
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }

    service.stop();
    Ok(())
}

async fn execute(service: &ChatService, command: Command) {
    match command {
        Command::Send(text) => {
            if service.current_state() != ConnectionState::Connected {
                println!("{NOT_CONNECTED}");
                return;
            }
            service.write(text.as_bytes()).await;
        }
        Command::Connect(address) => service.connect(PeerHandle::new(address)),
        Command::Start => service.start(),
        Command::Stop => service.stop(),
        Command::State => println!("-- {}", state_title(service.current_state())),
        Command::Quit | Command::Skip => {}
    }
}
