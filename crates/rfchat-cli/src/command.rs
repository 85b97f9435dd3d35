//! 终端输入行的解析。
//!
//! 以 `/` 开头的行是控制命令，其余非空行作为消息原样发送。

use thiserror::Error;

/// 一行输入对应的动作。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// 发送消息。
    Send(String),
    /// `/connect <addr>`
    Connect(String),
    /// `/start`
    Start,
    /// `/stop`
    Stop,
    /// `/state`
    State,
    /// `/quit`
    Quit,
    /// 空行，不做任何事。
    Skip,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    #[error("usage: /connect <host:port>")]
    MissingAddress,
    #[error("unknown command `{0}`; try /connect, /start, /stop, /state or /quit")]
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Command::Skip);
        }
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Ok(Command::Send(line.to_owned()));
        };

        let mut parts = rest.split_whitespace();
        match parts.next().unwrap_or_default() {
            "connect" => parts
                .next()
                .map(|addr| Command::Connect(addr.to_owned()))
                .ok_or(CommandError::MissingAddress),
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "state" => Ok(Command::State),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_owned())),
        }
    }
}
