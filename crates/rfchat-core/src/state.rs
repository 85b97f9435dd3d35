//! # 连接状态（ConnectionState）
//!
//! ## 状态图
//!
//! ```text
//! Idle        --start()-->            Listening
//! Listening   --connect(peer)-->      Connecting
//! Connecting  --外连成功-->            Connected
//! Connecting  --外连失败-->            Listening
//! Listening   --入站接受-->            Connected
//! Connected   --会话读失败/被替换-->   Listening
//! (任意)      --stop()-->             Idle
//! ```
//!
//! `Connected → Connecting` 不允许直接发生：在已连接状态下发起外连时，
//! 状态机会先经由 `Listening` 丢弃旧会话，再进入 `Connecting`。

use core::fmt;

/// 连接状态机的四个状态，任一时刻恰好取其一。
///
/// # 契约 (What)
/// - 只能由 [`ConnectionStateMachine`](crate::ConnectionStateMachine) 在互斥区内修改；
/// - 合法跃迁由 [`ConnectionState::can_transition_to`] 判定，同态跃迁不视为跃迁。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    /// 无任何工作者运行；初始状态。
    #[default]
    Idle,
    /// 监听工作者正在等待入站连接。
    Listening,
    /// 外连工作者正在尝试连接指定对端。
    Connecting,
    /// 收发泵持有一个存活会话。
    Connected,
}

impl ConnectionState {
    /// 判断是否允许从 `self` 跃迁至 `target`。
    ///
    /// 通过匹配 `(self, target)` 元组实现状态表，与模块文档中的状态图一一对应。
    pub fn can_transition_to(self, target: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Idle, Listening)
                | (Listening, Connecting)
                | (Listening, Connected)
                | (Connecting, Connected)
                | (Connecting, Listening)
                | (Connected, Listening)
                | (Listening, Idle)
                | (Connecting, Idle)
                | (Connected, Idle)
        )
    }

    /// 是否已持有存活会话。
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::{self, *};

    const ALL: [ConnectionState; 4] = [Idle, Listening, Connecting, Connected];

    #[test]
    fn connected_never_jumps_to_connecting() {
        assert!(!Connected.can_transition_to(Connecting));
    }

    #[test]
    fn every_state_can_stop_except_idle_itself() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Idle), state != Idle, "{state} -> idle");
        }
    }

    #[test]
    fn self_transitions_are_not_table_entries() {
        for state in ALL {
            assert!(!state.can_transition_to(state), "{state} 不应允许自跃迁");
        }
    }

    #[test]
    fn idle_only_leaves_through_start() {
        let targets: Vec<_> = ALL.into_iter().filter(|t| Idle.can_transition_to(*t)).collect();
        assert_eq!(targets, vec![Listening]);
    }
}
