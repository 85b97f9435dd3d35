#![cfg(loom)]

//! 工作者标识校验的 Loom 影子模型。
//!
//! 状态机以“槽位中登记的工作者标识”判定回调是否有效。真实状态机使用
//! `parking_lot` 锁并依赖 tokio 运行时，无法置于 Loom 调度之下；此处以 Loom 原语
//! 重写一份与 `Inner::is_registered`、`promote_to_connected` 同构的影子模型，
//! 校验的是该协议本身，而非生产代码路径。真实路径由 `machine.rs` 的单元测试
//! `session_from_unknown_worker_is_closed` 覆盖。
//!
//! 穷举的交错：
//! - 调用方在互斥区内退役外连工作者并登记新的外连；
//! - 被退役的工作者拿到会话后尝试提升。
//!
//! 断言：无论如何交错，至多一个会话被安装，且被安装者一定是当前登记的工作者。

use loom::{
    model,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

#[derive(Default)]
struct Slots {
    connector: Option<u64>,
    live: Option<u64>,
    discarded: Vec<u64>,
}

struct ShadowMachine {
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

impl ShadowMachine {
    fn new() -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 对应 `connect`：退役当前会话与外连，登记新的外连。
    fn register_connector(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock().expect("锁未中毒");
        if let Some(retired) = slots.live.take() {
            slots.discarded.push(retired);
        }
        slots.connector = Some(id);
        id
    }

    /// 对应 `promote_to_connected`。
    fn promote(&self, origin: u64) -> bool {
        let mut slots = self.slots.lock().expect("锁未中毒");
        if slots.connector != Some(origin) {
            slots.discarded.push(origin);
            return false;
        }
        assert!(slots.live.is_none(), "不得同时存在两个已安装会话");
        slots.connector = None;
        slots.live = Some(origin);
        true
    }
}

#[test]
fn retired_connector_cannot_install_a_session() {
    model(|| {
        let machine = Arc::new(ShadowMachine::new());
        let stale = machine.register_connector();

        let late = {
            let machine = Arc::clone(&machine);
            thread::spawn(move || machine.promote(stale))
        };
        let fresh = machine.register_connector();
        let fresh_promoted = machine.promote(fresh);
        late.join().expect("线程不应 panic");

        let slots = machine.slots.lock().expect("锁未中毒");
        assert!(fresh_promoted, "当前登记的工作者必须能够提升");
        assert_eq!(slots.live, Some(fresh));
        assert_eq!(slots.discarded, vec![stale], "迟到会话必须被丢弃或退役");
    });
}
