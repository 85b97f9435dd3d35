//! 取消原语与“可取消的阻塞点”包装。
//!
//! 工作者的每个阻塞点（accept / connect / read / write）都通过
//! [`run_until_cancelled`] 执行：句柄被退役时，挂起中的 IO 立即返回，
//! 即使底层传输在 `close()` 后无法自行解除阻塞。

use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::Notify;

/// 可克隆的共享取消令牌。
///
/// # 契约 (What)
/// - 所有克隆共享同一原子位；
/// - [`cancel`](Self::cancel) 仅在首次调用时返回 `true`，重复取消是幂等的；
/// - [`cancelled`](Self::cancelled) 在取消后立即完成，取消前挂起且不轮询。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 标记取消并唤醒所有等待者。
    ///
    /// 返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// 等待取消发生。
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // 先登记等待者再检查标志，避免错过 `notify_waiters`。
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// 在 `cancel` 触发前驱动 `future`。
///
/// - 返回 `Some(output)`：`future` 先完成；
/// - 返回 `None`：令牌已取消，`future` 被丢弃。
///
/// 取消分支优先（`biased`），已退役工作者即便同时拿到 IO 结果也按取消处理。
pub async fn run_until_cancelled<F>(cancel: &Cancellation, future: F) -> Option<F::Output>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::time::Duration;

    #[test]
    fn cancel_is_idempotent_across_clones() {
        let root = Cancellation::new();
        let child = root.clone();
        assert!(child.cancel(), "首次取消必须成功");
        assert!(root.is_cancelled());
        assert!(!root.cancel(), "重复取消应返回 false");
    }

    #[tokio::test]
    async fn pending_io_is_released_by_cancel() {
        let cancel = Cancellation::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { run_until_cancelled(&cancel, pending::<()>()).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("取消后等待者必须在超时前返回")
            .expect("任务不应 panic");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn completed_future_wins_when_not_cancelled() {
        let cancel = Cancellation::new();
        assert_eq!(run_until_cancelled(&cancel, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_future() {
        let cancel = Cancellation::new();
        cancel.cancel();
        assert_eq!(run_until_cancelled(&cancel, async { 7 }).await, None);
    }
}
