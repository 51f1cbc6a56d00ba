//! 协作式终止令牌
//!
//! 全局可变终止标志 + 条件变量的显式替代：令牌被传入等待调用、
//! 只在设计好的挂起点（同步网格等待）检查，不依赖信号就能测试。
//! 协议内部的轮询/退避 sleep 刻意不可中断：在途的硬件命令必须完成。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 可克隆的取消令牌
///
/// `cancel()` 置位并唤醒所有等待者；`wait_for()` 在超时内睡眠，
/// 被取消时立即返回 `true`。
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 置位终止标志并唤醒所有等待者（信号处理器中调用）
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// 可中断等待
    ///
    /// 返回 `true` 表示已取消（等待被中止或进入时已置位），
    /// `false` 表示超时正常到期。零时长只做一次标志检查。
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        while !*cancelled {
            if self
                .inner
                .condvar
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return *cancelled;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_for_times_out_when_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.wait_for(Duration::from_millis(10)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_before_wait_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(token.wait_for(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_for(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_zero_timeout_checks_flag_only() {
        let token = CancelToken::new();
        assert!(!token.wait_for(Duration::ZERO));
        token.cancel();
        assert!(token.wait_for(Duration::ZERO));
    }
}
