//! 激活引脚上下文
//!
//! 在一次驱动调用周围对数字输出引脚排序：`open()` 拉低（设备供电/
//! 选中），`close()` 恢复高电平。同一引脚由 `gpio<N>` 资源锁串行化，
//! 两次调用不会并发争用。
//!
//! 状态机：`Closed → Open → Closed`。未配置引脚的上下文所有操作都是
//! no-op；对未打开的上下文调用 `close()` 也是 no-op（低→高幂等）。

use sensorgrid_bus::GpioOutput;
use tracing::warn;

use crate::error::CoreError;
use crate::lock::ResourceLock;

/// 驱动调用的激活引脚作用域
pub struct ActivationContext {
    pin: Option<Box<dyn GpioOutput>>,
    lock: Option<ResourceLock>,
    open: bool,
}

impl ActivationContext {
    /// 未配置激活引脚的上下文（全部操作 no-op）
    pub fn disabled() -> Self {
        Self { pin: None, lock: None, open: false }
    }

    /// 引脚 + 按引脚号键控的资源锁
    pub fn new(pin: Box<dyn GpioOutput>, lock: ResourceLock) -> Self {
        Self { pin: Some(pin), lock: Some(lock), open: false }
    }

    /// 取锁并拉低引脚；已打开或未配置时 no-op
    pub fn open(&mut self) -> Result<(), CoreError> {
        if self.open {
            return Ok(());
        }
        let Some(pin) = self.pin.as_mut() else {
            return Ok(());
        };
        if let Some(lock) = self.lock.as_mut() {
            lock.acquire().map_err(CoreError::Lock)?;
        }
        // 先标记 Open：拉低失败时 close() 仍会走恢复路径释放锁
        self.open = true;
        pin.set_low()?;
        Ok(())
    }

    /// 恢复引脚高电平并放锁；未打开或未配置时 no-op
    pub fn close(&mut self) -> Result<(), CoreError> {
        if !self.open {
            return Ok(());
        }
        let result = match self.pin.as_mut() {
            Some(pin) => pin.set_high().map_err(CoreError::from),
            None => Ok(()),
        };
        if let Some(lock) = self.lock.as_mut() {
            lock.release().map_err(CoreError::Lock)?;
        }
        self.open = false;
        result
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for ActivationContext {
    fn drop(&mut self) {
        // 兜底：流水线在所有退出路径上都显式调用 close()
        if self.open {
            if let Err(e) = self.close() {
                warn!(error = %e, "failed to close activation context on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorgrid_bus::GpioProvider;
    use sensorgrid_bus::mock::MockGpio;

    fn context(gpio: &MockGpio, pin: u32, root: &std::path::Path) -> ActivationContext {
        ActivationContext::new(
            gpio.output(pin).unwrap(),
            ResourceLock::new(root, &format!("gpio{pin}")),
        )
    }

    #[test]
    fn test_open_drives_low_close_restores_high() {
        let dir = tempfile::tempdir().unwrap();
        let gpio = MockGpio::new();
        let mut ctx = context(&gpio, 17, dir.path());

        ctx.open().unwrap();
        assert!(ctx.is_open());
        assert!(!gpio.pin(17).lock().level_high);

        ctx.close().unwrap();
        assert!(!ctx.is_open());
        assert!(gpio.pin(17).lock().level_high);
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let gpio = MockGpio::new();
        let mut ctx = context(&gpio, 4, dir.path());

        ctx.close().unwrap();
        // 未发生任何电平切换
        assert!(gpio.pin(4).lock().transitions.is_empty());
    }

    #[test]
    fn test_open_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let gpio = MockGpio::new();
        let mut ctx = context(&gpio, 4, dir.path());

        ctx.open().unwrap();
        ctx.open().unwrap();
        assert_eq!(gpio.pin(4).lock().transitions, vec![false]);
        ctx.close().unwrap();
    }

    #[test]
    fn test_disabled_context_is_noop() {
        let mut ctx = ActivationContext::disabled();
        ctx.open().unwrap();
        assert!(!ctx.is_open());
        ctx.close().unwrap();
    }

    #[test]
    fn test_drop_restores_pin() {
        let dir = tempfile::tempdir().unwrap();
        let gpio = MockGpio::new();
        {
            let mut ctx = context(&gpio, 9, dir.path());
            ctx.open().unwrap();
        }
        assert!(gpio.pin(9).lock().level_high);
    }
}
