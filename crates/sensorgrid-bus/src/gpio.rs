//! GPIO 抽象与 Linux sysfs 后端
//!
//! 激活引脚约定：输出引脚初始为高电平（设备断电/未选中），
//! 拉低表示激活。输入引脚用于云台的故障检测。

use crate::BusError;

/// 数字输出引脚
pub trait GpioOutput: Send {
    fn set_low(&mut self) -> Result<(), BusError>;
    fn set_high(&mut self) -> Result<(), BusError>;
}

/// 数字输入引脚
pub trait GpioInput: Send {
    fn is_high(&mut self) -> Result<bool, BusError>;
}

/// 按引脚号发放 GPIO 句柄的工厂
///
/// 组合根（CLI）决定用哪个实现：Linux 上是 [`SysfsGpio`]，
/// 测试里是 `mock::MockGpio`。
pub trait GpioProvider: Send + Sync {
    /// 申请输出引脚，初始电平为高
    fn output(&self, pin: u32) -> Result<Box<dyn GpioOutput>, BusError>;
    /// 申请输入引脚
    fn input(&self, pin: u32) -> Result<Box<dyn GpioInput>, BusError>;
}

#[cfg(target_os = "linux")]
pub use linux::SysfsGpio;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::PathBuf;

    use tracing::debug;

    use super::{GpioInput, GpioOutput, GpioProvider};
    use crate::BusError;

    /// sysfs GPIO 后端（`/sys/class/gpio`）
    pub struct SysfsGpio {
        root: PathBuf,
    }

    impl SysfsGpio {
        pub fn new() -> Self {
            Self::with_root("/sys/class/gpio")
        }

        /// 指定 sysfs 根目录（测试用）
        pub fn with_root(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        fn export(&self, pin: u32) -> Result<PathBuf, BusError> {
            let pin_dir = self.root.join(format!("gpio{pin}"));
            if !pin_dir.exists() {
                // 已导出的引脚会返回 EBUSY，忽略
                match fs::write(self.root.join("export"), pin.to_string()) {
                    Ok(()) => debug!(pin, "exported gpio pin"),
                    Err(e) if e.kind() == ErrorKind::ResourceBusy => {},
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(pin_dir)
        }
    }

    impl Default for SysfsGpio {
        fn default() -> Self {
            Self::new()
        }
    }

    impl GpioProvider for SysfsGpio {
        fn output(&self, pin: u32) -> Result<Box<dyn GpioOutput>, BusError> {
            let dir = self.export(pin)?;
            // "high" 原子地设置输出方向并拉高
            fs::write(dir.join("direction"), "high")?;
            Ok(Box::new(SysfsPin { value: dir.join("value") }))
        }

        fn input(&self, pin: u32) -> Result<Box<dyn GpioInput>, BusError> {
            let dir = self.export(pin)?;
            fs::write(dir.join("direction"), "in")?;
            Ok(Box::new(SysfsPin { value: dir.join("value") }))
        }
    }

    struct SysfsPin {
        value: PathBuf,
    }

    impl SysfsPin {
        fn write(&self, level: &str) -> Result<(), BusError> {
            fs::write(&self.value, level)?;
            Ok(())
        }
    }

    impl GpioOutput for SysfsPin {
        fn set_low(&mut self) -> Result<(), BusError> {
            self.write("0")
        }

        fn set_high(&mut self) -> Result<(), BusError> {
            self.write("1")
        }
    }

    impl GpioInput for SysfsPin {
        fn is_high(&mut self) -> Result<bool, BusError> {
            let raw = fs::read_to_string(&self.value)?;
            Ok(raw.trim() == "1")
        }
    }
}
