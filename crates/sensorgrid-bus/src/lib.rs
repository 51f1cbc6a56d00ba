//! # Sensorgrid Bus Adapter Layer
//!
//! 共享总线硬件抽象层，提供统一的 I2C / 串口 / GPIO 接口抽象。
//!
//! 真实后端只在 Linux 上编译（`/dev/i2c-N` ioctl、sysfs GPIO），
//! `mock` feature 提供无硬件的内存后端，驱动层测试全部基于 mock。
//!
//! 互斥不在这一层：对共享总线的跨进程独占由上层的资源锁负责，
//! 这里只做裸传输。

use std::time::Duration;

use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod i2c;

#[cfg(feature = "serial")]
pub mod serial;

pub mod gpio;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use gpio::{GpioInput, GpioOutput, GpioProvider};
#[cfg(target_os = "linux")]
pub use gpio::SysfsGpio;
#[cfg(target_os = "linux")]
pub use i2c::LinuxI2cDev;
#[cfg(feature = "serial")]
pub use serial::SerialCommandPort;

/// 总线适配层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Unsupported on this platform: {0}")]
    Unsupported(&'static str),
    #[error("Device error: {0}")]
    Device(String),
}

impl BusError {
    /// 是否为瞬态 I/O 故障（上层按固定退避重试）
    ///
    /// 共享总线上的毛刺是预期现象，`Io`/`Timeout` 不视为致命。
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Io(_) | BusError::Timeout)
    }
}

/// I2C 设备句柄（地址在打开时绑定）
///
/// 块读写对应 SMBus 的 block read/write：先写寄存器命令字节，
/// 再传输数据。
pub trait I2cBus: Send {
    fn write_block(&mut self, command: u8, data: &[u8]) -> Result<(), BusError>;
    fn read_block(&mut self, command: u8, len: usize) -> Result<Vec<u8>, BusError>;
}

/// 命令/响应式串口设备
///
/// `command` 写入请求、flush、等待固定延迟后读取定长响应。
/// `response_len == 0` 表示只发不收。
pub trait SerialBus: Send {
    fn command(&mut self, request: &[u8], response_len: usize) -> Result<Vec<u8>, BusError>;
}

/// 打开 I2C 总线句柄的工厂闭包
///
/// 云台驱动在嵌套采集前后释放/重开总线，需要可重复调用的 opener。
pub type I2cOpener = Box<dyn Fn() -> Result<Box<dyn I2cBus>, BusError> + Send>;

/// 串口默认读超时
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(1);
