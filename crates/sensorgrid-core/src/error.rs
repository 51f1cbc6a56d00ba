//! 核心层错误类型定义

use sensorgrid_bus::BusError;
use thiserror::Error;

/// 核心层错误类型（启动期/资源管理）
///
/// 运行期的驱动故障走 [`crate::DriverError`]，由流水线按驱动隔离；
/// 这里的错误在启动阶段是致命的。
#[derive(Error, Debug)]
pub enum CoreError {
    /// 资源锁文件操作失败
    #[error("Lock error: {0}")]
    Lock(#[source] std::io::Error),

    /// 总线后端错误
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 配置引用了未注册的驱动 id
    #[error("Unknown driver id: {0}")]
    UnknownDriver(String),

    /// 配置引用了未注册的输出 id
    #[error("Unknown output id: {0}")]
    UnknownOutput(String),

    /// 配置记录格式错误
    #[error("Invalid configuration: {0}")]
    Config(String),
}
