//! 驱动/输出插件契约
//!
//! 任何数量的可互换实现注册到 [`crate::Registry`] 后即可被编排核心
//! 驱动，核心不需要知道具体型号。

use sensorgrid_bus::BusError;
use sensorgrid_protocol::ProtocolError;
use thiserror::Error;

use crate::error::CoreError;
use crate::record::Record;

/// 传感器/执行器驱动契约
///
/// `run()` 产生有限的、不可重启的记录序列：通常一条，云台驱动在
/// 扫描范围时一次产生多条。记录的时间戳由驱动以原始挂钟纳秒填入，
/// 流水线负责网格取整和静态标签。
pub trait Driver: Send {
    /// 注册名派生的稳定标识（记录的 measurement 名）
    fn driver_id(&self) -> &str;

    /// 执行一次采集
    fn run(&mut self) -> Result<Vec<Record>, DriverError>;

    /// 释放总线/端口句柄和持有的资源锁；幂等
    fn close(&mut self) -> Result<(), DriverError>;
}

/// 输出（sink）契约
///
/// `run` 同步投递一条记录，内部可以自行重试/缓冲；字段缺省的记录
/// 不是错误（跳过即可），不得传播半截写入。
pub trait Output: Send {
    fn run(&mut self, record: &Record) -> Result<(), OutputError>;

    /// 释放连接/文件句柄；幂等
    fn close(&mut self) -> Result<(), OutputError>;
}

/// 驱动运行期错误
///
/// 除 `Terminated` 外的所有变体都被流水线捕获、记日志并转成
/// 一条错误标签记录，不会中断采集轮。
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线 I/O 故障（协议层通常已按策略重试过）
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议帧解析失败
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 普通 I/O 错误（辅助进程、文件句柄）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 激活上下文/资源锁失败
    #[error("Activation error: {0}")]
    Activation(#[from] CoreError),

    /// 读数解码失败（格式不符、缺字段）
    #[error("Decode error: {0}")]
    Decode(String),

    /// 协作式终止（非错误，原样向上传播）
    #[error("Terminated")]
    Terminated,
}

/// 输出投递错误
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink error: {0}")]
    Sink(String),
}
