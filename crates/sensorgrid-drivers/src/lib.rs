//! sensorgrid 内置驱动和输出
//!
//! 每个驱动/输出以字符串 id 注册进 [`Registry`]，配置里的同名段
//! 按注册表解析成实例。编排核心只认契约不认型号，新增传感器在
//! 这里加一个模块、注册一行即可。
//!
//! 内置驱动：
//! - `pantilt` — 三轴云台（I2C，带故障恢复和嵌套采集）
//! - `mhz14` — CO2 传感器（串口，`serial` feature）
//! - `bme680_bsec` — BME680 + BSEC 融合库（外部辅助进程）
//!
//! 内置输出：
//! - `file` — 行协议追加到文件/标准输出
//! - `tcp` — 行协议推到远端收集器，带有界重试缓冲

pub mod bsec;
#[cfg(feature = "serial")]
pub mod mhz14;
pub mod outputs;
pub mod pantilt;

use sensorgrid_core::Registry;

/// 注册全部内置驱动和输出
pub fn register_builtin(registry: &mut Registry) {
    registry.register_driver("pantilt", pantilt::build);
    #[cfg(feature = "serial")]
    registry.register_driver("mhz14", mhz14::build);
    registry.register_driver("bme680_bsec", bsec::build);
    registry.register_output("file", outputs::file::build);
    registry.register_output("tcp", outputs::tcp::build);
}
