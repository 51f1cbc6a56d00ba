//! # Sensorgrid Protocol
//!
//! 硬件设备二进制协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `pantilt`: 云台机构 I2C 命令协议（校验和帧）
//! - `mhz14`: MH-Z14 CO₂ 传感器串口命令协议
//!
//! ## 字节序
//!
//! 两个协议的多字节字段均为高位在前（大端字节序）。

pub mod mhz14;
pub mod pantilt;

pub use mhz14::*;
pub use pantilt::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Checksum mismatch in frame {frame:02X?}")]
    ChecksumMismatch { frame: Vec<u8> },

    #[error("Invalid response header: {0:02X?}")]
    InvalidHeader(Vec<u8>),
}
