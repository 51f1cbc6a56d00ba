//! MH-Z14 CO₂ 传感器串口协议
//!
//! 固定 9 字节命令/响应，波特率 9600。命令序列来自传感器数据手册，
//! 校验和跳过首字节 0xFF，按补码式计算。

use crate::ProtocolError;

/// 命令/响应帧长度
pub const FRAME_LEN: usize = 9;
/// 串口波特率
pub const BAUD_RATE: u32 = 9600;

/// 读取 CO₂ 浓度
pub const CMD_READ: [u8; FRAME_LEN] = [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79];
/// 零点标定
pub const CMD_CAL_ZERO: [u8; FRAME_LEN] = [0xFF, 0x01, 0x87, 0x00, 0x00, 0x00, 0x00, 0x00, 0x78];
/// 量程标定（2000 ppm 参考气）
pub const CMD_CAL_SPAN: [u8; FRAME_LEN] = [0xFF, 0x01, 0x88, 0x07, 0xD0, 0x00, 0x00, 0x00, 0xA0];
/// 打开 ABC 自动基线校准
pub const CMD_ABC_ENABLE: [u8; FRAME_LEN] = [0xFF, 0x01, 0x79, 0xA0, 0x00, 0x00, 0x00, 0x00, 0xE6];
/// 关闭 ABC 自动基线校准
pub const CMD_ABC_DISABLE: [u8; FRAME_LEN] =
    [0xFF, 0x01, 0x79, 0x00, 0x00, 0x00, 0x00, 0x00, 0x86];

/// 响应头：0xFF + 命令回显 0x86
const READ_RESPONSE_HEADER: [u8; 2] = [0xFF, 0x86];

/// MH-Z14 校验和：跳过首字节，补码式
pub fn checksum(frame: &[u8]) -> u8 {
    let sum: u8 = frame[1..].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (0xFFu8.wrapping_sub(sum)).wrapping_add(1)
}

/// 解析读取命令的响应，返回 CO₂ 浓度（ppm）
pub fn parse_reading(frame: &[u8]) -> Result<u16, ProtocolError> {
    if frame.len() != FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    }
    if frame[..2] != READ_RESPONSE_HEADER {
        return Err(ProtocolError::InvalidHeader(frame[..2].to_vec()));
    }
    if checksum(&frame[..FRAME_LEN - 1]) != frame[FRAME_LEN - 1] {
        return Err(ProtocolError::ChecksumMismatch {
            frame: frame.to_vec(),
        });
    }
    Ok(u16::from_be_bytes([frame[2], frame[3]]))
}
