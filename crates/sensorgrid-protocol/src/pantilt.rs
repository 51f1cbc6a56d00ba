//! 云台机构 I2C 协议
//!
//! 机构挂在共享 I2C 总线上，只有两个寄存器命令：
//!
//! - `0x4D` (MOVE)：写入 5 字节移动帧（目标坐标 + 校验和）
//! - `0x52` (READ)：读取 8 字节状态帧（当前坐标、标志位、电池电压 + 校验和）
//!
//! 移动帧校验和为补码式（所有字节求和 ≡ 0 mod 256），状态帧按同样的
//! 求和规则验证。校验失败不是致命错误，上层轮询到有效帧为止。

use crate::ProtocolError;

/// MOVE 命令寄存器地址
pub const CMD_MOVE: u8 = 0x4D;
/// READ 命令寄存器地址
pub const CMD_READ: u8 = 0x52;

/// 移动帧长度（4 字节坐标 + 1 字节校验和）
pub const MOVE_FRAME_LEN: usize = 5;
/// 状态帧长度（7 字节状态 + 1 字节校验和）
pub const STATE_FRAME_LEN: usize = 8;

/// 补码式校验和：使帧内所有字节之和 ≡ 0 (mod 256)
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u8 = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (0xFFu8.wrapping_sub(sum)).wrapping_add(1)
}

/// 验证帧内字节之和 ≡ 0 (mod 256)
pub fn frame_valid(frame: &[u8]) -> bool {
    frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

/// 云台目标坐标（一次移动命令）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveFrame {
    /// 垂直轴目标位置
    pub vert: u16,
    /// 水平轴目标位置
    pub pan: u8,
    /// 俯仰轴目标位置
    pub tilt: u8,
}

impl MoveFrame {
    pub fn new(vert: u16, pan: u8, tilt: u8) -> Self {
        Self { vert, pan, tilt }
    }

    /// 编码为 5 字节移动帧（大端 u16 + pan + tilt + 校验和）
    pub fn encode(&self) -> [u8; MOVE_FRAME_LEN] {
        let [hi, lo] = self.vert.to_be_bytes();
        let mut frame = [hi, lo, self.pan, self.tilt, 0];
        frame[4] = checksum(&frame[..4]);
        frame
    }
}

/// 云台状态帧（READ 命令的响应）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateFrame {
    /// 当前垂直轴位置
    pub vert: u16,
    /// 当前水平轴位置
    pub pan: u8,
    /// 当前俯仰轴位置
    pub tilt: u8,
    /// 机构状态标志位
    pub flags: u8,
    /// 电池 1 电压（单位 0.1 V）
    pub b1_voltage: u8,
    /// 电池 2 电压（单位 0.1 V）
    pub b2_voltage: u8,
}

impl StateFrame {
    /// 解析 8 字节状态帧
    ///
    /// 校验失败返回 `ChecksumMismatch`；调用方视其为瞬态条件并继续轮询。
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() != STATE_FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: STATE_FRAME_LEN,
                actual: frame.len(),
            });
        }
        if !frame_valid(frame) {
            return Err(ProtocolError::ChecksumMismatch {
                frame: frame.to_vec(),
            });
        }
        Ok(Self {
            vert: u16::from_be_bytes([frame[0], frame[1]]),
            pan: frame[2],
            tilt: frame[3],
            flags: frame[4],
            b1_voltage: frame[5],
            b2_voltage: frame[6],
        })
    }

    /// 编码为 8 字节状态帧（用于测试和回放）
    pub fn encode(&self) -> [u8; STATE_FRAME_LEN] {
        let [hi, lo] = self.vert.to_be_bytes();
        let mut frame = [
            hi,
            lo,
            self.pan,
            self.tilt,
            self.flags,
            self.b1_voltage,
            self.b2_voltage,
            0,
        ];
        frame[7] = checksum(&frame[..7]);
        frame
    }

    /// 三轴位置是否都在目标的 `tolerance` 容差范围内
    pub fn matches(&self, target: &MoveFrame, tolerance: u16) -> bool {
        self.vert.abs_diff(target.vert) <= tolerance
            && u16::from(self.pan.abs_diff(target.pan)) <= tolerance
            && u16::from(self.tilt.abs_diff(target.tilt)) <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_frame_checksum_sums_to_zero() {
        let frame = MoveFrame::new(0x0123, 45, 67).encode();
        assert_eq!(frame.len(), MOVE_FRAME_LEN);
        assert!(frame_valid(&frame));
    }

    #[test]
    fn test_move_frame_layout_big_endian() {
        let frame = MoveFrame::new(0x0102, 3, 4).encode();
        assert_eq!(&frame[..4], &[0x01, 0x02, 3, 4]);
    }

    #[test]
    fn test_state_frame_roundtrip() {
        let state = StateFrame {
            vert: 500,
            pan: 90,
            tilt: 45,
            flags: 0b0000_0010,
            b1_voltage: 74,
            b2_voltage: 81,
        };
        let decoded = StateFrame::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_state_frame_rejects_bad_checksum() {
        let mut frame = StateFrame {
            vert: 1,
            pan: 2,
            tilt: 3,
            flags: 0,
            b1_voltage: 0,
            b2_voltage: 0,
        }
        .encode();
        frame[7] = frame[7].wrapping_add(1);
        assert!(matches!(
            StateFrame::decode(&frame),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_state_frame_rejects_short_frame() {
        assert!(matches!(
            StateFrame::decode(&[0, 0, 0]),
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_matches_exact_and_tolerance() {
        let target = MoveFrame::new(100, 50, 25);
        let exact = StateFrame {
            vert: 100,
            pan: 50,
            tilt: 25,
            flags: 0,
            b1_voltage: 0,
            b2_voltage: 0,
        };
        assert!(exact.matches(&target, 0));

        let off_by_one = StateFrame { vert: 101, pan: 49, ..exact };
        assert!(!off_by_one.matches(&target, 0));
        assert!(off_by_one.matches(&target, 1));
    }
}
