//! 串口后端（serialport crate）
//!
//! 传感器串口协议都是命令/响应式：写请求、flush、等待固定延迟、
//! 读定长响应。打开时清空输入输出缓冲，避免残留半帧。

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::trace;

use crate::{BusError, SERIAL_TIMEOUT, SerialBus};

/// 写请求和读响应之间的固定延迟
const COMMAND_DELAY: Duration = Duration::from_millis(100);

/// 命令/响应式串口句柄
pub struct SerialCommandPort {
    port: Box<dyn SerialPort>,
    delay: Duration,
}

impl SerialCommandPort {
    /// 打开串口并清空缓冲
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, BusError> {
        let port = serialport::new(path, baud_rate)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| BusError::Device(e.to_string()))?;
        port.clear(ClearBuffer::All)
            .map_err(|e| BusError::Device(e.to_string()))?;
        trace!(path, baud_rate, "opened serial port");
        Ok(Self { port, delay: COMMAND_DELAY })
    }
}

impl SerialBus for SerialCommandPort {
    fn command(&mut self, request: &[u8], response_len: usize) -> Result<Vec<u8>, BusError> {
        self.port.write_all(request)?;
        self.port.flush()?;
        std::thread::sleep(self.delay);
        if response_len == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; response_len];
        self.port.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout
            } else {
                BusError::Io(e)
            }
        })?;
        Ok(buf)
    }
}
