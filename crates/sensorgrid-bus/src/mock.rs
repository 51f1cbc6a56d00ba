//! Mock 总线后端（无硬件依赖）
//!
//! 所有句柄共享内部状态（`Arc<Mutex<..>>`），测试脚本化响应队列并在
//! 事后断言写入序列。脚本耗尽时返回 I/O 错误，驱动按 abort 策略
//! 配置后即可终止，避免测试里的无限重试。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpio::{GpioInput, GpioOutput, GpioProvider};
use crate::{BusError, I2cBus, SerialBus};

fn script_exhausted() -> BusError {
    BusError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "mock script exhausted",
    ))
}

/// 一次脚本化的读响应
pub enum MockReply {
    /// 正常返回的字节
    Frame(Vec<u8>),
    /// 模拟一次瞬态总线 I/O 故障
    IoError,
}

/// Mock I2C 内部状态
#[derive(Default)]
pub struct MockI2cState {
    /// 记录的所有块写入（命令字节, 数据）
    pub writes: Vec<(u8, Vec<u8>)>,
    /// 脚本化的块读响应，按序弹出
    pub reads: VecDeque<MockReply>,
    /// 写入是否失败（统计剩余失败次数）
    pub write_failures: u32,
}

/// Mock I2C 设备句柄
#[derive(Clone)]
pub struct MockI2c {
    state: Arc<Mutex<MockI2cState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(MockI2cState::default())) }
    }

    /// 共享状态句柄（脚本化 + 断言用）
    pub fn state(&self) -> Arc<Mutex<MockI2cState>> {
        Arc::clone(&self.state)
    }

    /// 追加一条读响应脚本
    pub fn push_read(&self, reply: MockReply) {
        self.state.lock().reads.push_back(reply);
    }
}

impl Default for MockI2c {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cBus for MockI2c {
    fn write_block(&mut self, command: u8, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(script_exhausted());
        }
        state.writes.push((command, data.to_vec()));
        Ok(())
    }

    fn read_block(&mut self, _command: u8, _len: usize) -> Result<Vec<u8>, BusError> {
        match self.state.lock().reads.pop_front() {
            Some(MockReply::Frame(bytes)) => Ok(bytes),
            Some(MockReply::IoError) => Err(script_exhausted()),
            None => Err(script_exhausted()),
        }
    }
}

/// Mock 串口内部状态
#[derive(Default)]
pub struct MockSerialState {
    /// 记录的所有请求
    pub requests: Vec<Vec<u8>>,
    /// 脚本化的响应，按序弹出
    pub replies: VecDeque<MockReply>,
}

/// Mock 串口句柄
#[derive(Clone)]
pub struct MockSerial {
    state: Arc<Mutex<MockSerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(MockSerialState::default())) }
    }

    pub fn state(&self) -> Arc<Mutex<MockSerialState>> {
        Arc::clone(&self.state)
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().replies.push_back(reply);
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialBus for MockSerial {
    fn command(&mut self, request: &[u8], response_len: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.state.lock();
        state.requests.push(request.to_vec());
        if response_len == 0 {
            return Ok(Vec::new());
        }
        match state.replies.pop_front() {
            Some(MockReply::Frame(bytes)) => Ok(bytes),
            Some(MockReply::IoError) => Err(script_exhausted()),
            None => Err(script_exhausted()),
        }
    }
}

/// 单个 mock 引脚状态
pub struct MockPinState {
    /// 当前电平（true = 高）
    pub level_high: bool,
    /// 电平变化历史（true = 高）
    pub transitions: Vec<bool>,
}

impl Default for MockPinState {
    fn default() -> Self {
        // 输出引脚约定初始为高
        Self { level_high: true, transitions: Vec::new() }
    }
}

struct MockOutputPin {
    state: Arc<Mutex<MockPinState>>,
}

impl GpioOutput for MockOutputPin {
    fn set_low(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.level_high = false;
        state.transitions.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.level_high = true;
        state.transitions.push(true);
        Ok(())
    }
}

struct MockInputPin {
    state: Arc<Mutex<MockPinState>>,
}

impl GpioInput for MockInputPin {
    fn is_high(&mut self) -> Result<bool, BusError> {
        Ok(self.state.lock().level_high)
    }
}

/// Mock GPIO 工厂
///
/// 同一引脚号的所有句柄共享电平状态：测试可以通过 `pin` 拿到
/// 状态句柄来驱动输入电平或断言输出序列。
#[derive(Default)]
pub struct MockGpio {
    pins: Mutex<HashMap<u32, Arc<Mutex<MockPinState>>>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取某个引脚的共享状态（不存在则创建）
    pub fn pin(&self, pin: u32) -> Arc<Mutex<MockPinState>> {
        Arc::clone(
            self.pins
                .lock()
                .entry(pin)
                .or_insert_with(|| Arc::new(Mutex::new(MockPinState::default()))),
        )
    }
}

impl GpioProvider for MockGpio {
    fn output(&self, pin: u32) -> Result<Box<dyn GpioOutput>, BusError> {
        Ok(Box::new(MockOutputPin { state: self.pin(pin) }))
    }

    fn input(&self, pin: u32) -> Result<Box<dyn GpioInput>, BusError> {
        Ok(Box::new(MockInputPin { state: self.pin(pin) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_i2c_records_writes_and_scripts_reads() {
        let mut bus = MockI2c::new();
        bus.push_read(MockReply::Frame(vec![1, 2, 3]));

        bus.write_block(0x4D, &[9, 8]).unwrap();
        assert_eq!(bus.read_block(0x52, 3).unwrap(), vec![1, 2, 3]);
        assert!(bus.read_block(0x52, 3).is_err());

        let state = bus.state();
        assert_eq!(state.lock().writes, vec![(0x4D, vec![9, 8])]);
    }

    #[test]
    fn test_mock_gpio_shared_level() {
        let gpio = MockGpio::new();
        let mut out = gpio.output(17).unwrap();
        let mut inp = gpio.input(17).unwrap();

        assert!(inp.is_high().unwrap());
        out.set_low().unwrap();
        assert!(!inp.is_high().unwrap());
        out.set_high().unwrap();
        assert!(inp.is_high().unwrap());
        assert_eq!(gpio.pin(17).lock().transitions, vec![false, true]);
    }
}
