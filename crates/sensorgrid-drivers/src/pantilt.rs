//! 云台驱动（vert/pan/tilt 三轴扫描机构）
//!
//! 对应 arduino-vertpantilt 固件的 I2C 命令协议。一次 `run()` 扫完
//! 配置的三轴范围：每个位置先发带校验和的移动帧，再轮询状态帧直到
//! 机构到位（校验和有效且位置在容差内），然后读一条状态记录。
//!
//! 两层容错叠在基本的移动/校验环上：
//! - 瞬态总线故障按策略处理：`retry` 固定退避后无限重试（该硬件上
//!   总线毛刺是常态），`abort` 直接上抛中止本轮；
//! - 外部故障引脚（低电平有效）在每次读之前轮询，触发后进入恢复
//!   状态机：回零（此时不再查故障引脚）、等固定安定时间、轮询到
//!   故障解除，然后放弃本轮扫描，下一轮重新开始。
//!
//! 配置了嵌套驱动时，每个扫描位置上云台释放自己的总线句柄和 i2c
//! 锁，对嵌套实例跑一遍采集流水线，再重新加锁开总线。这是同进程
//! 两个总线用户之间显式的所有权交接，不交接会死锁。

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use sensorgrid_bus::{BusError, GpioInput, GpioProvider, I2cBus, I2cOpener};
use sensorgrid_core::{
    BuildContext, CancelToken, CoreError, Driver, DriverError, DriverInstance, FieldValue, Record,
    ResourceLock, Terminated, build_instances, clock, collect,
};
use sensorgrid_protocol::pantilt::{CMD_MOVE, CMD_READ, MoveFrame, STATE_FRAME_LEN, StateFrame};

/// 单轴扫描范围（两端含），等价 `start..=stop` 步进 `step`
#[derive(Debug, Clone, Deserialize)]
pub struct AxisRange<T> {
    pub start: T,
    pub stop: T,
    pub step: T,
}

impl<T: Copy + Into<u16>> AxisRange<T> {
    fn positions(&self) -> impl Iterator<Item = u16> {
        let step = usize::from(self.step.into().max(1));
        (self.start.into()..=self.stop.into()).step_by(step)
    }
}

/// 三轴扫描范围
///
/// pan/tilt 在移动帧里各占一个字节，轴类型取 u8，超范围的配置
/// 在反序列化时即拒绝。
#[derive(Debug, Clone, Deserialize)]
pub struct Movement {
    pub vert: AxisRange<u16>,
    pub pan: AxisRange<u8>,
    pub tilt: AxisRange<u8>,
}

/// 移动中瞬态总线故障的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusErrorPolicy {
    /// 固定退避后无限重试（默认，总线毛刺不致命）
    Retry,
    /// 上抛中止本轮采集
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanTiltConfig {
    /// I2C 设备地址
    pub address: u16,
    /// I2C 总线号（`/dev/i2c-N`）
    #[serde(default = "default_bus")]
    pub bus: u8,
    pub movement: Movement,
    /// 嵌套采集的同步网格秒数，同时用于本机状态记录的取整
    #[serde(default)]
    pub interval: f64,
    /// 到位后到读状态之间的额外等待（秒）
    #[serde(default)]
    pub read_interval: f64,
    /// 每次 vert 变化后的额外安定等待（秒）
    #[serde(default)]
    pub vert_interval: f64,
    /// 轮询/退避间隔（秒）
    #[serde(default = "default_polling_interval")]
    pub polling_interval: f64,
    /// 故障恢复回零后的安定等待（秒）
    #[serde(default = "default_settle_interval")]
    pub settle_interval: f64,
    /// 位置匹配容差（机械单位；不同批次固件取 0 或 1）
    #[serde(default)]
    pub tolerance: u16,
    #[serde(default = "default_bus_error_policy")]
    pub bus_error_policy: BusErrorPolicy,
    /// 故障输入引脚（低电平 = 故障）
    #[serde(default)]
    pub fault_pin: Option<u32>,
    /// 嵌套驱动实例配置，和顶层 `inputs` 同构
    #[serde(default)]
    pub inputs: toml::value::Table,
}

fn default_bus() -> u8 {
    1
}

fn default_polling_interval() -> f64 {
    0.1
}

fn default_settle_interval() -> f64 {
    3.0
}

fn default_bus_error_policy() -> BusErrorPolicy {
    BusErrorPolicy::Retry
}

/// 扫描内部的控制流结果
enum SweepError {
    /// 故障引脚触发，需要走恢复状态机
    Fault,
    /// 不可恢复、直接上抛
    Driver(DriverError),
}

impl From<DriverError> for SweepError {
    fn from(e: DriverError) -> Self {
        SweepError::Driver(e)
    }
}

pub struct PanTiltDriver {
    id: String,
    cfg: PanTiltConfig,
    lock: ResourceLock,
    bus: Option<Box<dyn I2cBus>>,
    opener: I2cOpener,
    fault_pin: Option<Box<dyn GpioInput>>,
    nested: Vec<DriverInstance>,
    cancel: CancelToken,
    polling: Duration,
}

impl PanTiltDriver {
    /// 构建时即获取 i2c 锁并打开总线句柄
    pub fn new(
        id: impl Into<String>,
        cfg: PanTiltConfig,
        mut lock: ResourceLock,
        opener: I2cOpener,
        fault_pin: Option<Box<dyn GpioInput>>,
        nested: Vec<DriverInstance>,
        cancel: CancelToken,
    ) -> Result<Self, DriverError> {
        lock.acquire()?;
        let bus = opener()?;
        let polling = Duration::from_secs_f64(cfg.polling_interval.max(0.0));
        Ok(Self {
            id: id.into(),
            cfg,
            lock,
            bus: Some(bus),
            opener,
            fault_pin,
            nested,
            cancel,
            polling,
        })
    }

    fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            spin_sleep::sleep(Duration::from_secs_f64(secs));
        }
    }

    /// 瞬态故障按策略处理：`Ok(())` 表示已退避、调用方应重试
    fn handle_bus_error(&self, e: BusError, context: &str) -> Result<(), SweepError> {
        if e.is_transient() && self.cfg.bus_error_policy == BusErrorPolicy::Retry {
            warn!(driver = %self.id, error = %e, context, "transient bus error, retrying");
            spin_sleep::sleep(self.polling);
            Ok(())
        } else {
            Err(SweepError::Driver(DriverError::Bus(e)))
        }
    }

    fn bus_mut(&mut self) -> Result<&mut dyn I2cBus, SweepError> {
        match self.bus.as_deref_mut() {
            Some(bus) => Ok(bus),
            None => Err(SweepError::Driver(DriverError::Bus(BusError::Device(
                "i2c handle closed".into(),
            )))),
        }
    }

    /// 轮询状态帧直到校验和有效
    ///
    /// `check_fault` 时每次读之前先查故障引脚（低电平触发恢复）。
    /// 校验和无效的帧不算错误，退避后继续轮询。
    fn read_state(&mut self, check_fault: bool) -> Result<StateFrame, SweepError> {
        loop {
            if check_fault
                && let Some(pin) = self.fault_pin.as_mut()
            {
                let high = pin.is_high().map_err(DriverError::Bus)?;
                if !high {
                    return Err(SweepError::Fault);
                }
            }
            match self.bus_mut()?.read_block(CMD_READ, STATE_FRAME_LEN) {
                Ok(frame) => match StateFrame::decode(&frame) {
                    Ok(state) => return Ok(state),
                    // 校验和不符：读到半截帧，等一拍重读
                    Err(e) => {
                        debug!(driver = %self.id, error = %e, "invalid state frame, polling again");
                        spin_sleep::sleep(self.polling);
                    }
                },
                Err(e) => self.handle_bus_error(e, "read state")?,
            }
        }
    }

    /// 移动/校验环：发移动帧，轮询状态直到位置在容差内匹配
    fn move_to(&mut self, target: MoveFrame, check_fault: bool) -> Result<(), SweepError> {
        let data = target.encode();
        loop {
            if let Err(e) = self.bus_mut()?.write_block(CMD_MOVE, &data) {
                self.handle_bus_error(e, "send move")?;
                continue;
            }
            spin_sleep::sleep(self.polling);
            let state = self.read_state(check_fault)?;
            if state.matches(&target, self.cfg.tolerance) {
                return Ok(());
            }
            spin_sleep::sleep(self.polling);
        }
    }

    /// 故障恢复状态机
    ///
    /// 回零（故障引脚检查挂起，否则永远走不出去）、等安定时间、
    /// 轮询故障解除。调用方随后放弃本轮扫描。
    fn recover(&mut self) -> Result<(), DriverError> {
        info!(driver = %self.id, "fault pin asserted, homing and waiting for clearance");
        match self.move_to(MoveFrame::new(0, 0, 0), false) {
            Ok(()) => {}
            Err(SweepError::Driver(e)) => return Err(e),
            // check_fault = false 时不会出现
            Err(SweepError::Fault) => unreachable!("fault check suppressed during recovery"),
        }
        self.sleep(self.cfg.settle_interval);
        loop {
            match self.fault_pin.as_mut() {
                Some(pin) => {
                    if pin.is_high().map_err(DriverError::Bus)? {
                        break;
                    }
                    spin_sleep::sleep(self.polling);
                }
                None => break,
            }
        }
        info!(driver = %self.id, "fault cleared, sweep will resume next cycle");
        Ok(())
    }

    /// 嵌套采集前后的总线所有权交接
    fn run_nested(&mut self, records: &mut Vec<Record>) -> Result<(), SweepError> {
        self.bus = None;
        self.lock.release().map_err(DriverError::Io)?;
        let mut result = Ok(());
        let nested = collect(&mut self.nested, self.cfg.interval, &self.cancel, &mut |r| {
            records.push(r)
        });
        if nested == Err(Terminated) {
            result = Err(SweepError::Driver(DriverError::Terminated));
        }
        // 无论嵌套结果如何都要拿回总线，否则后续移动全部失败
        self.lock.acquire().map_err(DriverError::Io)?;
        self.bus = Some((self.opener)().map_err(DriverError::Bus)?);
        result
    }

    fn sweep(&mut self, records: &mut Vec<Record>) -> Result<(), SweepError> {
        let step = clock::step_ns(self.cfg.interval);
        let verts: Vec<u16> = self.cfg.movement.vert.positions().collect();
        let pans: Vec<u16> = self.cfg.movement.pan.positions().collect();
        let tilts: Vec<u16> = self.cfg.movement.tilt.positions().collect();
        for &vert in &verts {
            let mut first = true;
            for &pan in &pans {
                for &tilt in &tilts {
                    self.sleep(self.cfg.polling_interval);
                    // pan/tilt 轴类型为 u8，positions() 不会越过 stop，转换无损
                    let target = MoveFrame::new(vert, pan as u8, tilt as u8);
                    self.move_to(target, true)?;
                    if first {
                        first = false;
                        self.sleep(self.cfg.vert_interval);
                    }
                    self.sleep(self.cfg.polling_interval + self.cfg.read_interval);
                    if !self.nested.is_empty() {
                        self.run_nested(records)?;
                    }
                    let state = self.read_state(true)?;
                    records.push(Record::new(
                        self.id.clone(),
                        clock::round_step(clock::now_ns(), step),
                        vec![
                            ("vert".into(), FieldValue::Int(state.vert as i64)),
                            ("pan".into(), FieldValue::Int(state.pan as i64)),
                            ("tilt".into(), FieldValue::Int(state.tilt as i64)),
                            ("flags".into(), FieldValue::Int(state.flags as i64)),
                            (
                                "b1voltage".into(),
                                FieldValue::Float(state.b1_voltage as f64 / 10.0),
                            ),
                            (
                                "b2voltage".into(),
                                FieldValue::Float(state.b2_voltage as f64 / 10.0),
                            ),
                        ],
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Driver for PanTiltDriver {
    fn driver_id(&self) -> &str {
        &self.id
    }

    fn run(&mut self) -> Result<Vec<Record>, DriverError> {
        let mut records = Vec::new();
        match self.sweep(&mut records) {
            Ok(()) => Ok(records),
            // 故障中止本轮，已采到的记录照常交出
            Err(SweepError::Fault) => {
                self.recover()?;
                Ok(records)
            }
            Err(SweepError::Driver(e)) => Err(e),
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        for instance in self.nested.iter_mut() {
            instance.close();
        }
        self.bus = None;
        self.lock.release()?;
        Ok(())
    }
}

/// 工厂：Linux 下接 `/dev/i2c-N`，其余平台拒绝构建
pub(crate) fn build(
    ctx: &BuildContext,
    cfg: &toml::value::Table,
) -> Result<Box<dyn sensorgrid_core::Driver>, CoreError> {
    let cfg: PanTiltConfig = toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| CoreError::Config(format!("pantilt: {e}")))?;
    let nested = build_instances(ctx, &cfg.inputs)?;
    let lock = ResourceLock::new(&ctx.lock_root, "i2c");
    let fault_pin = match cfg.fault_pin {
        Some(pin) => Some(ctx.gpio.input(pin)?),
        None => None,
    };
    let opener = open_i2c(cfg.bus, cfg.address)?;
    let driver = PanTiltDriver::new("pantilt", cfg, lock, opener, fault_pin, nested, ctx.cancel.clone())
        .map_err(|e| CoreError::Config(format!("pantilt: {e}")))?;
    Ok(Box::new(driver))
}

#[cfg(target_os = "linux")]
fn open_i2c(bus: u8, address: u16) -> Result<I2cOpener, CoreError> {
    Ok(Box::new(move || {
        let dev = sensorgrid_bus::LinuxI2cDev::open(bus, address)?;
        Ok(Box::new(dev) as Box<dyn I2cBus>)
    }))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(_bus: u8, _address: u16) -> Result<I2cOpener, CoreError> {
    Err(CoreError::Config(
        "pantilt: i2c backend is only available on linux".into(),
    ))
}
