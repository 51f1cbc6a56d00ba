//! MH-Z14 CO2 传感器（串口命令/响应）
//!
//! 每轮先按配置打开或关闭传感器的自动基线校准（ABC 在密闭环境里
//! 会漂移，可用 `auto_calibrate = false` 关掉），再发读数命令取一帧。
//! 配置了零点/量程校准时首轮各执行一次，校准态持在实例里，
//! 一个实例对应一台物理设备。

use serde::Deserialize;
use tracing::info;

use sensorgrid_bus::SerialBus;
use sensorgrid_core::{
    BuildContext, CoreError, Driver, DriverError, FieldValue, Record, ResourceLock, clock,
};
use sensorgrid_protocol::mhz14::{
    BAUD_RATE, CMD_ABC_DISABLE, CMD_ABC_ENABLE, CMD_CAL_SPAN, CMD_CAL_ZERO, CMD_READ, FRAME_LEN,
    parse_reading,
};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mhz14Config {
    /// 串口设备路径（如 `/dev/ttyAMA0`）
    pub port: String,
    /// 首轮做零点校准（传感器需已在洁净空气中预热 20 分钟）
    #[serde(default)]
    pub zero_calibrate: bool,
    /// 首轮做量程校准（2000 ppm 参考气）
    #[serde(default)]
    pub span_calibrate: bool,
    /// ABC 自动基线校准开关，每轮下发
    #[serde(default = "default_true")]
    pub auto_calibrate: bool,
}

pub struct Mhz14Driver {
    id: String,
    lock: ResourceLock,
    port: Box<dyn SerialBus>,
    cfg: Mhz14Config,
    zero_calibrated: bool,
    span_calibrated: bool,
}

impl Mhz14Driver {
    pub fn new(
        id: impl Into<String>,
        cfg: &Mhz14Config,
        mut lock: ResourceLock,
        port: Box<dyn SerialBus>,
    ) -> Result<Self, DriverError> {
        lock.acquire()?;
        Ok(Self {
            id: id.into(),
            lock,
            port,
            cfg: cfg.clone(),
            zero_calibrated: false,
            span_calibrated: false,
        })
    }
}

impl Driver for Mhz14Driver {
    fn driver_id(&self) -> &str {
        &self.id
    }

    fn run(&mut self) -> Result<Vec<Record>, DriverError> {
        let ts = clock::now_ns();
        if self.cfg.zero_calibrate && !self.zero_calibrated {
            info!(driver = %self.id, "running zero-point calibration");
            self.port.command(&CMD_CAL_ZERO, FRAME_LEN)?;
            self.zero_calibrated = true;
        }
        if self.cfg.span_calibrate && !self.span_calibrated {
            info!(driver = %self.id, "running span calibration");
            self.port.command(&CMD_CAL_SPAN, FRAME_LEN)?;
            self.span_calibrated = true;
        }
        let abc = if self.cfg.auto_calibrate {
            &CMD_ABC_ENABLE
        } else {
            &CMD_ABC_DISABLE
        };
        self.port.command(abc, FRAME_LEN)?;
        let frame = self.port.command(&CMD_READ, FRAME_LEN)?;
        let co2 = parse_reading(&frame)?;
        Ok(vec![Record::new(
            self.id.clone(),
            ts,
            vec![("co2".into(), FieldValue::Int(co2 as i64))],
        )])
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.lock.release()?;
        Ok(())
    }
}

pub(crate) fn build(
    ctx: &BuildContext,
    cfg: &toml::value::Table,
) -> Result<Box<dyn sensorgrid_core::Driver>, CoreError> {
    let cfg: Mhz14Config = toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| CoreError::Config(format!("mhz14: {e}")))?;
    let lock = ResourceLock::new(&ctx.lock_root, "serial");
    let port = sensorgrid_bus::SerialCommandPort::open(&cfg.port, BAUD_RATE)?;
    let driver = Mhz14Driver::new("mhz14", &cfg, lock, Box::new(port))
        .map_err(|e| CoreError::Config(format!("mhz14: {e}")))?;
    Ok(Box::new(driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorgrid_bus::mock::{MockReply, MockSerial};
    use sensorgrid_protocol::mhz14;

    fn reading_frame(co2: u16) -> Vec<u8> {
        let mut frame = vec![0xFF, 0x86, (co2 >> 8) as u8, (co2 & 0xFF) as u8, 0, 0, 0, 0, 0];
        frame[8] = mhz14::checksum(&frame[..8]);
        frame
    }

    fn config(port: &str) -> Mhz14Config {
        Mhz14Config {
            port: port.into(),
            zero_calibrate: false,
            span_calibrate: false,
            auto_calibrate: true,
        }
    }

    fn driver_with(port: MockSerial, cfg: Mhz14Config) -> (Mhz14Driver, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let lock = ResourceLock::new(dir.path(), "serial");
        let driver = Mhz14Driver::new("mhz14", &cfg, lock, Box::new(port)).unwrap();
        (driver, dir)
    }

    #[test]
    fn test_reading_enables_abc_then_reads() {
        let port = MockSerial::new();
        let state = port.state();
        port.push_reply(MockReply::Frame(vec![0; FRAME_LEN]));
        port.push_reply(MockReply::Frame(reading_frame(415)));
        let (mut driver, _dir) = driver_with(port, config("/dev/null"));

        let records = driver.run().unwrap();
        assert_eq!(
            records[0].fields,
            Some(vec![("co2".to_string(), FieldValue::Int(415))])
        );
        let requests = state.lock().requests.clone();
        assert_eq!(requests, vec![CMD_ABC_ENABLE.to_vec(), CMD_READ.to_vec()]);
    }

    #[test]
    fn test_abc_disabled_when_configured_off() {
        let port = MockSerial::new();
        let state = port.state();
        port.push_reply(MockReply::Frame(vec![0; FRAME_LEN]));
        port.push_reply(MockReply::Frame(reading_frame(415)));
        let mut cfg = config("/dev/null");
        cfg.auto_calibrate = false;
        let (mut driver, _dir) = driver_with(port, cfg);

        driver.run().unwrap();
        let requests = state.lock().requests.clone();
        assert_eq!(requests, vec![CMD_ABC_DISABLE.to_vec(), CMD_READ.to_vec()]);
    }

    #[test]
    fn test_calibrations_run_exactly_once() {
        let port = MockSerial::new();
        let state = port.state();
        // 首轮：零点、量程、开 ABC、读数
        for _ in 0..3 {
            port.push_reply(MockReply::Frame(vec![0; FRAME_LEN]));
        }
        port.push_reply(MockReply::Frame(reading_frame(600)));
        let mut cfg = config("/dev/null");
        cfg.zero_calibrate = true;
        cfg.span_calibrate = true;
        let (mut driver, _dir) = driver_with(port, cfg);

        driver.run().unwrap();
        let requests = state.lock().requests.clone();
        assert_eq!(
            requests,
            vec![
                CMD_CAL_ZERO.to_vec(),
                CMD_CAL_SPAN.to_vec(),
                CMD_ABC_ENABLE.to_vec(),
                CMD_READ.to_vec(),
            ]
        );

        // 第二轮不再发校准命令
        state.lock().replies.push_back(MockReply::Frame(vec![0; FRAME_LEN]));
        state.lock().replies.push_back(MockReply::Frame(reading_frame(601)));
        driver.run().unwrap();

        let requests = state.lock().requests.clone();
        let cal_count = requests
            .iter()
            .filter(|r| **r == CMD_CAL_ZERO.to_vec() || **r == CMD_CAL_SPAN.to_vec())
            .count();
        assert_eq!(cal_count, 2);
    }

    #[test]
    fn test_bad_header_is_protocol_error() {
        let port = MockSerial::new();
        port.push_reply(MockReply::Frame(vec![0; FRAME_LEN]));
        port.push_reply(MockReply::Frame(vec![0xAA; FRAME_LEN]));
        let (mut driver, _dir) = driver_with(port, config("/dev/null"));
        assert!(matches!(driver.run(), Err(DriverError::Protocol(_))));
    }
}
