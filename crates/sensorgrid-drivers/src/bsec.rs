//! BME680 + Bosch BSEC 融合库驱动
//!
//! BSEC 是闭源二进制，只能以外部辅助进程的形式跑（`bsec_bme680`，
//! 每行一个 JSON 对象写到 stdout）。一个泵线程把解码输出灌进
//! 单槽有界通道，只保留最新一帧；`run()` 非阻塞取用，暂无数据时
//! 产出字段缺省的空记录。泵线程永远不会阻塞主流水线。

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use serde::Deserialize;
use tracing::{debug, warn};

use sensorgrid_core::{
    BuildContext, CoreError, Driver, DriverError, FieldValue, Record, clock,
};

/// 辅助进程的一帧解码输出，键序即字段序
type Reading = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Deserialize)]
pub struct BsecConfig {
    /// 辅助进程可执行文件
    #[serde(default = "default_command")]
    pub command: String,
    /// 传感器 I2C 地址
    #[serde(default = "default_address")]
    pub address: u16,
}

fn default_command() -> String {
    "bsec_bme680".into()
}

fn default_address() -> u16 {
    0x77
}

pub struct BsecDriver {
    id: String,
    child: Child,
    rx: Receiver<Reading>,
    pump: Option<JoinHandle<()>>,
}

impl BsecDriver {
    pub fn new(id: impl Into<String>, cfg: &BsecConfig) -> Result<Self, DriverError> {
        let mut child = Command::new(&cfg.command)
            .arg(cfg.address.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        // spawn 成功时 stdout 一定存在
        let stdout = child.stdout.take().ok_or_else(|| {
            DriverError::Decode("helper process has no stdout".into())
        })?;
        let (tx, rx) = bounded(1);
        let drain = rx.clone();
        let pump = std::thread::spawn(move || pump_lines(stdout, tx, drain));
        Ok(Self {
            id: id.into(),
            child,
            rx,
            pump: Some(pump),
        })
    }
}

/// 泵线程：逐行解析 JSON，单槽保最新
fn pump_lines(stdout: std::process::ChildStdout, tx: Sender<Reading>, drain: Receiver<Reading>) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let reading: Reading = match serde_json::from_str(line.trim()) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "discarding malformed helper output line");
                continue;
            }
        };
        // 腾出槽位再放，消费者只会看到最新一帧
        while drain.try_recv().is_ok() {}
        if tx.try_send(reading).is_err() {
            break;
        }
    }
}

impl Driver for BsecDriver {
    fn driver_id(&self) -> &str {
        &self.id
    }

    fn run(&mut self) -> Result<Vec<Record>, DriverError> {
        let ts = clock::now_ns();
        let record = match self.rx.try_recv() {
            Ok(reading) => {
                let fields = reading
                    .iter()
                    .filter_map(|(key, value)| {
                        field_value(value).map(|v| (key.clone(), v))
                    })
                    .collect();
                Record::new(self.id.clone(), ts, fields)
            }
            Err(TryRecvError::Empty) => {
                debug!(driver = %self.id, "no decoded frame yet");
                Record::empty(self.id.clone(), ts)
            }
            Err(TryRecvError::Disconnected) => {
                return Err(DriverError::Decode("helper process exited".into()));
            }
        };
        Ok(vec![record])
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.child.kill()?;
        self.child.wait()?;
        if let Some(pump) = self.pump.take()
            && pump.join().is_err()
        {
            warn!(driver = %self.id, "pump thread panicked");
        }
        Ok(())
    }
}

fn field_value(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(FieldValue::Int(i))
            } else {
                n.as_f64().map(FieldValue::Float)
            }
        }
        serde_json::Value::String(s) => Some(FieldValue::Str(s.clone())),
        serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
        _ => None,
    }
}

pub(crate) fn build(
    _ctx: &BuildContext,
    cfg: &toml::value::Table,
) -> Result<Box<dyn sensorgrid_core::Driver>, CoreError> {
    let cfg: BsecConfig = toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| CoreError::Config(format!("bme680_bsec: {e}")))?;
    let driver = BsecDriver::new("bme680_bsec", &cfg)
        .map_err(|e| CoreError::Config(format!("bme680_bsec: {e}")))?;
    Ok(Box::new(driver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pump_keeps_latest_reading() {
        let (tx, rx) = bounded(1);
        let drain = rx.clone();
        // 直接驱动单槽语义，不依赖真实子进程
        for i in 0..3 {
            let mut reading = Reading::new();
            reading.insert("iaq".into(), serde_json::Value::from(i));
            while drain.try_recv().is_ok() {}
            tx.try_send(reading).unwrap();
        }
        let latest = rx.try_recv().unwrap();
        assert_eq!(latest["iaq"], serde_json::Value::from(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_field_value_conversion() {
        assert_eq!(
            field_value(&serde_json::Value::from(42)),
            Some(FieldValue::Int(42))
        );
        assert_eq!(
            field_value(&serde_json::Value::from(1.5)),
            Some(FieldValue::Float(1.5))
        );
        assert_eq!(field_value(&serde_json::Value::Null), None);
    }
}
