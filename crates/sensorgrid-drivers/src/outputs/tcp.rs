//! TCP 行协议 sink
//!
//! 每条记录一行推给远端收集器。投递失败不向流水线传播：连接断开
//! 时把当前行放进有界重试缓冲，下次投递成功后先发当前行、再按序
//! 补发缓冲里的积压；缓冲满时丢弃最新的一行（旧积压更有价值，
//! 它们的时间戳不会再产生）。

use std::collections::VecDeque;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use sensorgrid_core::{BuildContext, CoreError, Output, OutputError, Record};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct TcpOutputConfig {
    /// 远端地址（`host:port`）
    pub address: String,
    /// 重试缓冲容量，0 关闭缓冲（失败即丢）
    #[serde(default)]
    pub buffer_size: usize,
}

pub struct TcpOutput {
    address: String,
    stream: Option<TcpStream>,
    buffer: VecDeque<String>,
    buffer_size: usize,
}

impl TcpOutput {
    pub fn new(cfg: &TcpOutputConfig) -> Self {
        Self {
            address: cfg.address.clone(),
            stream: None,
            buffer: VecDeque::new(),
            buffer_size: cfg.buffer_size,
        }
    }

    fn connect(&self) -> std::io::Result<TcpStream> {
        let addrs: Vec<_> = std::net::ToSocketAddrs::to_socket_addrs(&self.address)?.collect();
        let addr = addrs.first().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")
        })?;
        TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)
    }

    fn send(&mut self, line: &str) -> std::io::Result<()> {
        if self.stream.is_none() {
            self.stream = Some(self.connect()?);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no open connection",
            ));
        };
        if let Err(e) = stream.write_all(line.as_bytes()).and_then(|()| stream.write_all(b"\n")) {
            // 半截写入的连接不可复用，直接重建
            self.stream = None;
            return Err(e);
        }
        Ok(())
    }

    fn buffer_line(&mut self, line: String) {
        if self.buffer_size == 0 {
            return;
        }
        if self.buffer.len() >= self.buffer_size {
            debug!("retry buffer full, dropping newest line");
            return;
        }
        self.buffer.push_back(line);
    }
}

impl Output for TcpOutput {
    fn run(&mut self, record: &Record) -> Result<(), OutputError> {
        let Some(line) = record.to_line() else {
            return Ok(());
        };
        match self.send(&line) {
            Ok(()) => {
                // 补发积压，失败的行留在队首下次再试
                while let Some(buffered) = self.buffer.pop_front() {
                    if let Err(e) = self.send(&buffered) {
                        warn!(error = %e, "flush of buffered line failed, keeping backlog");
                        self.buffer.push_front(buffered);
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, address = %self.address, "delivery failed, buffering line");
                self.buffer_line(line);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(std::net::Shutdown::Both).ok();
        }
        Ok(())
    }
}

pub(crate) fn build(
    _ctx: &BuildContext,
    cfg: &toml::value::Table,
) -> Result<Box<dyn Output>, CoreError> {
    let cfg: TcpOutputConfig = toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| CoreError::Config(format!("tcp: {e}")))?;
    Ok(Box::new(TcpOutput::new(&cfg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use sensorgrid_core::FieldValue;

    fn record(ts: i64) -> Record {
        Record::new("m", ts, vec![("x".into(), FieldValue::Int(1))])
    }

    #[test]
    fn test_failed_delivery_buffers_then_flushes_in_order() {
        // 先对着没人听的地址投递，攒出积压
        let cfg = TcpOutputConfig { address: "127.0.0.1:1".into(), buffer_size: 8 };
        let mut output = TcpOutput::new(&cfg);
        output.run(&record(1)).unwrap();
        output.run(&record(2)).unwrap();
        assert_eq!(output.buffer.len(), 2);

        // 端口恢复后：当前行先到，积压按序补发
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        output.address = listener.local_addr().unwrap().to_string();
        output.run(&record(3)).unwrap();
        output.close().unwrap();

        let (conn, _) = listener.accept().unwrap();
        let lines: Vec<String> = BufReader::new(conn)
            .lines()
            .map_while(Result::ok)
            .collect();
        assert_eq!(lines, vec!["m x=1i 3", "m x=1i 1", "m x=1i 2"]);
        assert!(output.buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_drops_newest() {
        let cfg = TcpOutputConfig { address: "127.0.0.1:1".into(), buffer_size: 2 };
        let mut output = TcpOutput::new(&cfg);
        for ts in 1..=3 {
            output.run(&record(ts)).unwrap();
        }
        let kept: Vec<_> = output.buffer.iter().cloned().collect();
        assert_eq!(kept, vec!["m x=1i 1", "m x=1i 2"]);
    }

    #[test]
    fn test_empty_record_is_skipped_without_connecting() {
        let cfg = TcpOutputConfig { address: "127.0.0.1:1".into(), buffer_size: 2 };
        let mut output = TcpOutput::new(&cfg);
        output.run(&Record::empty("m", 1)).unwrap();
        assert!(output.stream.is_none());
        assert!(output.buffer.is_empty());
    }
}
