//! 文件/标准输出 sink

use std::fs::{File, OpenOptions};
use std::io::Write;

use serde::Deserialize;

use sensorgrid_core::{BuildContext, CoreError, Output, OutputError, Record};

#[derive(Debug, Clone, Deserialize)]
pub struct FileOutputConfig {
    /// 追加写入的目标文件
    #[serde(default = "default_file")]
    pub file: String,
}

fn default_file() -> String {
    "/dev/stdout".into()
}

pub struct FileOutput {
    file: File,
}

impl FileOutput {
    pub fn new(cfg: &FileOutputConfig) -> Result<Self, OutputError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.file)?;
        Ok(Self { file })
    }
}

impl Output for FileOutput {
    fn run(&mut self, record: &Record) -> Result<(), OutputError> {
        if let Some(line) = record.to_line() {
            writeln!(self.file, "{line}")?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.file.flush()?;
        Ok(())
    }
}

pub(crate) fn build(
    _ctx: &BuildContext,
    cfg: &toml::value::Table,
) -> Result<Box<dyn Output>, CoreError> {
    let cfg: FileOutputConfig = toml::Value::Table(cfg.clone())
        .try_into()
        .map_err(|e: toml::de::Error| CoreError::Config(format!("file: {e}")))?;
    let output = FileOutput::new(&cfg).map_err(|e| CoreError::Config(format!("file: {e}")))?;
    Ok(Box::new(output))
}
