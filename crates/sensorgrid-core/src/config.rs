//! 配置记录解析
//!
//! 顶层配置（TOML）：`interval`（同步网格秒数）、`host`、`lock_dir`，
//! `inputs`/`outputs` 两张表，按 id 键到每实例参数记录的列表。表的
//! 书写顺序就是采集/投递顺序（`toml` 开 `preserve_order`）。
//!
//! 每条参数记录里保留键 `ACTIVATION_PIN` 由核心消费并剥离，剩下的
//! 标量参数作为该实例的静态标签附到它产生的每条记录上。

use std::path::PathBuf;

use sensorgrid_bus::GpioProvider;
use serde::Deserialize;

use crate::activation::ActivationContext;
use crate::error::CoreError;
use crate::lock::ResourceLock;
use crate::pipeline::DriverInstance;
use crate::record::FieldValue;
use crate::registry::BuildContext;

/// 核心消费的保留配置键：驱动调用期间拉低的激活引脚号
pub const ACTIVATION_PIN_KEY: &str = "ACTIVATION_PIN";

/// 默认锁文件根目录
pub const DEFAULT_LOCK_DIR: &str = "/run/lock/sensorgrid";

/// 顶层配置文件
#[derive(Debug, Deserialize)]
pub struct Config {
    /// 同步网格秒数；0 表示不对齐、连续采集
    #[serde(default)]
    pub interval: f64,

    /// host 标签；缺省取主机名
    pub host: Option<String>,

    /// 锁文件根目录
    pub lock_dir: Option<PathBuf>,

    /// 驱动表：id → 每实例参数记录列表
    #[serde(default)]
    pub inputs: toml::value::Table,

    /// 输出表，形状同 `inputs`
    #[serde(default)]
    pub outputs: toml::value::Table,
}

impl Config {
    pub fn from_str(raw: &str) -> Result<Self, CoreError> {
        toml::from_str(raw).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_DIR))
    }
}

/// 把 `inputs`/`outputs` 一类的表拍平成 (id, 参数记录) 序列，保序
pub fn instance_configs(
    section: &toml::value::Table,
) -> Result<Vec<(String, toml::value::Table)>, CoreError> {
    let mut flat = Vec::new();
    for (id, value) in section {
        let entries = value.as_array().ok_or_else(|| {
            CoreError::Config(format!("section '{id}' must be an array of tables"))
        })?;
        for entry in entries {
            let table = entry.as_table().ok_or_else(|| {
                CoreError::Config(format!("entries of '{id}' must be tables"))
            })?;
            flat.push((id.clone(), table.clone()));
        }
    }
    Ok(flat)
}

/// 剥离并返回 `ACTIVATION_PIN`
pub fn split_activation_pin(cfg: &mut toml::value::Table) -> Result<Option<u32>, CoreError> {
    match cfg.remove(ACTIVATION_PIN_KEY) {
        None => Ok(None),
        Some(toml::Value::Integer(pin)) if pin >= 0 => Ok(Some(pin as u32)),
        Some(other) => Err(CoreError::Config(format!(
            "{ACTIVATION_PIN_KEY} must be a non-negative integer, got {other}"
        ))),
    }
}

/// 实例参数记录里的标量 → 静态标签（`<driver_id>.<key> = value`）
pub fn static_tags(driver_id: &str, cfg: &toml::value::Table) -> Vec<(String, FieldValue)> {
    cfg.iter()
        .filter_map(|(key, value)| {
            FieldValue::from_toml(value).map(|v| (format!("{driver_id}.{key}"), v))
        })
        .collect()
}

/// 按配置顺序构建全部驱动实例
///
/// 每条记录：剥离激活引脚（有则建上下文 + `gpio<N>` 锁）、调注册表
/// 工厂、提取静态标签。任何一步失败都是致命的启动错误。
pub fn build_instances(
    ctx: &BuildContext,
    section: &toml::value::Table,
) -> Result<Vec<DriverInstance>, CoreError> {
    let mut instances = Vec::new();
    for (id, mut cfg) in instance_configs(section)? {
        let activation = match split_activation_pin(&mut cfg)? {
            Some(pin) => ActivationContext::new(
                ctx.gpio.output(pin)?,
                ResourceLock::new(&ctx.lock_root, &format!("gpio{pin}")),
            ),
            None => ActivationContext::disabled(),
        };
        let driver = ctx.registry.build_driver(ctx, &id, &cfg)?;
        let tags = static_tags(&id, &cfg);
        instances.push(DriverInstance::new(driver, activation, tags));
    }
    Ok(instances)
}

/// 按配置顺序构建全部输出实例
pub fn build_outputs(
    ctx: &BuildContext,
    section: &toml::value::Table,
) -> Result<Vec<Box<dyn crate::driver::Output>>, CoreError> {
    let mut outputs = Vec::new();
    for (id, cfg) in instance_configs(section)? {
        outputs.push(ctx.registry.build_output(ctx, &id, &cfg)?);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top_level_config() {
        let cfg = Config::from_str(
            r#"
            interval = 5.0
            host = "pi0"

            [[inputs.pantilt]]
            address = 0x18
            ACTIVATION_PIN = 17

            [[inputs.mhz14]]
            port = "/dev/ttyS0"

            [[outputs.file]]
            file = "/tmp/out"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.interval, 5.0);
        assert_eq!(cfg.host.as_deref(), Some("pi0"));
        assert_eq!(instance_configs(&cfg.inputs).unwrap().len(), 2);
        assert_eq!(instance_configs(&cfg.outputs).unwrap().len(), 1);
    }

    #[test]
    fn test_split_activation_pin() {
        let mut table = toml::value::Table::new();
        table.insert("ACTIVATION_PIN".into(), toml::Value::Integer(22));
        table.insert("address".into(), toml::Value::Integer(0x18));

        assert_eq!(split_activation_pin(&mut table).unwrap(), Some(22));
        // 剥离后驱动工厂看不到保留键
        assert!(!table.contains_key(ACTIVATION_PIN_KEY));
        assert_eq!(split_activation_pin(&mut table).unwrap(), None);
    }

    #[test]
    fn test_split_activation_pin_rejects_non_integer() {
        let mut table = toml::value::Table::new();
        table.insert("ACTIVATION_PIN".into(), toml::Value::String("x".into()));
        assert!(split_activation_pin(&mut table).is_err());
    }

    #[test]
    fn test_static_tags_scalars_only_in_order() {
        let mut table = toml::value::Table::new();
        table.insert("address".into(), toml::Value::Integer(0x18));
        table.insert("rate".into(), toml::Value::Float(1.5));
        table.insert(
            "movement".into(),
            toml::Value::Table(toml::value::Table::new()),
        );
        table.insert("port".into(), toml::Value::String("/dev/ttyS0".into()));

        let tags = static_tags("pantilt", &table);
        assert_eq!(
            tags,
            vec![
                ("pantilt.address".to_string(), FieldValue::Int(0x18)),
                ("pantilt.rate".to_string(), FieldValue::Float(1.5)),
                ("pantilt.port".to_string(), FieldValue::Str("/dev/ttyS0".into())),
            ]
        );
    }
}
