//! 驱动/输出注册表
//!
//! 配置里的字符串 id 在启动期解析成具体实现的工厂函数，没有任何
//! 运行时反射。注册发生在组合根（CLI 的 main）：
//!
//! ```rust,ignore
//! let mut registry = Registry::new();
//! registry.register_driver("pantilt", |ctx, cfg| PanTilt::from_config(ctx, cfg));
//! registry.register_output("file", |_ctx, cfg| FileOutput::from_config(cfg));
//! ```
//!
//! 未注册的 id 是致命的启动错误（缺模块），在轮询开始前中止进程。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sensorgrid_bus::GpioProvider;

use crate::cancel::CancelToken;
use crate::driver::{Driver, Output};
use crate::error::CoreError;

/// 工厂调用时可用的环境
///
/// 带注册表引用，云台这类复合驱动可以用它构建嵌套驱动实例。
pub struct BuildContext<'a> {
    pub registry: &'a Registry,
    /// 锁文件根目录（`<lock_root>/<resource>.lock`）
    pub lock_root: PathBuf,
    /// GPIO 工厂（真实 sysfs 或 mock）
    pub gpio: Arc<dyn GpioProvider>,
    /// 终止令牌（嵌套采集的同步等待检查点用）
    pub cancel: CancelToken,
}

type DriverFactory =
    Box<dyn Fn(&BuildContext, &toml::value::Table) -> Result<Box<dyn Driver>, CoreError> + Send + Sync>;
type OutputFactory =
    Box<dyn Fn(&BuildContext, &toml::value::Table) -> Result<Box<dyn Output>, CoreError> + Send + Sync>;

/// 字符串 id → 工厂的启动期注册表
#[derive(Default)]
pub struct Registry {
    drivers: HashMap<String, DriverFactory>,
    outputs: HashMap<String, OutputFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_driver<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&BuildContext, &toml::value::Table) -> Result<Box<dyn Driver>, CoreError>
            + Send
            + Sync
            + 'static,
    {
        self.drivers.insert(id.to_string(), Box::new(factory));
    }

    pub fn register_output<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&BuildContext, &toml::value::Table) -> Result<Box<dyn Output>, CoreError>
            + Send
            + Sync
            + 'static,
    {
        self.outputs.insert(id.to_string(), Box::new(factory));
    }

    /// 按 id 构建一个驱动实例；id 未注册时报 `UnknownDriver`
    pub fn build_driver(
        &self,
        ctx: &BuildContext,
        id: &str,
        cfg: &toml::value::Table,
    ) -> Result<Box<dyn Driver>, CoreError> {
        let factory = self
            .drivers
            .get(id)
            .ok_or_else(|| CoreError::UnknownDriver(id.to_string()))?;
        factory(ctx, cfg)
    }

    /// 按 id 构建一个输出实例；id 未注册时报 `UnknownOutput`
    pub fn build_output(
        &self,
        ctx: &BuildContext,
        id: &str,
        cfg: &toml::value::Table,
    ) -> Result<Box<dyn Output>, CoreError> {
        let factory = self
            .outputs
            .get(id)
            .ok_or_else(|| CoreError::UnknownOutput(id.to_string()))?;
        factory(ctx, cfg)
    }

    /// 已注册驱动 id（无序），启动日志用
    pub fn driver_ids(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_ids_lists_registrations() {
        let mut registry = Registry::new();
        registry.register_driver("a", |_, _| Err(CoreError::Config("unbuildable".into())));
        registry.register_driver("b", |_, _| Err(CoreError::Config("unbuildable".into())));
        let mut ids: Vec<&str> = registry.driver_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, ["a", "b"]);
    }
}
