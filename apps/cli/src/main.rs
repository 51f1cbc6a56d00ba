//! # sensorgrid
//!
//! 传感器轮询守护进程：按同步网格驱动采集流水线，把记录扇出到
//! 全部配置的输出。
//!
//! ```bash
//! # 默认配置路径
//! sensorgrid
//!
//! # 指定配置，日志级别走 RUST_LOG
//! RUST_LOG=sensorgrid=debug sensorgrid --config ./config.toml
//! ```
//!
//! 收到 SIGINT/SIGTERM 后在下一个同步网格等待点干净退出：在跑的
//! 驱动会先跑完、记录照常投递，然后关闭全部实例。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use sensorgrid_bus::GpioProvider;
use sensorgrid_core::{
    BuildContext, CancelToken, Config, FieldValue, Output, Registry, build_instances,
    build_outputs, collect,
};

/// sensorgrid - 传感器采集守护进程
#[derive(Parser, Debug)]
#[command(name = "sensorgrid")]
#[command(about = "Polls configured sensors on a sync grid and fans records out to sinks")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "/etc/sensorgrid/config.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sensorgrid=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let cfg = Config::from_str(&raw).context("parsing config file")?;
    let host = cfg.host.clone().unwrap_or_else(default_host);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("installing signal handler")?;
    }

    let mut registry = Registry::new();
    sensorgrid_drivers::register_builtin(&mut registry);
    let mut available: Vec<&str> = registry.driver_ids().collect();
    available.sort_unstable();
    debug!(drivers = ?available, "registered built-in drivers");

    let ctx = BuildContext {
        registry: &registry,
        lock_root: cfg.lock_dir(),
        gpio: gpio_provider(),
        cancel: cancel.clone(),
    };
    // 启动错误（未知驱动、坏配置、打不开的硬件）在这里就是致命的
    let mut instances = build_instances(&ctx, &cfg.inputs).context("building driver instances")?;
    let mut outputs = build_outputs(&ctx, &cfg.outputs).context("building outputs")?;

    info!(
        config = %cli.config.display(),
        host = %host,
        drivers = instances.len(),
        outputs = outputs.len(),
        interval = cfg.interval,
        "sensorgrid started"
    );

    loop {
        let result = collect(&mut instances, cfg.interval, &cancel, &mut |mut record| {
            record
                .tags
                .insert(0, ("host".into(), FieldValue::Str(host.clone())));
            // 单个输出失败不影响其余输出和采集循环
            for output in outputs.iter_mut() {
                if let Err(e) = output.run(&record) {
                    warn!(driver = %record.driver_id, error = %e, "output delivery failed");
                }
            }
        });
        if result.is_err() {
            break;
        }
    }

    info!("sensorgrid stopping");
    for instance in instances.iter_mut() {
        instance.close();
    }
    for output in outputs.iter_mut() {
        if let Err(e) = output.close() {
            warn!(error = %e, "failed to close output");
        }
    }
    info!("sensorgrid stopped");
    Ok(())
}

fn default_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into())
}

#[cfg(target_os = "linux")]
fn gpio_provider() -> Arc<dyn GpioProvider> {
    Arc::new(sensorgrid_bus::SysfsGpio::new())
}

/// 非 Linux 平台没有 GPIO 后端；配置了激活/故障引脚时在构建期报错
#[cfg(not(target_os = "linux"))]
fn gpio_provider() -> Arc<dyn GpioProvider> {
    struct UnsupportedGpio;

    impl GpioProvider for UnsupportedGpio {
        fn output(
            &self,
            _pin: u32,
        ) -> Result<Box<dyn sensorgrid_bus::GpioOutput>, sensorgrid_bus::BusError> {
            Err(sensorgrid_bus::BusError::Unsupported(
                "gpio is only available on linux",
            ))
        }

        fn input(
            &self,
            _pin: u32,
        ) -> Result<Box<dyn sensorgrid_bus::GpioInput>, sensorgrid_bus::BusError> {
            Err(sensorgrid_bus::BusError::Unsupported(
                "gpio is only available on linux",
            ))
        }
    }

    Arc::new(UnsupportedGpio)
}
