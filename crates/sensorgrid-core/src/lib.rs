//! # Sensorgrid Core
//!
//! 采集编排核心：把一组独立调度的传感器/执行器驱动组织成一个
//! 同步的轮询流水线。
//!
//! ## 模块
//!
//! - `record`: 测量记录数据模型和行协议序列化
//! - `lock`: 文件锁实现的跨进程资源互斥
//! - `activation`: 激活引脚上下文（驱动调用前拉低、调用后恢复）
//! - `cancel`: 协作式终止令牌
//! - `clock`: 同步网格时间戳对齐
//! - `driver`: 驱动/输出插件契约
//! - `registry`: 字符串 id 到工厂的启动期注册表
//! - `config`: 配置记录解析（激活引脚剥离、静态标签提取）
//! - `pipeline`: 单轮采集流水线
//!
//! ## 调度模型
//!
//! 每个进程只有一条活动的轮询流；同一总线类的驱动串行执行，
//! 总线/引脚独占由文件锁跨进程保证。取消只在同步网格等待点生效，
//! 进行中的驱动调用总是完整结束，保证作用域资源全部释放。

pub mod activation;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod lock;
pub mod pipeline;
pub mod record;
pub mod registry;

pub use activation::ActivationContext;
pub use cancel::CancelToken;
pub use config::{ACTIVATION_PIN_KEY, Config, build_instances, build_outputs};
pub use driver::{Driver, DriverError, Output, OutputError};
pub use error::CoreError;
pub use lock::ResourceLock;
pub use pipeline::{DriverInstance, Terminated, collect};
pub use record::{ERROR_EXCEPTION, FieldValue, Record, TAG_ERROR};
pub use registry::{BuildContext, Registry};
