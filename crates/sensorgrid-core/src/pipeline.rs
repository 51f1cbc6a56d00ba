//! 采集流水线
//!
//! 驱动一轮采集走完：等到下一个同步网格边界（可被终止令牌打断）、
//! 按配置顺序逐个驱动实例执行（激活上下文在所有退出路径上关闭）、
//! 失败按驱动隔离成错误标签记录、时间戳网格取整、静态标签追加。
//! 一个驱动的故障永远不会中止其余驱动或已收记录的投递。

use tracing::{debug, error, warn};

use crate::activation::ActivationContext;
use crate::cancel::CancelToken;
use crate::clock;
use crate::driver::{Driver, DriverError};
use crate::record::{ERROR_EXCEPTION, FieldValue, Record, TAG_ERROR};

/// 一个已配置的驱动实例
///
/// 驱动本体 + 激活上下文 + 该实例的静态配置标签。
pub struct DriverInstance {
    driver: Box<dyn Driver>,
    activation: ActivationContext,
    static_tags: Vec<(String, FieldValue)>,
}

impl DriverInstance {
    pub fn new(
        driver: Box<dyn Driver>,
        activation: ActivationContext,
        static_tags: Vec<(String, FieldValue)>,
    ) -> Self {
        Self { driver, activation, static_tags }
    }

    pub fn driver_id(&self) -> &str {
        self.driver.driver_id()
    }

    /// 进程收尾时释放驱动资源
    pub fn close(&mut self) {
        if let Err(e) = self.activation.close() {
            warn!(driver = self.driver_id(), error = %e, "failed to close activation context");
        }
        if let Err(e) = self.driver.close() {
            warn!(driver = self.driver_id(), error = %e, "failed to close driver");
        }
    }
}

impl std::fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverInstance")
            .field("driver_id", &self.driver.driver_id())
            .finish_non_exhaustive()
    }
}

/// 本轮采集被终止令牌中止（干净关机条件，不是错误）
#[derive(Debug, PartialEq, Eq)]
pub struct Terminated;

/// 驱动一轮采集
///
/// 记录经 `emit` 按产生顺序流出：驱动间按配置顺序，驱动内按产生
/// 顺序，无跨驱动重排或攒批。返回 `Err(Terminated)` 表示同步等待
/// 被终止令牌打断，上层把它当作干净关机的触发。
pub fn collect(
    instances: &mut [DriverInstance],
    sync_secs: f64,
    cancel: &CancelToken,
    emit: &mut dyn FnMut(Record),
) -> Result<(), Terminated> {
    // 唯一设计的可中断挂起点
    if cancel.wait_for(clock::sync_wait(sync_secs)) {
        return Err(Terminated);
    }

    let step = clock::step_ns(sync_secs);
    for instance in instances.iter_mut() {
        let run_result = match instance.activation.open() {
            Ok(()) => instance.driver.run(),
            Err(e) => Err(DriverError::Activation(e)),
        };
        // 激活上下文在包括错误在内的每条退出路径上关闭
        if let Err(e) = instance.activation.close() {
            warn!(driver = instance.driver_id(), error = %e, "failed to close activation context");
        }

        match run_result {
            Ok(records) => {
                debug!(driver = instance.driver_id(), count = records.len(), "driver produced records");
                for mut record in records {
                    record.timestamp_ns = clock::round_step(record.timestamp_ns, step);
                    record.tags.extend(instance.static_tags.iter().cloned());
                    emit(record);
                }
            }
            // 协作式终止原样向上传播，不转错误记录
            Err(DriverError::Terminated) => return Err(Terminated),
            Err(e) => {
                error!(driver = instance.driver_id(), error = %e, "driver failed, continuing cycle");
                let mut record = Record::empty(
                    instance.driver_id().to_string(),
                    clock::round_step(clock::now_ns(), step),
                );
                record.tags.extend(instance.static_tags.iter().cloned());
                record.tags.push((TAG_ERROR.into(), ERROR_EXCEPTION.into()));
                emit(record);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    struct StubDriver {
        id: &'static str,
        fail: bool,
    }

    impl Driver for StubDriver {
        fn driver_id(&self) -> &str {
            self.id
        }

        fn run(&mut self) -> Result<Vec<Record>, DriverError> {
            if self.fail {
                Err(DriverError::Decode("stub failure".into()))
            } else {
                Ok(vec![Record::new(
                    self.id,
                    clock::now_ns(),
                    vec![("x".into(), FieldValue::Int(1))],
                )])
            }
        }

        fn close(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn instance(id: &'static str, fail: bool) -> DriverInstance {
        DriverInstance::new(
            Box::new(StubDriver { id, fail }),
            ActivationContext::disabled(),
            vec![(format!("{id}.cfg"), FieldValue::Int(7))],
        )
    }

    #[test]
    fn test_failing_driver_isolated_and_cycle_continues() {
        let mut instances = vec![
            instance("ok_driver", false),
            instance("bad_driver", true),
            instance("tail_driver", false),
        ];
        let cancel = CancelToken::new();
        let mut records = Vec::new();
        collect(&mut instances, 0.0, &cancel, &mut |r| records.push(r)).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].driver_id, "ok_driver");
        assert!(records[0].fields.is_some());

        // 故障驱动恰好一条错误记录：字段缺省、静态标签 + 错误标签
        assert_eq!(records[1].driver_id, "bad_driver");
        assert!(records[1].fields.is_none());
        assert_eq!(
            records[1].tags,
            vec![
                ("bad_driver.cfg".to_string(), FieldValue::Int(7)),
                (TAG_ERROR.to_string(), FieldValue::Str(ERROR_EXCEPTION.into())),
            ]
        );

        // 后续驱动不受影响
        assert_eq!(records[2].driver_id, "tail_driver");
        assert!(records[2].fields.is_some());
    }

    #[test]
    fn test_cancelled_token_terminates_before_any_driver() {
        let mut instances = vec![instance("ok_driver", false)];
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut records = Vec::new();
        let result = collect(&mut instances, 0.0, &cancel, &mut |r| records.push(r));
        assert_eq!(result, Err(Terminated));
        assert!(records.is_empty());
    }

    #[test]
    fn test_records_rounded_to_sync_grid() {
        let mut instances = vec![instance("ok_driver", false)];
        let cancel = CancelToken::new();
        let mut records = Vec::new();
        // interval 足够小，网格等待可以忽略
        collect(&mut instances, 0.001, &cancel, &mut |r| records.push(r)).unwrap();
        assert_eq!(records[0].timestamp_ns % 1_000_000, 0);
    }

    #[test]
    fn test_terminated_driver_error_propagates() {
        struct Interrupted;
        impl Driver for Interrupted {
            fn driver_id(&self) -> &str {
                "interrupted"
            }
            fn run(&mut self) -> Result<Vec<Record>, DriverError> {
                Err(DriverError::Terminated)
            }
            fn close(&mut self) -> Result<(), DriverError> {
                Ok(())
            }
        }
        let mut instances = vec![DriverInstance::new(
            Box::new(Interrupted),
            ActivationContext::disabled(),
            Vec::new(),
        )];
        let cancel = CancelToken::new();
        let mut records = Vec::new();
        let result = collect(&mut instances, 0.0, &cancel, &mut |r| records.push(r));
        assert_eq!(result, Err(Terminated));
        assert!(records.is_empty());
    }
}
