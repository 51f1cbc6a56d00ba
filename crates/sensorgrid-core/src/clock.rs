//! 同步网格时间戳对齐
//!
//! 时间戳向下取整到网格（纳秒），同一网格格内的读数跨设备可比。
//! 网格为 0 时不取整。

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 当前 Unix 纳秒时间戳
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// 同步网格秒数转纳秒步长
pub fn step_ns(sync_secs: f64) -> i64 {
    if sync_secs > 0.0 {
        (sync_secs * 1e9) as i64
    } else {
        0
    }
}

/// 向下取整到网格；`step == 0` 为恒等
pub fn round_step(ts_ns: i64, step_ns: i64) -> i64 {
    if step_ns > 0 {
        ts_ns.div_euclid(step_ns) * step_ns
    } else {
        ts_ns
    }
}

/// 距下一个同步网格边界的等待时长
///
/// `sync <= 0` 时为零（立即采集）。正好落在边界上时等待完整的
/// 一个网格，和挂钟漂移无关，保证相邻两轮时间戳相差网格的整数倍。
pub fn sync_wait(sync_secs: f64) -> Duration {
    if sync_secs <= 0.0 {
        return Duration::ZERO;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Duration::from_secs_f64(sync_secs - now % sync_secs)
}
