//! 内置记录输出（sink）
//!
//! 文本类输出统一走行协议序列化（[`Record::to_line`]），字段缺省的
//! 记录直接跳过，不算错误。
//!
//! [`Record::to_line`]: sensorgrid_core::Record::to_line

pub mod file;
pub mod tcp;
