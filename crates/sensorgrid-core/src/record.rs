//! 测量记录数据模型
//!
//! 一条记录 = (驱动 id, 纳秒时间戳, 可缺省的字段表, 标签序列)。
//! 字段/标签的插入顺序决定输出消息的字段顺序，全链路保序，
//! 所以用有序的键值对向量而不是哈希表。

use std::fmt;

/// 错误标签键
pub const TAG_ERROR: &str = "ERROR";
/// 驱动运行期故障的错误标签值
pub const ERROR_EXCEPTION: &str = "EXCEP";

/// 字段/标签的标量值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl FieldValue {
    /// 从 TOML 标量提取；表/数组等非标量返回 `None`
    pub fn from_toml(value: &toml::Value) -> Option<Self> {
        match value {
            toml::Value::Integer(v) => Some(Self::Int(*v)),
            toml::Value::Float(v) => Some(Self::Float(*v)),
            toml::Value::String(v) => Some(Self::Str(v.clone())),
            toml::Value::Boolean(v) => Some(Self::Bool(*v)),
            _ => None,
        }
    }

    /// 行协议字段渲染：整数带 `i` 后缀，字符串带引号
    pub fn render_field(&self) -> String {
        match self {
            Self::Int(v) => format!("{v}i"),
            Self::Float(v) => format!("{v}"),
            Self::Str(v) => format!("\"{v}\""),
            Self::Bool(v) => format!("{v}"),
        }
    }
}

/// 标签值按原样渲染（无后缀、无引号）
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// 一条带标签的时序测量记录
///
/// `fields == None` 表示该驱动本轮读取失败或无数据。
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 产生记录的驱动的注册名
    pub driver_id: String,
    /// Unix 纳秒时间戳（已按同步网格取整）
    pub timestamp_ns: i64,
    /// 有序字段表；键唯一
    pub fields: Option<Vec<(String, FieldValue)>>,
    /// 有序标签序列（静态配置标签、host、错误标签等）
    pub tags: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new(
        driver_id: impl Into<String>,
        timestamp_ns: i64,
        fields: Vec<(String, FieldValue)>,
    ) -> Self {
        Self {
            driver_id: driver_id.into(),
            timestamp_ns,
            fields: Some(fields),
            tags: Vec::new(),
        }
    }

    /// 字段缺省的空记录（读取失败/暂无数据）
    pub fn empty(driver_id: impl Into<String>, timestamp_ns: i64) -> Self {
        Self {
            driver_id: driver_id.into(),
            timestamp_ns,
            fields: None,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// 行协议序列化
    ///
    /// `measurement,tag=v,... field=v,... timestamp`；字段缺省或为空的
    /// 记录序列化为 `None`，文本类输出直接跳过。
    pub fn to_line(&self) -> Option<String> {
        let fields = self.fields.as_ref().filter(|f| !f.is_empty())?;
        let fstr = fields
            .iter()
            .map(|(k, v)| format!("{k}={}", v.render_field()))
            .collect::<Vec<_>>()
            .join(",");
        let head = if self.tags.is_empty() {
            self.driver_id.clone()
        } else {
            let tstr = self
                .tags
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("{},{tstr}", self.driver_id)
        };
        Some(format!("{head} {fstr} {}", self.timestamp_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format_field_types() {
        let line = Record::new(
            "bme280",
            1_700_000_000_000_000_000,
            vec![
                ("temperature".into(), FieldValue::Float(21.5)),
                ("samples".into(), FieldValue::Int(3)),
                ("status".into(), FieldValue::Str("ok".into())),
                ("heater".into(), FieldValue::Bool(false)),
            ],
        )
        .with_tag("host", "pi0")
        .to_line()
        .unwrap();

        assert_eq!(
            line,
            "bme280,host=pi0 temperature=21.5,samples=3i,status=\"ok\",heater=false 1700000000000000000"
        );
    }

    #[test]
    fn test_line_format_preserves_insertion_order() {
        let line = Record::new(
            "m",
            0,
            vec![
                ("z".into(), FieldValue::Int(1)),
                ("a".into(), FieldValue::Int(2)),
            ],
        )
        .with_tag("zz", 1i64)
        .with_tag("aa", 2i64)
        .to_line()
        .unwrap();
        assert_eq!(line, "m,zz=1,aa=2 z=1i,a=2i 0");
    }

    #[test]
    fn test_absent_fields_serialize_to_none() {
        assert!(Record::empty("m", 0).to_line().is_none());
        assert!(Record::new("m", 0, vec![]).to_line().is_none());
    }

    #[test]
    fn test_no_tags_line_has_no_comma() {
        let line = Record::new("m", 5, vec![("x".into(), FieldValue::Int(1))])
            .to_line()
            .unwrap();
        assert_eq!(line, "m x=1i 5");
    }
}
