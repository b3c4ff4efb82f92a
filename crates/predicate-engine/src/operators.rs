//! 查询类型定义与注册表
//!
//! 每种操作符/组合符都有稳定的数字 ID 和规范名称，二者都可能被外部持久化，
//! 一经分配不可修改。名称和 ID 的反向查找表在进程内只构建一次。

use crate::error::{PredicateError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

/// 查询类型（组合符 + 叶子比较操作符）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum QueryKind {
    // 组合符
    And = 0,
    Or = 1,
    Not = 2,

    // 比较操作符
    Equals = 3,
    NotEquals = 4,
    LessThan = 5,
    LessThanOrEquals = 6,
    MoreThan = 7,
    MoreThanOrEquals = 8,
    Like = 9,
}

/// 反向查找表
struct Registry {
    by_id: HashMap<u8, QueryKind>,
    by_name: HashMap<&'static str, QueryKind>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let by_id = QueryKind::ALL.iter().map(|k| (k.id(), *k)).collect();
        let by_name = QueryKind::ALL.iter().map(|k| (k.name(), *k)).collect();
        debug!(kinds = QueryKind::ALL.len(), "查询类型注册表已构建");
        Registry { by_id, by_name }
    })
}

impl QueryKind {
    /// 按 ID 顺序排列的全部类型
    pub const ALL: [QueryKind; 10] = [
        Self::And,
        Self::Or,
        Self::Not,
        Self::Equals,
        Self::NotEquals,
        Self::LessThan,
        Self::LessThanOrEquals,
        Self::MoreThan,
        Self::MoreThanOrEquals,
        Self::Like,
    ];

    /// 稳定的数字 ID
    pub fn id(self) -> u8 {
        self as u8
    }

    /// 规范名称（大写）
    pub fn name(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::LessThan => "LESS_THAN",
            Self::LessThanOrEquals => "LESS_THAN_OR_EQUALS",
            Self::MoreThan => "MORE_THAN",
            Self::MoreThanOrEquals => "MORE_THAN_OR_EQUALS",
            Self::Like => "LIKE",
        }
    }

    /// 字符串渲染时使用的操作符号
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEquals => "<=",
            Self::MoreThan => ">",
            Self::MoreThanOrEquals => ">=",
            Self::Like => "LIKE",
        }
    }

    /// 是否为组合符（AND/OR/NOT）
    pub fn is_combinator(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Not)
    }

    /// 是否为叶子比较操作符
    pub fn is_comparison(self) -> bool {
        !self.is_combinator()
    }

    /// 按 ID 查找
    pub fn from_id(id: i64) -> Option<Self> {
        let id = u8::try_from(id).ok()?;
        registry().by_id.get(&id).copied()
    }

    /// 按名称查找（大小写不敏感）
    pub fn from_name(name: &str) -> Option<Self> {
        registry()
            .by_name
            .get(name.to_ascii_uppercase().as_str())
            .copied()
    }

    /// 从动态值解析：数字按 ID 查找，其余按名称查找
    ///
    /// 找不到时返回 [`PredicateError::InvalidQueryType`]，携带原始值。
    pub fn from_dynamic(value: &Value) -> Result<Self> {
        let found = match value {
            Value::Number(n) => n.as_i64().and_then(Self::from_id),
            Value::String(s) => Self::from_name(s),
            _ => None,
        };

        found.ok_or_else(|| PredicateError::InvalidQueryType(value.clone()))
    }

    /// 预先构建查找表，供启动阶段显式调用
    pub fn warm_up() {
        registry();
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QueryKind {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| PredicateError::InvalidQueryType(Value::from(s)))
    }
}

impl TryFrom<i64> for QueryKind {
    type Error = PredicateError;

    fn try_from(id: i64) -> Result<Self> {
        Self::from_id(id).ok_or_else(|| PredicateError::InvalidQueryType(Value::from(id)))
    }
}

impl Serialize for QueryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for QueryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_dynamic(&value).map_err(serde::de::Error::custom)
    }
}
