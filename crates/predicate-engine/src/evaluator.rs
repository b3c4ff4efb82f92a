//! 条件评估器
//!
//! 实现各叶子操作符的比较逻辑。比较是宽松的：类型不可比较、值缺失等情况
//! 一律返回 false，不产生错误。

use crate::operators::QueryKind;
use dashmap::DashMap;
use regex::Regex;
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::sync::OnceLock;
use tracing::{trace, warn};

/// LIKE 模式缓存的默认容量
pub const DEFAULT_LIKE_CACHE_CAPACITY: usize = 1024;

static LIKE_CACHE: OnceLock<DashMap<String, Regex>> = OnceLock::new();
static LIKE_CACHE_CAPACITY: OnceLock<usize> = OnceLock::new();

/// 设置 LIKE 模式缓存容量，只有第一次调用生效
///
/// 返回本次设置是否生效。
pub fn configure_like_cache(capacity: usize) -> bool {
    LIKE_CACHE_CAPACITY.set(capacity).is_ok()
}

fn like_cache_capacity() -> usize {
    *LIKE_CACHE_CAPACITY.get_or_init(|| DEFAULT_LIKE_CACHE_CAPACITY)
}

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `kind` - 叶子操作符类型
    /// * `field_value` - 从候选对象中取出的字段值
    /// * `argument_value` - 从参数映射中取出的比较值
    pub fn evaluate(kind: QueryKind, field_value: Option<&Value>, argument_value: Option<&Value>) -> bool {
        match kind {
            QueryKind::Equals => Self::eq(field_value, argument_value),
            QueryKind::NotEquals => !Self::eq(field_value, argument_value),
            QueryKind::LessThan => Self::compare(field_value, argument_value, Ordering::is_lt),
            QueryKind::LessThanOrEquals => Self::compare(field_value, argument_value, Ordering::is_le),
            QueryKind::MoreThan => Self::compare(field_value, argument_value, Ordering::is_gt),
            QueryKind::MoreThanOrEquals => Self::compare(field_value, argument_value, Ordering::is_ge),
            QueryKind::Like => Self::like(field_value, argument_value),
            QueryKind::And | QueryKind::Or | QueryKind::Not => {
                trace!(%kind, "组合符不参与叶子比较");
                false
            }
        }
    }

    /// 相等比较，缺失与 null 视为相同
    fn eq(field: Option<&Value>, expected: Option<&Value>) -> bool {
        let field = field.unwrap_or(&Value::Null);
        let expected = expected.unwrap_or(&Value::Null);

        // 数值统一比较，避免 100 与 100.0 判为不等
        if let (Value::Number(a), Value::Number(b)) = (field, expected) {
            return Self::compare_numbers(a, b) == Some(Ordering::Equal);
        }

        field == expected
    }

    /// 有序比较，只支持数值与数值、字符串与字符串
    fn compare<F>(field: Option<&Value>, expected: Option<&Value>, cmp: F) -> bool
    where
        F: Fn(Ordering) -> bool,
    {
        let ordering = match (field, expected) {
            (Some(Value::Number(a)), Some(Value::Number(b))) => Self::compare_numbers(a, b),
            (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
            _ => None,
        };

        ordering.is_some_and(cmp)
    }

    fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            return Some(x.cmp(&y));
        }
        if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
            return Some(x.cmp(&y));
        }
        a.as_f64()?.partial_cmp(&b.as_f64()?)
    }

    /// SQL LIKE 匹配：`%` 匹配任意长度，`_` 匹配单个字符，`\` 转义
    fn like(field: Option<&Value>, pattern: Option<&Value>) -> bool {
        let (Some(Value::String(s)), Some(Value::String(pattern))) = (field, pattern) else {
            return false;
        };

        let cache = LIKE_CACHE.get_or_init(DashMap::new);
        if let Some(regex) = cache.get(pattern) {
            return regex.is_match(s);
        }

        let regex = match Regex::new(&like_to_regex(pattern)) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "LIKE 模式编译失败");
                return false;
            }
        };

        let matched = regex.is_match(s);
        if cache.len() < like_cache_capacity() {
            cache.insert(pattern.clone(), regex);
        }
        matched
    }
}

/// 把 LIKE 模式翻译成整串匹配的正则表达式
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                None => out.push_str(&regex::escape("\\")),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}
