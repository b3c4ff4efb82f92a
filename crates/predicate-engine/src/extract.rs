//! 值提取工具
//!
//! 只识别键值映射（JSON 对象）和数组下标，不做任何反射式的字段访问。
//! 取值失败一律回落为 `None`/默认值，不返回错误。

use serde_json::{Map, Value};

/// 代表候选对象本身的保留字段名
pub const SELF_FIELD: &str = "this";

/// 判断字段名是否指向候选对象本身
pub fn is_self_reference(field_name: Option<&str>) -> bool {
    field_name.is_none_or(|name| name.eq_ignore_ascii_case(SELF_FIELD))
}

/// 按路径逐级取嵌套值
///
/// `path` 可以是任意字符串片段序列，调用方的路径不会被修改。
/// 当前节点缺失、为 null，或某一级键不存在时返回 `None`。
pub fn fetch_nested_value<'a, I>(root: Option<&'a Value>, path: I) -> Option<&'a Value>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut current = root?;

    for key in path {
        current = step(current, key.as_ref())?;
    }

    Some(current)
}

/// 按点号分隔的路径取值，如 "user.profile.age" 或 "items.0.name"
pub fn fetch_dotted_value<'a>(root: Option<&'a Value>, path: &str) -> Option<&'a Value> {
    fetch_nested_value(root, path.split('.'))
}

/// 同 [`fetch_dotted_value`]，取不到时返回 `fallback`
pub fn fetch_nested_value_or<'a>(root: Option<&'a Value>, path: &str, fallback: &'a Value) -> &'a Value {
    fetch_dotted_value(root, path).unwrap_or(fallback)
}

/// 在参数映射中按点号路径取参数值
///
/// 第一级直接查映射，其余各级按 [`fetch_nested_value`] 规则继续。
pub fn fetch_argument<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let mut parts = name.split('.');
    let head = parts.next()?;
    fetch_nested_value(arguments.get(head), parts)
}

/// 解析候选对象上的字段值
///
/// - 字段名为空或为 "this"（大小写不敏感）时返回候选对象本身
/// - 候选对象是键值映射时按键取值
/// - 其他形状一律视为不存在
pub fn get_field_value<'a>(candidate: &'a Value, field_name: Option<&str>) -> Option<&'a Value> {
    if is_self_reference(field_name) {
        return Some(candidate);
    }

    match (candidate, field_name) {
        (Value::Object(map), Some(name)) => map.get(name),
        _ => None,
    }
}

fn step<'a>(current: &'a Value, key: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(key),
        Value::Array(arr) => {
            let index: usize = key.parse().ok()?;
            arr.get(index)
        }
        _ => None,
    }
}
