//! 叶子条件节点
//!
//! 绑定一个字段名、一个参数名和一份默认参数映射，对候选对象做单次比较。

use crate::error::{PredicateError, Result};
use crate::evaluator::ConditionEvaluator;
use crate::extract::{self, SELF_FIELD};
use crate::models::{ArgumentMap, KeyValuesMap};
use crate::operators::QueryKind;
use crate::predicate::NodeId;
use serde_json::Value;
use std::fmt;

/// 候选对象为键值映射时，表示“任意键”的伪字段
pub const KEY_FIELD: &str = "_key";
/// 候选对象为键值映射时，表示“任意值”的伪字段
pub const VALUE_FIELD: &str = "_val";

/// 叶子条件
///
/// 字段名与参数名在构造后不可修改。
#[derive(Debug, Clone)]
pub struct Condition {
    id: NodeId,
    kind: QueryKind,
    field_name: Option<String>,
    argument_name: String,
    default_arguments: ArgumentMap,
}

impl Condition {
    /// 创建条件，`kind` 必须是比较操作符
    pub fn try_new(
        kind: QueryKind,
        field_name: Option<String>,
        argument_name: impl Into<String>,
        default_arguments: ArgumentMap,
    ) -> Result<Self> {
        if kind.is_combinator() {
            return Err(PredicateError::InvalidArguments(format!(
                "{} 是组合符，不能用于叶子条件",
                kind
            )));
        }

        Ok(Self::build(kind, field_name, argument_name.into(), default_arguments))
    }

    /// 创建作用于指定字段的条件
    pub fn new(
        kind: QueryKind,
        field_name: impl Into<String>,
        argument_name: impl Into<String>,
        default_arguments: ArgumentMap,
    ) -> Result<Self> {
        Self::try_new(kind, Some(field_name.into()), argument_name, default_arguments)
    }

    fn build(
        kind: QueryKind,
        field_name: Option<String>,
        argument_name: String,
        default_arguments: ArgumentMap,
    ) -> Self {
        Self {
            id: NodeId::next(),
            kind,
            field_name,
            argument_name,
            default_arguments,
        }
    }

    pub fn equals(field: impl Into<String>, argument: impl Into<String>, arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::Equals, Some(field.into()), argument.into(), arguments)
    }

    pub fn not_equals(field: impl Into<String>, argument: impl Into<String>, arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::NotEquals, Some(field.into()), argument.into(), arguments)
    }

    pub fn less_than(field: impl Into<String>, argument: impl Into<String>, arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::LessThan, Some(field.into()), argument.into(), arguments)
    }

    pub fn less_than_or_equals(
        field: impl Into<String>,
        argument: impl Into<String>,
        arguments: ArgumentMap,
    ) -> Self {
        Self::build(QueryKind::LessThanOrEquals, Some(field.into()), argument.into(), arguments)
    }

    pub fn more_than(field: impl Into<String>, argument: impl Into<String>, arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::MoreThan, Some(field.into()), argument.into(), arguments)
    }

    pub fn more_than_or_equals(
        field: impl Into<String>,
        argument: impl Into<String>,
        arguments: ArgumentMap,
    ) -> Self {
        Self::build(QueryKind::MoreThanOrEquals, Some(field.into()), argument.into(), arguments)
    }

    pub fn like(field: impl Into<String>, argument: impl Into<String>, arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::Like, Some(field.into()), argument.into(), arguments)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub fn argument_name(&self) -> &str {
        &self.argument_name
    }

    pub fn default_arguments(&self) -> &ArgumentMap {
        &self.default_arguments
    }

    /// 默认参数映射中本条件参数名对应的值
    pub fn default_argument_value(&self) -> Option<&Value> {
        extract::fetch_argument(&self.default_arguments, &self.argument_name)
    }

    /// 使用默认参数映射测试候选对象
    pub fn test(&self, candidate: &Value) -> bool {
        self.test_with_args(candidate, &self.default_arguments)
    }

    /// 使用调用方提供的参数映射测试候选对象
    pub fn test_with_args(&self, candidate: &Value, arguments: &ArgumentMap) -> bool {
        let argument_value = extract::fetch_argument(arguments, &self.argument_name);

        if let Value::Object(map) = candidate {
            match self.field_name.as_deref() {
                Some(field) if field.eq_ignore_ascii_case(KEY_FIELD) => {
                    return map
                        .keys()
                        .any(|key| self.compare(Some(&Value::String(key.clone())), argument_value));
                }
                Some(field) if field.eq_ignore_ascii_case(VALUE_FIELD) => {
                    return map.values().any(|value| self.compare(Some(value), argument_value));
                }
                _ => {}
            }
        }

        let field_value = extract::get_field_value(candidate, self.field_name.as_deref());
        self.compare(field_value, argument_value)
    }

    /// 按本条件的操作符比较字段值与参数值
    pub fn compare(&self, field_value: Option<&Value>, argument_value: Option<&Value>) -> bool {
        ConditionEvaluator::evaluate(self.kind, field_value, argument_value)
    }

    /// 把 (字段名, 默认参数值) 追加到字段名对应的桶中
    pub fn key_values_map<'m>(&self, acc: &'m mut KeyValuesMap) -> &'m mut KeyValuesMap {
        if let Some(field) = &self.field_name {
            let value = self.default_argument_value().cloned().unwrap_or(Value::Null);
            acc.entry(field.clone())
                .or_default()
                .push((field.clone(), value));
        }
        acc
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.field_name == other.field_name
            && self.argument_name == other.argument_name
            && self.default_arguments == other.default_arguments
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" {} :{}",
            self.field_name.as_deref().unwrap_or(SELF_FIELD),
            self.kind.symbol(),
            self.argument_name
        )
    }
}
