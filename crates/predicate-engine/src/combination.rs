//! 组合条件节点（AND / OR / NOT）
//!
//! 组合节点独占自己的子节点列表，子节点顺序决定字符串渲染和参数输出的顺序。

use crate::error::{PredicateError, Result};
use crate::executor::EvaluationObserver;
use crate::models::{ArgumentMap, KeyValuesMap};
use crate::operators::QueryKind;
use crate::predicate::{NodeId, Predicate};
use serde_json::Value;
use std::fmt;

/// 组合条件
#[derive(Debug, Clone)]
pub struct Combination {
    id: NodeId,
    kind: QueryKind,
    children: Vec<Predicate>,
    default_arguments: ArgumentMap,
}

impl Combination {
    /// 由有序子节点列表创建，`kind` 必须是组合符
    pub fn new(kind: QueryKind, children: Vec<Predicate>, default_arguments: ArgumentMap) -> Result<Self> {
        if !kind.is_combinator() {
            return Err(PredicateError::InvalidArguments(format!(
                "{} 不是组合符，不能用于组合条件",
                kind
            )));
        }

        Ok(Self::build(kind, children, default_arguments))
    }

    /// 两个子节点的便捷形式
    pub fn pair(
        kind: QueryKind,
        left: impl Into<Predicate>,
        right: impl Into<Predicate>,
        default_arguments: ArgumentMap,
    ) -> Result<Self> {
        Self::new(kind, vec![left.into(), right.into()], default_arguments)
    }

    fn build(kind: QueryKind, children: Vec<Predicate>, default_arguments: ArgumentMap) -> Self {
        Self {
            id: NodeId::next(),
            kind,
            children,
            default_arguments,
        }
    }

    pub fn and(children: Vec<Predicate>, default_arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::And, children, default_arguments)
    }

    pub fn or(children: Vec<Predicate>, default_arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::Or, children, default_arguments)
    }

    /// 单子节点取反
    pub fn not(child: impl Into<Predicate>, default_arguments: ArgumentMap) -> Self {
        Self::build(QueryKind::Not, vec![child.into()], default_arguments)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn default_arguments(&self) -> &ArgumentMap {
        &self.default_arguments
    }

    pub fn children(&self) -> &[Predicate] {
        &self.children
    }

    /// 可原地修改的子节点列表
    pub fn children_mut(&mut self) -> &mut Vec<Predicate> {
        &mut self.children
    }

    /// 使用默认参数映射测试候选对象
    pub fn test(&self, candidate: &Value) -> bool {
        self.test_with_args(candidate, &self.default_arguments)
    }

    /// 使用给定参数映射测试候选对象，参数映射原样传给每个子节点
    pub fn test_with_args(&self, candidate: &Value, arguments: &ArgumentMap) -> bool {
        self.evaluate_with(candidate, arguments, &mut ())
    }

    /// 按子节点顺序短路求值
    ///
    /// - AND：至少一个子节点且全部匹配；遇到第一个不匹配立即返回
    /// - OR：任一子节点匹配；遇到第一个匹配立即返回，空列表不匹配
    /// - NOT：至少一个子节点且没有任何子节点匹配；遇到第一个匹配立即返回
    ///
    /// 空列表对任何组合符都不匹配。
    pub fn evaluate_with<O>(&self, candidate: &Value, arguments: &ArgumentMap, observer: &mut O) -> bool
    where
        O: EvaluationObserver + ?Sized,
    {
        let matched = match self.kind {
            QueryKind::And => {
                let mut result = false;
                for (i, child) in self.children.iter().enumerate() {
                    if !child.evaluate_with(candidate, arguments, observer) {
                        observer.on_short_circuit(self, i);
                        return self.finish(false, observer);
                    }
                    result = true;
                }
                result
            }
            QueryKind::Or => {
                let mut result = false;
                for (i, child) in self.children.iter().enumerate() {
                    if child.evaluate_with(candidate, arguments, observer) {
                        observer.on_short_circuit(self, i);
                        result = true;
                        break;
                    }
                }
                result
            }
            QueryKind::Not => {
                let mut result = !self.children.is_empty();
                for (i, child) in self.children.iter().enumerate() {
                    if child.evaluate_with(candidate, arguments, observer) {
                        observer.on_short_circuit(self, i);
                        result = false;
                        break;
                    }
                }
                result
            }
            _ => false,
        };

        self.finish(matched, observer)
    }

    fn finish<O>(&self, matched: bool, observer: &mut O) -> bool
    where
        O: EvaluationObserver + ?Sized,
    {
        observer.on_combination(self, matched);
        matched
    }

    /// 依次合并每个子节点的键值映射
    pub fn key_values_map<'m>(&self, acc: &'m mut KeyValuesMap) -> &'m mut KeyValuesMap {
        self.children
            .iter()
            .fold(acc, |acc, child| child.key_values_map(acc))
    }

    fn render_joined(&self, separator: &str) -> String {
        self.children
            .iter()
            .map(|child| {
                if child.is_combinator() {
                    format!("( {} )", child)
                } else {
                    child.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl PartialEq for Combination {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.children == other.children
            && self.default_arguments == other.default_arguments
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 一元渲染取决于组合符类型，而不是子节点数量
        let rendered = match (self.kind, self.children.as_slice()) {
            (QueryKind::Not, []) => "NOT()".to_string(),
            (QueryKind::Not, [only]) => format!("NOT( {} )", only),
            (QueryKind::Not, _) => format!("NOT( {} )", self.render_joined(" OR ")),
            (kind, _) => self.render_joined(&format!(" {} ", kind.symbol())),
        };

        f.write_str(rendered.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use serde_json::json;

    fn args(value: Value) -> ArgumentMap {
        match value {
            Value::Object(map) => map,
            _ => ArgumentMap::new(),
        }
    }

    fn age_eq(arguments: &ArgumentMap) -> Predicate {
        Condition::equals("age", "0", arguments.clone()).into()
    }

    fn name_eq(arguments: &ArgumentMap) -> Predicate {
        Condition::equals("name", "1", arguments.clone()).into()
    }

    #[test]
    fn test_rejects_leaf_kind() {
        let result = Combination::new(QueryKind::Equals, vec![], ArgumentMap::new());
        assert!(matches!(result, Err(PredicateError::InvalidArguments(_))));
    }

    #[test]
    fn test_empty_combinations() {
        let candidate = json!({"age": 1});
        assert!(!Combination::and(vec![], ArgumentMap::new()).test(&candidate));
        assert!(!Combination::or(vec![], ArgumentMap::new()).test(&candidate));
        assert!(!Combination::new(QueryKind::Not, vec![], ArgumentMap::new())
            .unwrap()
            .test(&candidate));
    }

    #[test]
    fn test_and() {
        let a = args(json!({"0": 30, "1": "bob"}));
        let group = Combination::pair(QueryKind::And, age_eq(&a), name_eq(&a), a.clone()).unwrap();

        assert!(group.test(&json!({"age": 30, "name": "bob"})));
        assert!(!group.test(&json!({"age": 30, "name": "alice"})));
        assert!(!group.test(&json!({"age": 31, "name": "bob"})));
    }

    #[test]
    fn test_arguments_flow_to_children() {
        let a = args(json!({"0": 30, "1": "bob"}));
        let group = Combination::and(vec![age_eq(&a), name_eq(&a)], a);

        let other = args(json!({"0": 40, "1": "eve"}));
        assert!(group.test_with_args(&json!({"age": 40, "name": "eve"}), &other));
        assert!(!group.test(&json!({"age": 40, "name": "eve"})));
    }

    #[test]
    fn test_or_and_not() {
        let a = args(json!({"0": 30, "1": "bob"}));
        let or = Combination::or(vec![age_eq(&a), name_eq(&a)], a.clone());
        assert!(or.test(&json!({"age": 1, "name": "bob"})));
        assert!(!or.test(&json!({"age": 1, "name": "eve"})));

        let not = Combination::not(age_eq(&a), a);
        assert!(not.test(&json!({"age": 1})));
        assert!(!not.test(&json!({"age": 30})));
    }

    #[test]
    fn test_display() {
        let a = ArgumentMap::new();
        let and = Combination::and(vec![age_eq(&a), name_eq(&a)], a.clone());
        assert_eq!(and.to_string(), "\"age\" = :0 AND \"name\" = :1");

        let nested = Combination::or(vec![and.clone().into(), age_eq(&a)], a.clone());
        assert_eq!(
            nested.to_string(),
            "( \"age\" = :0 AND \"name\" = :1 ) OR \"age\" = :0"
        );

        let not = Combination::not(age_eq(&a), a.clone());
        assert_eq!(not.to_string(), "NOT( \"age\" = :0 )");

        let not_group = Combination::not(and, a.clone());
        assert_eq!(not_group.to_string(), "NOT( \"age\" = :0 AND \"name\" = :1 )");
    }

    #[test]
    fn test_single_child_or_is_not_unary() {
        let a = ArgumentMap::new();
        let or = Combination::or(vec![age_eq(&a)], a);
        assert_eq!(or.to_string(), "\"age\" = :0");
    }

    #[test]
    fn test_children_mut_is_live() {
        let a = ArgumentMap::new();
        let mut group = Combination::and(vec![age_eq(&a)], a.clone());
        group.children_mut().push(name_eq(&a));
        assert_eq!(group.children().len(), 2);
    }
}
