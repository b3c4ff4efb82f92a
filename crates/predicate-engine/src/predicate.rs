//! 谓词树
//!
//! [`Predicate`] 是所有节点的统一入口：测试、搜索、字符串/SQL 渲染，
//! 以及整棵树的内省（字段索引、参数提取）和改写（节点替换）。
//! 节点不记录父节点，改写总是自顶向下递归查找并原地替换。

use crate::combination::Combination;
use crate::condition::Condition;
use crate::executor::EvaluationObserver;
use crate::extract;
use crate::models::{ArgumentMap, FieldQueryMap, KeyValuesMap, PredicateDefinition};
use crate::operators::QueryKind;
use indexmap::IndexMap;
use predicate_shared::observability::metrics;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{self, AtomicU64};
use std::time::Instant;
use tracing::debug;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// 节点标识
///
/// 构造时分配，进程内唯一。克隆保留标识：克隆出来的节点被视为同一个节点出现在另一个位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, atomic::Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 谓词节点（叶子条件或组合条件）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PredicateDefinition", try_from = "PredicateDefinition")]
pub enum Predicate {
    Condition(Condition),
    Combination(Combination),
}

/// 可被搜索的候选集合
pub trait CandidateSource<'a> {
    fn candidates(self) -> Box<dyn Iterator<Item = &'a Value> + 'a>;
}

impl<'a> CandidateSource<'a> for &'a [Value] {
    fn candidates(self) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        Box::new(self.iter())
    }
}

impl<'a> CandidateSource<'a> for &'a Vec<Value> {
    fn candidates(self) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        Box::new(self.iter())
    }
}

impl<'a> CandidateSource<'a> for &'a Map<String, Value> {
    fn candidates(self) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        Box::new(self.values())
    }
}

/// JSON 数组按元素搜索，JSON 对象按值搜索，其他值视为单个候选
impl<'a> CandidateSource<'a> for &'a Value {
    fn candidates(self) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        match self {
            Value::Array(arr) => Box::new(arr.iter()),
            Value::Object(map) => Box::new(map.values()),
            other => Box::new(std::iter::once(other)),
        }
    }
}

/// 位置占位符：`:` 后接 ASCII 数字，可带点号分隔的嵌套段（如 `:0.min`）
///
/// SQL 文本和绑定参数都只通过这一个模式识别占位符。
fn positional_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r":[0-9]+(?:\.[A-Za-z0-9_]+)*\b").expect("positional marker pattern is valid")
    })
}

impl Predicate {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Condition(c) => c.id(),
            Self::Combination(g) => g.id(),
        }
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            Self::Condition(c) => c.kind(),
            Self::Combination(g) => g.kind(),
        }
    }

    pub fn operator_symbol(&self) -> &'static str {
        self.kind().symbol()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Condition(_))
    }

    pub fn is_combinator(&self) -> bool {
        matches!(self, Self::Combination(_))
    }

    pub fn as_condition(&self) -> Option<&Condition> {
        match self {
            Self::Condition(c) => Some(c),
            Self::Combination(_) => None,
        }
    }

    pub fn as_combination(&self) -> Option<&Combination> {
        match self {
            Self::Condition(_) => None,
            Self::Combination(g) => Some(g),
        }
    }

    pub fn default_arguments(&self) -> &ArgumentMap {
        match self {
            Self::Condition(c) => c.default_arguments(),
            Self::Combination(g) => g.default_arguments(),
        }
    }

    /// 叶子节点为 `None`，组合节点为其子节点列表
    pub fn children_query(&self) -> Option<&[Predicate]> {
        self.as_combination().map(Combination::children)
    }

    /// 组合节点可原地修改的子节点列表
    pub fn children_query_mut(&mut self) -> Option<&mut Vec<Predicate>> {
        match self {
            Self::Condition(_) => None,
            Self::Combination(g) => Some(g.children_mut()),
        }
    }

    pub fn test(&self, candidate: &Value) -> bool {
        self.test_with_args(candidate, self.default_arguments())
    }

    pub fn test_with_args(&self, candidate: &Value, arguments: &ArgumentMap) -> bool {
        self.evaluate_with(candidate, arguments, &mut ())
    }

    /// 带观察者的求值，执行器和测试通过观察者记录求值过程
    pub fn evaluate_with<O>(&self, candidate: &Value, arguments: &ArgumentMap, observer: &mut O) -> bool
    where
        O: EvaluationObserver + ?Sized,
    {
        match self {
            Self::Condition(c) => {
                let matched = c.test_with_args(candidate, arguments);
                observer.on_condition(c, matched);
                matched
            }
            Self::Combination(g) => g.evaluate_with(candidate, arguments, observer),
        }
    }

    /// 使用默认参数映射过滤候选集合
    pub fn search<'a, C>(&self, candidates: C) -> Vec<&'a Value>
    where
        C: CandidateSource<'a>,
    {
        self.search_with_args(candidates, self.default_arguments())
    }

    /// 使用给定参数映射过滤候选集合，保持候选原有顺序
    pub fn search_with_args<'a, C>(&self, candidates: C, arguments: &ArgumentMap) -> Vec<&'a Value>
    where
        C: CandidateSource<'a>,
    {
        let start = Instant::now();
        let mut scanned = 0u64;

        let matched: Vec<&'a Value> = candidates
            .candidates()
            .inspect(|_| scanned += 1)
            .filter(|candidate| self.test_with_args(candidate, arguments))
            .collect();

        let elapsed = start.elapsed();
        metrics::record_search(scanned, matched.len() as u64, elapsed.as_secs_f64());

        debug!(
            predicate = %self,
            scanned,
            matched = matched.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "搜索完成"
        );

        matched
    }

    /// 过滤后按调用方给出的全序排序（稳定排序）
    pub fn search_by<'a, C, F>(&self, candidates: C, mut compare: F) -> Vec<&'a Value>
    where
        C: CandidateSource<'a>,
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut matched = self.search(candidates);
        matched.sort_by(|a, b| compare(a, b));
        matched
    }

    /// 字段名 → 引用该字段的叶子条件（按遇到的顺序）
    ///
    /// 没有字段名的叶子不计入。
    pub fn field_query_map(&self) -> FieldQueryMap<'_> {
        let mut acc = FieldQueryMap::new();
        self.collect_field_queries(&mut acc);
        acc
    }

    fn collect_field_queries<'t>(&'t self, acc: &mut FieldQueryMap<'t>) {
        match self {
            Self::Condition(c) => {
                if let Some(field) = c.field_name() {
                    acc.entry(field.to_string()).or_default().push(c);
                }
            }
            Self::Combination(g) => {
                for child in g.children() {
                    child.collect_field_queries(acc);
                }
            }
        }
    }

    /// 把每个叶子的 (字段名, 默认参数值) 累加到 `acc` 中并返回它
    pub fn key_values_map<'m>(&self, acc: &'m mut KeyValuesMap) -> &'m mut KeyValuesMap {
        match self {
            Self::Condition(c) => c.key_values_map(acc),
            Self::Combination(g) => g.key_values_map(acc),
        }
    }

    /// 按节点标识替换子树
    ///
    /// 自身就是 `original` 时直接返回 `replacement`；否则把树中所有标识相同的节点
    /// 替换为 `replacement` 的克隆，并返回（已原地修改的）自身。
    /// 替换进去的节点不会再被递归检查。
    pub fn replace_query(mut self, original: NodeId, replacement: &Predicate) -> Predicate {
        if self.id() == original {
            debug!(original = %original, replacement = %replacement.id(), "替换根节点");
            return replacement.clone();
        }

        let replaced = self.replace_descendants(original, replacement);
        debug!(original = %original, replaced, "子节点替换完成");
        self
    }

    fn replace_descendants(&mut self, original: NodeId, replacement: &Predicate) -> usize {
        let Some(children) = self.children_query_mut() else {
            return 0;
        };

        let mut replaced = 0;
        for child in children.iter_mut() {
            if child.id() == original {
                *child = replacement.clone();
                replaced += 1;
            } else {
                replaced += child.replace_descendants(original, replacement);
            }
        }
        replaced
    }

    /// 先序遍历收集每个叶子的默认参数值，跳过缺失和 null
    pub fn query_arguments_array(&self) -> Vec<Value> {
        self.leaves()
            .into_iter()
            .filter_map(|c| c.default_argument_value())
            .filter(|v| !v.is_null())
            .cloned()
            .collect()
    }

    /// 先序遍历收集 参数名 → 默认参数值，跳过缺失和 null
    pub fn query_arguments_map(&self) -> IndexMap<String, Value> {
        self.leaves()
            .into_iter()
            .filter_map(|c| {
                c.default_argument_value()
                    .filter(|v| !v.is_null())
                    .map(|v| (c.argument_name().to_string(), v.clone()))
            })
            .collect()
    }

    /// 先序（文档顺序）列出所有叶子条件
    pub fn leaves(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'t>(&'t self, out: &mut Vec<&'t Condition>) {
        match self {
            Self::Condition(c) => out.push(c),
            Self::Combination(g) => {
                for child in g.children() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// 把字符串形式中的 `:<数字>` 占位符替换为 `?`
    pub fn to_sql_string(&self) -> String {
        positional_marker()
            .replace_all(&self.to_string(), "?")
            .into_owned()
    }

    /// SQL 语句与按 `?` 顺序排列的绑定参数
    ///
    /// 逐个叶子（先序）在其字符串形式中查找占位符，每个占位符绑定一个值：
    /// 即叶子默认参数映射中以占位符文本（去掉 `:`）为名的参数，未设置时为 null。
    /// 组合符的渲染不含 `:`，占位符不会跨越叶子边界，所以参数个数总是等于 `?` 的个数。
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let marker = positional_marker();
        let params = self
            .leaves()
            .into_iter()
            .flat_map(|c| {
                let rendered = c.to_string();
                marker
                    .find_iter(&rendered)
                    .map(|m| {
                        extract::fetch_argument(c.default_arguments(), &m.as_str()[1..])
                            .cloned()
                            .unwrap_or(Value::Null)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        (self.to_sql_string(), params)
    }

    /// 转换为可序列化的定义
    pub fn to_definition(&self) -> PredicateDefinition {
        match self {
            Self::Condition(c) => PredicateDefinition {
                kind: Value::from(c.kind().name()),
                field: c.field_name().map(str::to_string),
                argument: Some(c.argument_name().to_string()),
                arguments: c.default_arguments().clone(),
                ..Default::default()
            },
            Self::Combination(g) => PredicateDefinition {
                kind: Value::from(g.kind().name()),
                arguments: g.default_arguments().clone(),
                children: Some(g.children().iter().map(Predicate::to_definition).collect()),
                ..Default::default()
            },
        }
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<Combination> for Predicate {
    fn from(combination: Combination) -> Self {
        Self::Combination(combination)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => fmt::Display::fmt(c, f),
            Self::Combination(g) => fmt::Display::fmt(g, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn args(value: Value) -> ArgumentMap {
        match value {
            Value::Object(map) => map,
            _ => ArgumentMap::new(),
        }
    }

    fn people() -> Vec<Value> {
        vec![
            json!({"name": "bob", "age": 30}),
            json!({"name": "alice", "age": 25}),
            json!({"name": "carol", "age": 41}),
            json!({"name": "dave"}),
        ]
    }

    /// 记录被求值的叶子
    #[derive(Default)]
    struct Recorder {
        evaluated: HashSet<NodeId>,
    }

    impl EvaluationObserver for Recorder {
        fn on_condition(&mut self, condition: &Condition, _matched: bool) {
            self.evaluated.insert(condition.id());
        }
    }

    #[test]
    fn test_leaf_and_combinator_are_exclusive() {
        let leaf: Predicate = Condition::equals("age", "0", ArgumentMap::new()).into();
        assert!(leaf.is_leaf() && !leaf.is_combinator());
        assert!(leaf.children_query().is_none());

        let group: Predicate = Combination::and(vec![leaf.clone()], ArgumentMap::new()).into();
        assert!(group.is_combinator() && !group.is_leaf());
        assert_eq!(group.children_query().map(<[Predicate]>::len), Some(1));
    }

    #[test]
    fn test_and_short_circuits() {
        let a = args(json!({"0": 99, "1": "bob"}));
        let first: Predicate = Condition::equals("age", "0", a.clone()).into();
        let second: Predicate = Condition::equals("name", "1", a.clone()).into();
        let (first_id, second_id) = (first.id(), second.id());
        let tree: Predicate = Combination::and(vec![first, second], a.clone()).into();

        let mut recorder = Recorder::default();
        let matched = tree.evaluate_with(&json!({"name": "bob", "age": 30}), &a, &mut recorder);

        assert!(!matched);
        assert!(recorder.evaluated.contains(&first_id));
        assert!(!recorder.evaluated.contains(&second_id));
    }

    #[test]
    fn test_search() {
        let a = args(json!({"0": 28}));
        let tree: Predicate = Condition::more_than("age", "0", a).into();
        let candidates = people();

        let found = tree.search(&candidates);
        assert_eq!(found, vec![&candidates[0], &candidates[2]]);
    }

    #[test]
    fn test_search_mapping_and_json_array() {
        let tree: Predicate = Condition::equals("name", "0", args(json!({"0": "alice"}))).into();

        let by_id = json!({"u1": {"name": "bob"}, "u2": {"name": "alice"}});
        assert_eq!(tree.search(&by_id), vec![&json!({"name": "alice"})]);

        let list = Value::Array(people());
        assert_eq!(tree.search(&list).len(), 1);
    }

    #[test]
    fn test_search_with_args_and_comparator() {
        let tree: Predicate = Condition::more_than("age", "0", args(json!({"0": 100}))).into();
        let candidates = people();
        assert!(tree.search(&candidates).is_empty());

        let found = tree.search_with_args(&candidates, &args(json!({"0": 20})));
        assert_eq!(found.len(), 3);

        let tree: Predicate = Condition::more_than("age", "0", args(json!({"0": 20}))).into();
        let sorted = tree.search_by(&candidates, |a, b| {
            a["age"].as_i64().cmp(&b["age"].as_i64())
        });
        let names: Vec<_> = sorted.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_field_query_map() {
        let a = ArgumentMap::new();
        let leaf1 = Condition::more_than("age", "0", a.clone());
        let leaf2 = Condition::equals("name", "1", a.clone());
        let leaf3 = Condition::less_than("age", "2", a.clone());
        let tree: Predicate = Combination::and(
            vec![
                leaf1.clone().into(),
                Combination::or(vec![leaf2.clone().into(), leaf3.clone().into()], a.clone()).into(),
            ],
            a,
        )
        .into();

        let map = tree.field_query_map();
        assert_eq!(map.len(), 2);

        let age_ids: Vec<_> = map["age"].iter().map(|c| c.id()).collect();
        assert_eq!(age_ids, vec![leaf1.id(), leaf3.id()]);
        let name_ids: Vec<_> = map["name"].iter().map(|c| c.id()).collect();
        assert_eq!(name_ids, vec![leaf2.id()]);
    }

    #[test]
    fn test_field_query_map_skips_self_leaves() {
        let leaf = Condition::try_new(QueryKind::Equals, None, "0", ArgumentMap::new()).unwrap();
        let tree: Predicate = leaf.into();
        assert!(tree.field_query_map().is_empty());
    }

    #[test]
    fn test_replace_root() {
        let original: Predicate = Condition::equals("age", "0", ArgumentMap::new()).into();
        let replacement: Predicate = Condition::equals("name", "1", ArgumentMap::new()).into();
        let original_id = original.id();

        let result = original.replace_query(original_id, &replacement);
        assert_eq!(result.id(), replacement.id());
    }

    #[test]
    fn test_replace_all_occurrences() {
        let a = ArgumentMap::new();
        let shared: Predicate = Condition::equals("age", "0", a.clone()).into();
        let other: Predicate = Condition::equals("name", "1", a.clone()).into();
        let tree: Predicate = Combination::and(
            vec![
                shared.clone(),
                Combination::or(vec![other.clone(), shared.clone()], a.clone()).into(),
            ],
            a,
        )
        .into();
        let tree_id = tree.id();

        let replacement: Predicate = Condition::like("email", "2", ArgumentMap::new()).into();
        let tree = tree.replace_query(shared.id(), &replacement);

        assert_eq!(tree.id(), tree_id);
        assert_eq!(
            tree.to_string(),
            "\"email\" LIKE :2 AND ( \"name\" = :1 OR \"email\" LIKE :2 )"
        );
        assert!(tree.leaves().iter().all(|c| c.id() != shared.id()));
    }

    #[test]
    fn test_replace_missing_is_noop() {
        let a = ArgumentMap::new();
        let tree: Predicate =
            Combination::and(vec![Condition::equals("age", "0", a.clone()).into()], a).into();
        let before = tree.to_string();
        let stranger: Predicate = Condition::equals("x", "9", ArgumentMap::new()).into();

        let tree = tree.replace_query(stranger.id(), &stranger);
        assert_eq!(tree.to_string(), before);
    }

    #[test]
    fn test_query_arguments() {
        let a = args(json!({"0": 10, "1": "bob"}));
        let tree: Predicate = Combination::and(
            vec![
                Condition::equals("age", "0", a.clone()).into(),
                Condition::equals("name", "1", a.clone()).into(),
                Condition::equals("email", "2", a.clone()).into(),
            ],
            a,
        )
        .into();

        assert_eq!(tree.query_arguments_array(), vec![json!(10), json!("bob")]);

        let map = tree.query_arguments_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_index(0), Some((&"0".to_string(), &json!(10))));
        assert_eq!(map.get("1"), Some(&json!("bob")));
    }

    #[test]
    fn test_to_sql_string() {
        let a = ArgumentMap::new();
        let tree: Predicate = Combination::and(
            vec![
                Condition::equals("age", "0", a.clone()).into(),
                Condition::equals("name", "1", a.clone()).into(),
            ],
            a,
        )
        .into();

        assert_eq!(tree.to_string(), "\"age\" = :0 AND \"name\" = :1");
        assert_eq!(tree.to_sql_string(), "\"age\" = ? AND \"name\" = ?");
    }

    #[test]
    fn test_to_sql_keeps_named_placeholders() {
        let a = args(json!({"0": 10, "pattern": "b%"}));
        let tree: Predicate = Combination::and(
            vec![
                Condition::equals("age", "0", a.clone()).into(),
                Condition::like("name", "pattern", a.clone()).into(),
                Condition::equals("email", "1", a.clone()).into(),
            ],
            a,
        )
        .into();

        let (sql, params) = tree.to_sql();
        assert_eq!(sql, "\"age\" = ? AND \"name\" LIKE :pattern AND \"email\" = ?");
        assert_eq!(params, vec![json!(10), Value::Null]);
    }

    #[test]
    fn test_to_sql_nested_and_irregular_argument_names() {
        let a = args(json!({"0": {"min": 18}, "1": "bob", "2": 7, "3": "x"}));
        let tree: Predicate = Combination::and(
            vec![
                Condition::more_than("age", "0.min", a.clone()).into(),
                Condition::equals("name", "1", a.clone()).into(),
                Condition::equals("score", "2-x", a.clone()).into(),
                Condition::equals("tag", "٣", a.clone()).into(),
                Condition::equals("a:3", "9", a.clone()).into(),
            ],
            a,
        )
        .into();

        let (sql, params) = tree.to_sql();
        assert_eq!(
            sql,
            "\"age\" > ? AND \"name\" = ? AND \"score\" = ?-x AND \"tag\" = :٣ AND \"a?\" = ?"
        );
        assert_eq!(sql.matches('?').count(), params.len());
        assert_eq!(
            params,
            vec![json!(18), json!("bob"), json!(7), json!("x"), Value::Null]
        );
    }

    #[test]
    fn test_key_values_map_over_tree() {
        let a = args(json!({"0": 10, "1": 20}));
        let tree: Predicate = Combination::and(
            vec![
                Condition::more_than("age", "0", a.clone()).into(),
                Condition::less_than("age", "1", a.clone()).into(),
            ],
            a,
        )
        .into();

        let mut acc = KeyValuesMap::new();
        let acc = tree.key_values_map(&mut acc);
        assert_eq!(
            acc["age"],
            vec![("age".to_string(), json!(10)), ("age".to_string(), json!(20))]
        );
    }
}
