//! 谓词引擎领域模型

use crate::condition::Condition;
use crate::predicate::{NodeId, Predicate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 参数映射：参数名 → 参数值
pub type ArgumentMap = Map<String, Value>;

/// 字段名 → 引用该字段的叶子条件
pub type FieldQueryMap<'t> = IndexMap<String, Vec<&'t Condition>>;

/// 字段名 → (字段名, 默认参数值) 列表
pub type KeyValuesMap = IndexMap<String, Vec<(String, Value)>>;

/// 谓词定义（可序列化的交换格式）
///
/// `kind` 可以写规范名称或数字 ID；组合节点使用 `children` 列表，
/// 或者 `left`/`right` 两个子节点的便捷形式。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateDefinition {
    pub kind: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: ArgumentMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<PredicateDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Box<PredicateDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Box<PredicateDefinition>>,
}

impl From<Predicate> for PredicateDefinition {
    fn from(predicate: Predicate) -> Self {
        predicate.to_definition()
    }
}

/// 评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    /// 匹配成功的叶子条件（字符串形式）
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    /// 实际被求值的叶子，按求值顺序
    #[serde(skip)]
    pub evaluated_nodes: Vec<NodeId>,
    pub evaluation_time_us: u64,
}

impl EvaluationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定叶子是否被求值过
    pub fn was_evaluated(&self, id: NodeId) -> bool {
        self.evaluated_nodes.contains(&id)
    }
}
