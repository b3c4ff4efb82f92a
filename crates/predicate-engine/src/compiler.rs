//! 谓词编译器
//!
//! 将 JSON 谓词定义解析并编译成内存中的谓词树。
//! 参数映射自上而下继承：节点的默认参数 = 父节点的默认参数叠加自身的 `arguments`。

use crate::combination::Combination;
use crate::condition::Condition;
use crate::error::{PredicateError, Result};
use crate::models::{ArgumentMap, PredicateDefinition};
use crate::operators::QueryKind;
use crate::predicate::Predicate;
use tracing::{debug, instrument};

/// 谓词编译器
#[derive(Debug)]
pub struct PredicateCompiler {
    /// 已编译的节点总数
    compiled_nodes: u64,
    /// 子节点是否继承父节点的参数映射
    inherit_arguments: bool,
}

impl PredicateCompiler {
    pub fn new() -> Self {
        Self {
            compiled_nodes: 0,
            inherit_arguments: true,
        }
    }

    /// 不做参数继承，每个节点只使用定义中自己的 `arguments`
    ///
    /// 用于还原 [`Predicate::to_definition`] 的输出，其中每个节点已带有完整的参数映射。
    pub fn exact() -> Self {
        Self {
            compiled_nodes: 0,
            inherit_arguments: false,
        }
    }

    /// 已编译的节点总数
    pub fn compiled_nodes(&self) -> u64 {
        self.compiled_nodes
    }

    /// 从 JSON 字符串编译
    #[instrument(skip_all)]
    pub fn compile_from_json(&mut self, json: &str) -> Result<Predicate> {
        let definition: PredicateDefinition = serde_json::from_str(json)?;
        self.compile(&definition)
    }

    /// 编译谓词定义
    pub fn compile(&mut self, definition: &PredicateDefinition) -> Result<Predicate> {
        let predicate = self.compile_node(definition, &ArgumentMap::new(), "root")?;
        debug!(predicate = %predicate, total = self.compiled_nodes, "谓词编译完成");
        Ok(predicate)
    }

    fn compile_node(
        &mut self,
        def: &PredicateDefinition,
        inherited: &ArgumentMap,
        path: &str,
    ) -> Result<Predicate> {
        let kind = QueryKind::from_dynamic(&def.kind)?;

        let mut arguments = if self.inherit_arguments {
            inherited.clone()
        } else {
            ArgumentMap::new()
        };
        arguments.extend(def.arguments.iter().map(|(k, v)| (k.clone(), v.clone())));

        let predicate = if kind.is_combinator() {
            self.compile_combination(kind, def, arguments, path)?
        } else {
            self.compile_condition(kind, def, arguments, path)?
        };

        self.compiled_nodes += 1;
        Ok(predicate)
    }

    fn compile_condition(
        &mut self,
        kind: QueryKind,
        def: &PredicateDefinition,
        arguments: ArgumentMap,
        path: &str,
    ) -> Result<Predicate> {
        if def.children.is_some() || def.left.is_some() || def.right.is_some() {
            return Err(PredicateError::InvalidArguments(format!(
                "条件 '{}' 是 {} 叶子，不能包含子节点",
                path, kind
            )));
        }

        let argument = def.argument.as_deref().ok_or_else(|| {
            PredicateError::InvalidArguments(format!("条件 '{}' 缺少参数名", path))
        })?;

        if argument.is_empty() {
            return Err(PredicateError::ParseError(format!(
                "条件 '{}' 的参数名不能为空",
                path
            )));
        }

        if def.field.as_deref().is_some_and(str::is_empty) {
            return Err(PredicateError::ParseError(format!(
                "条件 '{}' 的字段不能为空",
                path
            )));
        }

        Condition::try_new(kind, def.field.clone(), argument, arguments).map(Predicate::from)
    }

    fn compile_combination(
        &mut self,
        kind: QueryKind,
        def: &PredicateDefinition,
        arguments: ArgumentMap,
        path: &str,
    ) -> Result<Predicate> {
        if def.field.is_some() || def.argument.is_some() {
            return Err(PredicateError::InvalidArguments(format!(
                "组合条件 '{}' 不能设置字段或参数名",
                path
            )));
        }

        let children = match (&def.children, &def.left, &def.right) {
            (Some(children), None, None) => children
                .iter()
                .enumerate()
                .map(|(i, child)| {
                    self.compile_node(child, &arguments, &format!("{}.children[{}]", path, i))
                })
                .collect::<Result<Vec<_>>>()?,
            (None, Some(left), Some(right)) => vec![
                self.compile_node(left, &arguments, &format!("{}.left", path))?,
                self.compile_node(right, &arguments, &format!("{}.right", path))?,
            ],
            _ => {
                return Err(PredicateError::InvalidArguments(format!(
                    "组合条件 '{}' 需要 children 列表或 left/right 两个子节点",
                    path
                )));
            }
        };

        Combination::new(kind, children, arguments).map(Predicate::from)
    }
}

impl TryFrom<PredicateDefinition> for Predicate {
    type Error = PredicateError;

    fn try_from(definition: PredicateDefinition) -> Result<Self> {
        PredicateCompiler::exact().compile(&definition)
    }
}

impl Default for PredicateCompiler {
    fn default() -> Self {
        Self::new()
    }
}
