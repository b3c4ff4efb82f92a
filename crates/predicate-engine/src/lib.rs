//! 内存谓词引擎
//!
//! 提供可组合的条件树，支持：
//! - 对任意 JSON 记录求值和批量搜索
//! - 字符串渲染与 SQL 占位符渲染
//! - 字段索引、参数提取等树内省操作，以及按节点标识的子树替换
//! - JSON 谓词定义的解析和编译

pub mod combination;
pub mod compiler;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod extract;
pub mod models;
pub mod operators;
pub mod predicate;

pub use combination::Combination;
pub use compiler::PredicateCompiler;
pub use condition::Condition;
pub use error::{PredicateError, Result};
pub use evaluator::ConditionEvaluator;
pub use executor::{EvaluationObserver, PredicateExecutor};
pub use extract::{fetch_dotted_value, fetch_nested_value, fetch_nested_value_or, get_field_value};
pub use models::{ArgumentMap, EvaluationResult, FieldQueryMap, KeyValuesMap, PredicateDefinition};
pub use operators::QueryKind;
pub use predicate::{CandidateSource, NodeId, Predicate};

use predicate_shared::config::AppConfig;
use predicate_shared::observability;
use tracing::info;

/// 启动阶段的显式初始化
///
/// 初始化日志/指标，预先构建查询类型查找表，并固定 LIKE 模式缓存容量。
/// 重复调用是安全的，只有第一次的缓存容量生效。
pub fn init(config: &AppConfig) -> anyhow::Result<()> {
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    observability::init(&obs_config)?;

    QueryKind::warm_up();
    let capacity_applied = evaluator::configure_like_cache(config.engine.like_cache_capacity);

    info!(
        service = %config.service_name,
        like_cache_capacity = config.engine.like_cache_capacity,
        capacity_applied,
        "Predicate engine initialized"
    );

    Ok(())
}

/// 按配置创建执行器
pub fn executor_from_config(config: &AppConfig) -> PredicateExecutor {
    PredicateExecutor::new().with_trace_enabled(config.engine.trace_evaluation)
}
