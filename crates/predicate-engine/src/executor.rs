//! 谓词执行器
//!
//! 在普通求值之上记录匹配条件和评估追踪信息。求值逻辑与 `Predicate::test` 共用同一份实现，
//! 区别只在于传入的观察者。

use crate::combination::Combination;
use crate::condition::Condition;
use crate::models::{ArgumentMap, EvaluationResult};
use crate::predicate::Predicate;
use predicate_shared::observability::metrics;
use serde_json::Value;
use std::time::Instant;
use tracing::{instrument, trace};

/// 求值观察者
///
/// 所有回调都有空的默认实现。
pub trait EvaluationObserver {
    /// 叶子条件求值完成
    fn on_condition(&mut self, _condition: &Condition, _matched: bool) {}

    /// 组合节点在第 `index` 个子节点处短路
    fn on_short_circuit(&mut self, _combination: &Combination, _index: usize) {}

    /// 组合节点求值完成
    fn on_combination(&mut self, _combination: &Combination, _matched: bool) {}
}

/// 不做任何记录
impl EvaluationObserver for () {}

/// 谓词执行器
pub struct PredicateExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl PredicateExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 按配置决定是否启用追踪
    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// 使用谓词自身的默认参数映射执行
    pub fn execute(&self, predicate: &Predicate, candidate: &Value) -> EvaluationResult {
        self.execute_with_args(predicate, candidate, predicate.default_arguments())
    }

    /// 使用给定参数映射执行
    #[instrument(skip_all, fields(predicate_id = %predicate.id(), kind = %predicate.kind()))]
    pub fn execute_with_args(
        &self,
        predicate: &Predicate,
        candidate: &Value,
        arguments: &ArgumentMap,
    ) -> EvaluationResult {
        let start = Instant::now();

        let mut recorder = TraceRecorder {
            trace_enabled: self.trace_enabled,
            result: EvaluationResult::new(),
        };

        let matched = predicate.evaluate_with(candidate, arguments, &mut recorder);

        let mut result = recorder.result;
        result.matched = matched;
        result.evaluation_time_us = start.elapsed().as_micros() as u64;

        metrics::record_evaluation(predicate.kind().name(), matched);
        trace!(matched, evaluated = result.evaluated_nodes.len(), "谓词执行完成");
        result
    }
}

impl Default for PredicateExecutor {
    fn default() -> Self {
        Self::new()
    }
}

struct TraceRecorder {
    trace_enabled: bool,
    result: EvaluationResult,
}

impl EvaluationObserver for TraceRecorder {
    fn on_condition(&mut self, condition: &Condition, matched: bool) {
        self.result.evaluated_nodes.push(condition.id());

        if self.trace_enabled {
            self.result.evaluation_trace.push(format!(
                "{}: {} => {}",
                condition.id(),
                condition,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        if matched {
            self.result.matched_conditions.push(condition.to_string());
        }
    }

    fn on_short_circuit(&mut self, combination: &Combination, index: usize) {
        if self.trace_enabled {
            self.result.evaluation_trace.push(format!(
                "{}: {} 短路 - 子节点 {} 决定结果",
                combination.id(),
                combination.kind(),
                index
            ));
        }
    }

    fn on_combination(&mut self, combination: &Combination, matched: bool) {
        if self.trace_enabled {
            self.result.evaluation_trace.push(format!(
                "{}: {} 组 (共 {} 个子节点) => {}",
                combination.id(),
                combination.kind(),
                combination.children().len(),
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }
    }
}
