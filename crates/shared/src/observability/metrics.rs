//! Prometheus 指标模块
//!
//! 基于 metrics crate 记录指标。记录器由嵌入应用决定是否安装；
//! 未安装时所有记录函数都是空操作。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::info;

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 安装 Prometheus 记录器
///
/// 返回本次调用是否完成了安装。
pub fn init(config: &ObservabilityConfig) -> Result<bool> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(false);
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let installed = PROMETHEUS_HANDLE.set(handle).is_ok();

    register_common_metrics(&config.service_name);
    info!("Prometheus recorder installed");

    Ok(installed)
}

/// 注册指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("predicate_searches_total", "Total number of predicate searches");
    metrics::describe_counter!(
        "predicate_candidates_scanned_total",
        "Total number of candidates scanned by searches"
    );
    metrics::describe_counter!(
        "predicate_candidates_matched_total",
        "Total number of candidates matched by searches"
    );
    metrics::describe_histogram!(
        "predicate_search_duration_seconds",
        "Predicate search duration in seconds"
    );
    metrics::describe_counter!(
        "predicate_evaluations_total",
        "Total number of traced predicate evaluations"
    );
    metrics::describe_counter!(
        "service_starts_total",
        "Number of times the embedding service installed the metrics recorder"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// 渲染当前指标快照，未安装记录器时返回 `None`
pub fn render() -> Option<String> {
    get_handle().map(PrometheusHandle::render)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一次搜索
#[inline]
pub fn record_search(scanned: u64, matched: u64, duration_secs: f64) {
    metrics::counter!("predicate_searches_total").increment(1);
    metrics::counter!("predicate_candidates_scanned_total").increment(scanned);
    metrics::counter!("predicate_candidates_matched_total").increment(matched);
    metrics::histogram!("predicate_search_duration_seconds").record(duration_secs);
}

/// 记录一次带追踪的求值
#[inline]
pub fn record_evaluation(kind: &str, matched: bool) {
    metrics::counter!(
        "predicate_evaluations_total",
        "kind" => kind.to_string(),
        "matched" => matched.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        record_search(10, 3, 0.001);
        record_search(0, 0, 0.0);
        record_evaluation("AND", true);
        record_evaluation("LIKE", false);
    }

    #[test]
    fn test_register_common_metrics_without_recorder() {
        register_common_metrics("search-service");
        register_common_metrics("");
    }
}
