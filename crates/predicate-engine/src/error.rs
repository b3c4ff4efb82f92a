//! 谓词引擎错误类型
//!
//! 构造和类型解析是严格的，会返回错误；求值过程是宽松的，数据形状不匹配只会得到 false。

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("无效的构造参数: {0}")]
    InvalidArguments(String),

    #[error("无效的查询类型: {0}")]
    InvalidQueryType(Value),

    #[error("谓词定义解析失败: {0}")]
    ParseError(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PredicateError>;
