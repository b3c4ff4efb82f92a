//! 共享库
//!
//! 包含嵌入谓词引擎的应用共用的配置加载和可观测性初始化代码。

pub mod config;
pub mod observability;
