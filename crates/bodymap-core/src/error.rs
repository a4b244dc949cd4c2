//! 错误定义模块

use thiserror::Error;

/// 映射引擎统一错误类型
#[derive(Error, Debug)]
pub enum BodyMapError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("坐标目录未找到: {0}")]
    CatalogNotFound(String),

    #[error("坐标目录加载失败: {key}: {reason}")]
    CatalogLoad { key: String, reason: String },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("匹配模式错误: {0}")]
    Pattern(#[from] regex::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 映射引擎统一结果类型
pub type Result<T> = std::result::Result<T, BodyMapError>;
