//! 统一错误类型定义.
//!
//! 所有 resyn crate 共用的错误类型, 语法层的每一种失败都映射到一个变体,
//! 由调用方 (残差组装器或宏块层) 直接向上传播, 不做重试.

use thiserror::Error;

/// resyn 统一错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResynError {
    /// 游标在读取某个字段的中途耗尽
    #[error("比特流已耗尽")]
    StreamExhausted,

    /// 码字不在当前码表中, 或解出的值超出语法允许范围
    #[error("语法错误: {0}")]
    MalformedSyntax(String),

    /// 依赖数据终止的循环超过了显式上限
    #[error("循环未在上限内终止: {0}")]
    UnboundedLoop(String),

    /// 当前配置下不支持的编解码路径
    #[error("不支持的路径: {0}")]
    UnsupportedPath(String),

    /// 调用方传入的参数违反约定
    #[error("无效参数: {0}")]
    InvalidArgument(String),
}

impl ResynError {
    /// 构造语法错误
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSyntax(msg.into())
    }

    /// 构造无效参数错误
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// resyn 统一 Result 类型
pub type ResynResult<T> = Result<T, ResynError>;
