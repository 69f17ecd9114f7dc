//! 领域模型错误定义
//!
//! 四类错误覆盖全部业务失败：参数非法、资源不存在、权限不足、状态冲突。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数非法（空输入、自引用ID等）
    #[error("invalid argument: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 引用的资源不存在
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// 当前身份缺少所需的成员资格或所有权
    #[error("forbidden: {action}")]
    Forbidden { action: String },

    /// 状态机前置条件被违反
    #[error("conflict: {rule}")]
    Conflict { rule: String },
}

impl DomainError {
    /// 创建参数错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// 创建权限错误
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    /// 创建状态冲突错误
    pub fn conflict(rule: impl Into<String>) -> Self {
        Self::Conflict { rule: rule.into() }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
