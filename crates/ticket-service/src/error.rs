//! 工单服务错误类型
//!
//! 定义服务层的业务错误和系统错误。通知投递失败不在此列，
//! 它们只出现在扇出报告中，永远不会返回给工单操作的调用方。

use thiserror::Error;
use uuid::Uuid;

use crate::models::TicketStatus;

/// 工单服务错误类型
#[derive(Debug, Error)]
pub enum TicketError {
    // === 业务错误 ===
    #[error("{entity} 不存在: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("无权执行操作: {operation}")]
    Unauthorized { operation: String },

    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("服务区域没有可分配的工程师: area_id={0}")]
    NoAgentForArea(Uuid),

    #[error("工单已解决: {0}")]
    AlreadyResolved(Uuid),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("并发冲突，请重试")]
    ConcurrencyConflict,

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 工单服务 Result 类型别名
pub type Result<T> = std::result::Result<T, TicketError>;

impl TicketError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn unauthorized(operation: impl Into<String>) -> Self {
        Self::Unauthorized {
            operation: operation.into(),
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::ConcurrencyConflict)
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) | Self::ConcurrencyConflict
        )
    }

    /// 是否应作为调用方错误（4xx）返回
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Unauthorized { .. }
                | Self::InvalidTransition { .. }
                | Self::NoAgentForArea(_)
                | Self::AlreadyResolved(_)
                | Self::Validation(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NoAgentForArea(_) => "NO_AGENT_FOR_AREA",
            Self::AlreadyResolved(_) => "ALREADY_RESOLVED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
