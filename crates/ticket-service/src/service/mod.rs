//! 服务层
//!
//! 实现工单业务逻辑，协调仓储层与通知扇出。
//!
//! ## 模块结构
//!
//! - `dto`: 请求与响应定义
//! - `state_machine`: 工单状态迁移规则
//! - `authorization`: 角色权限校验
//! - `recipients` / `notifier`: 通知接收人计算与工单事件通知
//! - `ticket_service` / `comment_service` / `notification_service`: 对外操作

pub mod authorization;
pub mod comment_service;
pub mod dto;
pub mod notification_service;
pub mod notifier;
pub mod recipients;
pub mod state_machine;
pub mod ticket_service;

pub use comment_service::CommentService;
pub use dto::*;
pub use notification_service::NotificationService;
pub use notifier::TicketNotifier;
pub use recipients::RecipientResolver;
pub use state_machine::{can_transition, ensure_transition};
pub use ticket_service::TicketService;

use helpdesk_shared::observability::metrics;

use crate::error::Result;

/// 按操作记录成功或错误码
pub(crate) fn observe<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    let label = match &result {
        Ok(_) => "success",
        Err(e) => e.error_code(),
    };
    metrics::record_ticket_operation(operation, label);
    result
}
