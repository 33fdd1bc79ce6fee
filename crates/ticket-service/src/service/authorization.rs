//! 角色权限校验
//!
//! | 操作 | Admin | Team | Customer |
//! |------|-------|------|----------|
//! | 创建工单 | - | - | 本人 |
//! | 代客户创建 | ✓ | ✓ | - |
//! | 更新 / 分配 / 批量 / 删除 / 直接通知 | ✓ | - | - |
//! | 升级 / 解决 / 内部评论 | ✓ | 被分配时 | - |
//! | 查看 / 公开评论 / 附件 | ✓ | 被分配时 | 本人工单 |

use crate::error::{Result, TicketError};
use crate::models::{Actor, Role, Ticket};

pub fn require_admin(actor: &Actor, operation: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(TicketError::unauthorized(operation))
    }
}

pub fn require_staff(actor: &Actor, operation: &str) -> Result<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(TicketError::unauthorized(operation))
    }
}

pub fn require_customer(actor: &Actor, operation: &str) -> Result<()> {
    if actor.role == Role::Customer {
        Ok(())
    } else {
        Err(TicketError::unauthorized(operation))
    }
}

/// 管理员或当前负责该工单的工程师
pub fn can_manage(actor: &Actor, ticket: &Ticket) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Team => ticket.is_assigned_to(actor.id),
        Role::Customer => false,
    }
}

/// 在可管理的基础上，客户可以查看自己的工单
pub fn can_view(actor: &Actor, ticket: &Ticket) -> bool {
    match actor.role {
        Role::Customer => ticket.customer_id == actor.id,
        _ => can_manage(actor, ticket),
    }
}

pub fn require_manage(actor: &Actor, ticket: &Ticket, operation: &str) -> Result<()> {
    if can_manage(actor, ticket) {
        Ok(())
    } else {
        Err(TicketError::unauthorized(operation))
    }
}

pub fn require_view(actor: &Actor, ticket: &Ticket, operation: &str) -> Result<()> {
    if can_view(actor, ticket) {
        Ok(())
    } else {
        Err(TicketError::unauthorized(operation))
    }
}
