//! 工单状态机
//!
//! 所有状态变更都必须经过 `ensure_transition`，状态字段不允许被直接覆盖。
//!
//! ```text
//! new ──► contacted ──► assigned ──► escalated ──► resolved
//!  │          │             │                          ▲
//!  │          └─────────────┴──────────────────────────┤
//!  └───────────────────────────────────────────────────┘
//! ```
//!
//! 任意进行中的状态都可以直接升级或解决；resolved 是终止状态。
//! 相同状态之间不算迁移。

use crate::error::{Result, TicketError};
use crate::models::TicketStatus;

/// 判断状态迁移是否合法
pub fn can_transition(current: TicketStatus, next: TicketStatus) -> bool {
    use TicketStatus::*;

    matches!(
        (current, next),
        (New, Contacted | Assigned | Escalated | Resolved)
            | (Contacted, Assigned | Escalated | Resolved)
            | (Assigned, Escalated | Resolved)
            | (Escalated, Resolved)
    )
}

/// 非法迁移时返回 `InvalidTransition`
pub fn ensure_transition(current: TicketStatus, next: TicketStatus) -> Result<()> {
    if can_transition(current, next) {
        Ok(())
    } else {
        Err(TicketError::InvalidTransition {
            from: current,
            to: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TicketStatus::*;

    const ALL: [TicketStatus; 5] = [New, Contacted, Assigned, Escalated, Resolved];

    #[test]
    fn test_resolved_is_terminal() {
        for next in ALL {
            assert!(!can_transition(Resolved, next), "resolved -> {next}");
        }
    }

    #[test]
    fn test_every_active_state_can_escalate_or_resolve() {
        for current in [New, Contacted, Assigned] {
            assert!(can_transition(current, Escalated));
            assert!(can_transition(current, Resolved));
        }
        assert!(can_transition(Escalated, Resolved));
    }

    #[test]
    fn test_no_backward_or_self_transitions() {
        for status in ALL {
            assert!(!can_transition(status, status));
            assert!(!can_transition(status, New));
        }
        assert!(!can_transition(Assigned, Contacted));
        assert!(!can_transition(Escalated, Assigned));
    }

    #[test]
    fn test_ensure_transition_error() {
        let err = ensure_transition(Resolved, Escalated).unwrap_err();
        assert!(matches!(
            err,
            TicketError::InvalidTransition {
                from: Resolved,
                to: Escalated
            }
        ));
        assert!(ensure_transition(New, Contacted).is_ok());
    }
}
