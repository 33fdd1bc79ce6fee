//! 工单服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化，统一使用小写取值

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 操作者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Role {
    /// 管理员，可操作所有工单
    Admin,
    /// 现场工程师，只能处理分配给自己的工单
    Team,
    /// 客户，只能创建和查看自己的工单
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Team => "team",
            Self::Customer => "customer",
        }
    }

    /// 用于通知文案的展示名
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Team => "Team",
            Self::Customer => "Customer",
        }
    }

    /// 是否为内部员工
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Admin | Self::Team)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "team" => Ok(Self::Team),
            "customer" => Ok(Self::Customer),
            other => Err(format!("未知角色: {}", other)),
        }
    }
}

/// 工单状态
///
/// resolved 是唯一的终止状态，其余状态都算作进行中
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum TicketStatus {
    /// 新建 - 已分配工程师，尚未联系客户
    #[default]
    New,
    /// 已联系客户
    Contacted,
    /// 已确认分配
    Assigned,
    /// 已升级
    Escalated,
    /// 已解决
    Resolved,
}

impl TicketStatus {
    /// 进行中的状态集合
    pub const ACTIVE: [TicketStatus; 4] = [
        TicketStatus::New,
        TicketStatus::Contacted,
        TicketStatus::Assigned,
        TicketStatus::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Assigned => "assigned",
            Self::Escalated => "escalated",
            Self::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工单优先级
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// 评论可见性
///
/// 公开评论对客户可见，内部评论仅员工可见
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum CommentVisibility {
    Public,
    Private,
}

impl CommentVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TicketStatus::Escalated).unwrap();
        assert_eq!(json, "\"escalated\"");

        let status: TicketStatus = serde_json::from_str("\"contacted\"").unwrap();
        assert_eq!(status, TicketStatus::Contacted);
    }

    #[test]
    fn test_active_set() {
        assert!(TicketStatus::ACTIVE.iter().all(|s| s.is_active()));
        assert!(!TicketStatus::Resolved.is_active());
        assert!(TicketStatus::Resolved.is_terminal());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" team ".parse::<Role>().unwrap(), Role::Team);
        assert!("lead".parse::<Role>().is_err());
        assert!(Role::Team.is_staff());
        assert!(!Role::Customer.is_staff());
    }
}
