//! 工单相关实体定义
//!
//! 包含工单本体、分配历史、附件以及查询用的过滤与分页参数

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Actor;
use super::enums::{Role, TicketPriority, TicketStatus};

/// 支持工单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[sqlx(default)]
    pub connection_id: Option<Uuid>,
    pub description: String,
    #[sqlx(default)]
    pub issue_type: Option<String>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    /// 当前负责的工程师
    #[sqlx(default)]
    pub assigned_to: Option<Uuid>,
    #[sqlx(default)]
    pub assigned_to_role: Option<Role>,
    pub escalated: bool,
    pub created_by: Uuid,
    pub created_by_role: Role,
    #[sqlx(default)]
    pub updated_by: Option<Uuid>,
    #[sqlx(default)]
    pub updated_by_role: Option<Role>,
    #[sqlx(default)]
    pub resolved_by: Option<Uuid>,
    #[sqlx(default)]
    pub resolved_by_role: Option<Role>,
    #[sqlx(default)]
    pub resolution_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// 构造一张状态为 new 的工单，并立即分配给指定工程师
    pub fn open(
        customer_id: Uuid,
        connection_id: Option<Uuid>,
        description: String,
        issue_type: Option<String>,
        priority: TicketPriority,
        agent_id: Uuid,
        created_by: &Actor,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            customer_id,
            connection_id,
            description,
            issue_type,
            priority,
            status: TicketStatus::New,
            assigned_to: Some(agent_id),
            assigned_to_role: Some(Role::Team),
            escalated: false,
            created_by: created_by.id,
            created_by_role: created_by.role,
            updated_by: None,
            updated_by_role: None,
            resolved_by: None,
            resolved_by_role: None,
            resolution_message: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// 工单是否分配给该操作者
    pub fn is_assigned_to(&self, actor_id: Uuid) -> bool {
        self.assigned_to == Some(actor_id)
    }

    /// 记录最后修改人
    pub fn touch(&mut self, actor: &Actor) {
        self.updated_by = Some(actor.id);
        self.updated_by_role = Some(actor.role);
        self.updated_at = Utc::now();
    }

    /// 校验状态相关不变量：
    /// resolved 当且仅当 resolved_at 与 resolved_by 均已设置；escalated 蕴含 status == escalated
    pub fn invariants_hold(&self) -> bool {
        let resolved = self.status == TicketStatus::Resolved;
        let resolution_recorded = self.resolved_at.is_some() && self.resolved_by.is_some();
        let escalation_ok = !self.escalated || self.status == TicketStatus::Escalated;
        resolved == resolution_recorded && escalation_ok
    }
}

/// 分配历史条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntry {
    pub ticket_id: Uuid,
    pub agent_id: Uuid,
    pub agent_role: Role,
    pub assigned_by: Uuid,
    pub assigned_by_role: Role,
    pub assigned_at: DateTime<Utc>,
    #[sqlx(default)]
    pub note: Option<String>,
}

impl AssignmentEntry {
    pub fn new(
        ticket_id: Uuid,
        agent_id: Uuid,
        agent_role: Role,
        assigned_by: &Actor,
        note: Option<String>,
    ) -> Self {
        Self {
            ticket_id,
            agent_id,
            agent_role,
            assigned_by: assigned_by.id,
            assigned_by_role: assigned_by.role,
            assigned_at: Utc::now(),
            note,
        }
    }
}

/// 上传完成后的附件引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub name: String,
    pub stored_path: String,
    pub mime_type: String,
    pub size: i64,
}

/// 工单附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub name: String,
    pub stored_path: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Uuid,
    pub uploaded_by_role: Role,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn from_blob(ticket_id: Uuid, blob: StoredBlob, uploaded_by: &Actor) -> Self {
        Self {
            id: Uuid::now_v7(),
            ticket_id,
            name: blob.name,
            stored_path: blob.stored_path,
            mime_type: blob.mime_type,
            size: blob.size,
            uploaded_by: uploaded_by.id,
            uploaded_by_role: uploaded_by.role,
            created_at: Utc::now(),
        }
    }
}

/// 工单详情
///
/// 工单本体加上其独占的子列表，列表均按写入顺序排列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub assignment_history: Vec<AssignmentEntry>,
    pub public_comments: Vec<Uuid>,
    pub private_comments: Vec<Uuid>,
    pub attachments: Vec<Attachment>,
}

/// 工单查询过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub issue_type: Option<String>,
    pub customer_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub connection_id: Option<Uuid>,
    /// 只返回进行中的工单
    pub active_only: bool,
}

impl TicketFilter {
    /// 内存实现与测试使用的匹配逻辑，与 SQL 条件保持一致
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.status.is_none_or(|s| ticket.status == s)
            && self.priority.is_none_or(|p| ticket.priority == p)
            && self
                .issue_type
                .as_deref()
                .is_none_or(|t| ticket.issue_type.as_deref() == Some(t))
            && self.customer_id.is_none_or(|c| ticket.customer_id == c)
            && self.assigned_to.is_none_or(|a| ticket.assigned_to == Some(a))
            && self
                .connection_id
                .is_none_or(|c| ticket.connection_id == Some(c))
            && (!self.active_only || ticket.status.is_active())
    }
}

/// 分页参数（page 从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// 修正越界参数
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        (p.page as i64 - 1) * p.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.normalized().limit as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let p = pagination.normalized();
        Self {
            items,
            total,
            page: p.page,
            limit: p.limit,
        }
    }
}
