//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，PostgreSQL 与内存实现共用同一套接口，支持 mock 测试

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AssignmentEntry, Attachment, Comment, CommentVisibility, Connection, Customer, Notification,
    Pagination, StaffMember, Ticket, TicketDetail, TicketFilter, TicketStatus, UserProfile,
};

/// 工单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TicketRepositoryTrait: Send + Sync {
    /// 在同一事务内写入工单与首条分配历史
    async fn insert(&self, ticket: &Ticket, initial: &AssignmentEntry) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Ticket>>;

    async fn find_detail(&self, id: Uuid) -> Result<Option<TicketDetail>>;

    /// 覆盖工单的可编辑字段（不含负责人）
    ///
    /// 只有当前状态等于 expected_status 时才写入；返回是否写入成功
    async fn update(&self, ticket: &Ticket, expected_status: TicketStatus) -> Result<bool>;

    /// 原子追加分配历史并覆盖当前负责人，返回更新后的工单
    async fn append_assignment(&self, entry: &AssignmentEntry) -> Result<Option<Ticket>>;

    /// 原子追加附件，工单不存在时返回 false
    async fn add_attachment(&self, attachment: &Attachment) -> Result<bool>;

    /// 按创建时间倒序分页查询
    async fn list(&self, filter: &TicketFilter, pagination: Pagination) -> Result<Vec<Ticket>>;

    async fn count(&self, filter: &TicketFilter) -> Result<i64>;

    /// 删除工单及其评论、附件、分配历史
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// 评论仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentRepositoryTrait: Send + Sync {
    /// 追加评论，工单不存在时返回 false
    async fn append(&self, comment: &Comment) -> Result<bool>;

    /// 按写入顺序返回指定可见性的评论
    async fn list(&self, ticket_id: Uuid, visibility: CommentVisibility) -> Result<Vec<Comment>>;
}

/// 通知仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepositoryTrait: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Notification>>;

    /// 按创建时间倒序分页
    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        pagination: Pagination,
    ) -> Result<Vec<Notification>>;

    async fn count_for_recipient(&self, recipient_id: Uuid) -> Result<i64>;

    async fn mark_read(&self, id: Uuid) -> Result<bool>;

    async fn count_unread(&self, recipient_id: Uuid) -> Result<i64>;
}

/// 设备令牌仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTokenRepositoryTrait: Send + Sync {
    /// 按注册先后返回用户的令牌
    async fn list(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// 注册令牌并只保留最近的 cap 个，返回保留下来的令牌
    ///
    /// 已存在的令牌不改变顺序
    async fn register(&self, user_id: Uuid, token: &str, cap: usize) -> Result<Vec<String>>;

    /// 从用户令牌集合中移除指定令牌，返回移除数量
    async fn remove(&self, user_id: Uuid, tokens: &[String]) -> Result<u64>;
}

/// 目录仓储接口（客户、连接、员工）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryRepositoryTrait: Send + Sync {
    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>>;

    async fn find_connection(&self, id: Uuid) -> Result<Option<Connection>>;

    /// 服务区域的负责工程师，多个时取最早创建的
    async fn find_agent_for_area(&self, area_id: Uuid) -> Result<Option<StaffMember>>;

    async fn find_staff(&self, id: Uuid) -> Result<Option<StaffMember>>;

    async fn list_admins(&self) -> Result<Vec<StaffMember>>;

    async fn list_customers(&self) -> Result<Vec<Customer>>;

    /// 批量获取展示身份，不存在的 id 直接忽略
    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>>;
}
