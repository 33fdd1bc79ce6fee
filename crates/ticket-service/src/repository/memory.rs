//! 内存存储
//!
//! 使用 DashMap 实现全部仓储接口，适用于测试和本地开发。
//! 列表追加都在工单条目的锁内完成，与数据库实现一样不会丢失并发写入。

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::traits::{
    CommentRepositoryTrait, DeviceTokenRepositoryTrait, DirectoryRepositoryTrait,
    NotificationRepositoryTrait, TicketRepositoryTrait,
};
use crate::error::Result;
use crate::models::{
    AssignmentEntry, Attachment, Comment, CommentVisibility, Connection, Customer, Notification,
    Pagination, Role, StaffMember, Ticket, TicketDetail, TicketFilter, TicketStatus, UserProfile,
};

/// 工单及其独占的子列表
#[derive(Debug, Clone)]
struct TicketRecord {
    ticket: Ticket,
    history: Vec<AssignmentEntry>,
    comment_refs: Vec<(Uuid, CommentVisibility)>,
    attachments: Vec<Attachment>,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    tickets: DashMap<Uuid, TicketRecord>,
    comments: DashMap<Uuid, Comment>,
    notifications: DashMap<Uuid, Notification>,
    device_tokens: DashMap<Uuid, Vec<String>>,
    customers: DashMap<Uuid, Customer>,
    connections: DashMap<Uuid, Connection>,
    staff: DashMap<Uuid, StaffMember>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 目录数据写入 ====================

    pub fn add_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn add_connection(&self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    pub fn add_staff(&self, staff: StaffMember) {
        self.staff.insert(staff.id, staff);
    }

    /// 统计数据条数
    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }
}

fn sort_by_creation<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid),
{
    items.sort_by_key(|item| key(item));
}

fn paginate<T>(items: Vec<T>, pagination: Pagination) -> Vec<T> {
    items
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect()
}

#[async_trait]
impl TicketRepositoryTrait for MemoryStore {
    async fn insert(&self, ticket: &Ticket, initial: &AssignmentEntry) -> Result<()> {
        self.tickets.insert(
            ticket.id,
            TicketRecord {
                ticket: ticket.clone(),
                history: vec![initial.clone()],
                comment_refs: Vec::new(),
                attachments: Vec::new(),
            },
        );
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Ticket>> {
        Ok(self.tickets.get(&id).map(|r| r.ticket.clone()))
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<TicketDetail>> {
        Ok(self.tickets.get(&id).map(|record| {
            let public_comments = record
                .comment_refs
                .iter()
                .filter(|(_, v)| *v == CommentVisibility::Public)
                .map(|(id, _)| *id)
                .collect();
            let private_comments = record
                .comment_refs
                .iter()
                .filter(|(_, v)| *v == CommentVisibility::Private)
                .map(|(id, _)| *id)
                .collect();

            TicketDetail {
                ticket: record.ticket.clone(),
                assignment_history: record.history.clone(),
                public_comments,
                private_comments,
                attachments: record.attachments.clone(),
            }
        }))
    }

    async fn update(&self, ticket: &Ticket, expected_status: TicketStatus) -> Result<bool> {
        let Some(mut record) = self.tickets.get_mut(&ticket.id) else {
            return Ok(false);
        };

        if record.ticket.status != expected_status {
            return Ok(false);
        }

        // 负责人只能通过 append_assignment 修改
        let current = &mut record.ticket;
        current.description = ticket.description.clone();
        current.issue_type = ticket.issue_type.clone();
        current.priority = ticket.priority;
        current.status = ticket.status;
        current.escalated = ticket.escalated;
        current.updated_by = ticket.updated_by;
        current.updated_by_role = ticket.updated_by_role;
        current.resolved_by = ticket.resolved_by;
        current.resolved_by_role = ticket.resolved_by_role;
        current.resolution_message = ticket.resolution_message.clone();
        current.updated_at = ticket.updated_at;
        current.resolved_at = ticket.resolved_at;

        Ok(true)
    }

    async fn append_assignment(&self, entry: &AssignmentEntry) -> Result<Option<Ticket>> {
        let Some(mut record) = self.tickets.get_mut(&entry.ticket_id) else {
            return Ok(None);
        };

        record.ticket.assigned_to = Some(entry.agent_id);
        record.ticket.assigned_to_role = Some(entry.agent_role);
        record.ticket.updated_by = Some(entry.assigned_by);
        record.ticket.updated_by_role = Some(entry.assigned_by_role);
        record.ticket.updated_at = entry.assigned_at;
        record.history.push(entry.clone());

        Ok(Some(record.ticket.clone()))
    }

    async fn add_attachment(&self, attachment: &Attachment) -> Result<bool> {
        let Some(mut record) = self.tickets.get_mut(&attachment.ticket_id) else {
            return Ok(false);
        };
        record.attachments.push(attachment.clone());
        Ok(true)
    }

    async fn list(&self, filter: &TicketFilter, pagination: Pagination) -> Result<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|r| filter.matches(&r.ticket))
            .map(|r| r.ticket.clone())
            .collect();

        sort_by_creation(&mut tickets, |t| (t.created_at, t.id));
        tickets.reverse();

        Ok(paginate(tickets, pagination))
    }

    async fn count(&self, filter: &TicketFilter) -> Result<i64> {
        Ok(self
            .tickets
            .iter()
            .filter(|r| filter.matches(&r.ticket))
            .count() as i64)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some((_, record)) = self.tickets.remove(&id) else {
            return Ok(false);
        };

        for (comment_id, _) in &record.comment_refs {
            self.comments.remove(comment_id);
        }

        Ok(true)
    }
}

#[async_trait]
impl CommentRepositoryTrait for MemoryStore {
    async fn append(&self, comment: &Comment) -> Result<bool> {
        let Some(mut record) = self.tickets.get_mut(&comment.ticket_id) else {
            return Ok(false);
        };

        self.comments.insert(comment.id, comment.clone());
        record.comment_refs.push((comment.id, comment.visibility));

        Ok(true)
    }

    async fn list(&self, ticket_id: Uuid, visibility: CommentVisibility) -> Result<Vec<Comment>> {
        let refs: Vec<Uuid> = match self.tickets.get(&ticket_id) {
            Some(record) => record
                .comment_refs
                .iter()
                .filter(|(_, v)| *v == visibility)
                .map(|(id, _)| *id)
                .collect(),
            None => return Ok(vec![]),
        };

        Ok(refs
            .iter()
            .filter_map(|id| self.comments.get(id).map(|c| c.clone()))
            .collect())
    }
}

#[async_trait]
impl NotificationRepositoryTrait for MemoryStore {
    async fn create(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get(&id).map(|n| n.clone()))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        pagination: Pagination,
    ) -> Result<Vec<Notification>> {
        let mut items: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .map(|n| n.clone())
            .collect();

        sort_by_creation(&mut items, |n| (n.created_at, n.id));
        items.reverse();

        Ok(paginate(items, pagination))
    }

    async fn count_for_recipient(&self, recipient_id: Uuid) -> Result<i64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .count() as i64)
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool> {
        match self.notifications.get_mut(&id) {
            Some(mut n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_unread(&self, recipient_id: Uuid) -> Result<i64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as i64)
    }
}

#[async_trait]
impl DeviceTokenRepositoryTrait for MemoryStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .device_tokens
            .get(&user_id)
            .map(|t| t.clone())
            .unwrap_or_default())
    }

    async fn register(&self, user_id: Uuid, token: &str, cap: usize) -> Result<Vec<String>> {
        let mut tokens = self.device_tokens.entry(user_id).or_default();

        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }

        // 淘汰最早注册的令牌
        if tokens.len() > cap {
            let overflow = tokens.len() - cap;
            tokens.drain(..overflow);
        }

        Ok(tokens.clone())
    }

    async fn remove(&self, user_id: Uuid, tokens: &[String]) -> Result<u64> {
        let Some(mut stored) = self.device_tokens.get_mut(&user_id) else {
            return Ok(0);
        };

        let before = stored.len();
        stored.retain(|t| !tokens.contains(t));
        Ok((before - stored.len()) as u64)
    }
}

#[async_trait]
impl DirectoryRepositoryTrait for MemoryStore {
    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        Ok(self.customers.get(&id).map(|c| c.clone()))
    }

    async fn find_connection(&self, id: Uuid) -> Result<Option<Connection>> {
        Ok(self.connections.get(&id).map(|c| c.clone()))
    }

    async fn find_agent_for_area(&self, area_id: Uuid) -> Result<Option<StaffMember>> {
        Ok(self
            .staff
            .iter()
            .filter(|s| s.role == Role::Team && s.area_id == Some(area_id))
            .map(|s| s.clone())
            .min_by_key(|s| (s.created_at, s.id)))
    }

    async fn find_staff(&self, id: Uuid) -> Result<Option<StaffMember>> {
        Ok(self.staff.get(&id).map(|s| s.clone()))
    }

    async fn list_admins(&self) -> Result<Vec<StaffMember>> {
        let mut admins: Vec<StaffMember> = self
            .staff
            .iter()
            .filter(|s| s.role == Role::Admin)
            .map(|s| s.clone())
            .collect();
        sort_by_creation(&mut admins, |s| (s.created_at, s.id));
        Ok(admins)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let mut customers: Vec<Customer> = self.customers.iter().map(|c| c.clone()).collect();
        sort_by_creation(&mut customers, |c| (c.created_at, c.id));
        Ok(customers)
    }

    async fn find_profiles(&self, ids: &[Uuid]) -> Result<Vec<UserProfile>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                if let Some(s) = self.staff.get(id) {
                    return Some(UserProfile {
                        id: s.id,
                        name: s.name.clone(),
                        role: s.role,
                    });
                }
                self.customers.get(id).map(|c| UserProfile {
                    id: c.id,
                    name: c.name.clone(),
                    role: Role::Customer,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, TicketPriority};
    use chrono::{Duration, Utc};

    fn open_ticket(store_customer: Uuid, agent: Uuid) -> (Ticket, AssignmentEntry) {
        let actor = Actor::customer(store_customer);
        let ticket = Ticket::open(
            store_customer,
            None,
            "光猫无信号".to_string(),
            None,
            TicketPriority::Medium,
            agent,
            &actor,
        );
        let entry = AssignmentEntry::new(ticket.id, agent, Role::Team, &actor, None);
        (ticket, entry)
    }

    #[tokio::test]
    async fn test_device_token_cap_evicts_oldest() {
        let store = MemoryStore::new();
        let user = Uuid::now_v7();

        for i in 1..=6 {
            DeviceTokenRepositoryTrait::register(&store, user, &format!("token-{}", i), 5)
                .await
                .unwrap();
        }

        let tokens = DeviceTokenRepositoryTrait::list(&store, user).await.unwrap();
        assert_eq!(tokens.len(), 5);
        assert!(!tokens.contains(&"token-1".to_string()));
        assert_eq!(tokens.last().map(String::as_str), Some("token-6"));
    }

    #[tokio::test]
    async fn test_register_existing_token_is_noop() {
        let store = MemoryStore::new();
        let user = Uuid::now_v7();

        DeviceTokenRepositoryTrait::register(&store, user, "a", 5).await.unwrap();
        DeviceTokenRepositoryTrait::register(&store, user, "b", 5).await.unwrap();
        let tokens = DeviceTokenRepositoryTrait::register(&store, user, "a", 5)
            .await
            .unwrap();

        assert_eq!(tokens, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_update_with_expected_status_mismatch() {
        let store = MemoryStore::new();
        let (mut ticket, entry) = open_ticket(Uuid::now_v7(), Uuid::now_v7());
        TicketRepositoryTrait::insert(&store, &ticket, &entry).await.unwrap();

        ticket.status = TicketStatus::Contacted;
        let written = TicketRepositoryTrait::update(&store, &ticket, TicketStatus::Assigned)
            .await
            .unwrap();
        assert!(!written);

        let written = TicketRepositoryTrait::update(&store, &ticket, TicketStatus::New)
            .await
            .unwrap();
        assert!(written);
    }

    #[tokio::test]
    async fn test_comment_requires_existing_ticket() {
        let store = MemoryStore::new();
        let actor = Actor::admin(Uuid::now_v7());
        let comment = Comment::new(
            Uuid::now_v7(),
            &actor,
            "无主评论".to_string(),
            CommentVisibility::Public,
        );

        assert!(!CommentRepositoryTrait::append(&store, &comment).await.unwrap());
    }

    #[tokio::test]
    async fn test_agent_lookup_is_deterministic() {
        let store = MemoryStore::new();
        let area = Uuid::now_v7();
        let now = Utc::now();
        let first = StaffMember {
            id: Uuid::now_v7(),
            name: "first".to_string(),
            role: Role::Team,
            area_id: Some(area),
            created_at: now - Duration::days(1),
        };
        store.add_staff(StaffMember {
            id: Uuid::now_v7(),
            name: "second".to_string(),
            role: Role::Team,
            area_id: Some(area),
            created_at: now,
        });
        store.add_staff(first.clone());

        let agent = store.find_agent_for_area(area).await.unwrap();
        assert_eq!(agent.map(|a| a.id), Some(first.id));
    }
}
