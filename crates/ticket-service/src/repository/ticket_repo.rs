//! 工单仓储
//!
//! 分配历史、附件以子表存储，每次追加都是单条 INSERT，避免整列表读改写

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::TicketRepositoryTrait;
use crate::error::Result;
use crate::models::{
    AssignmentEntry, Attachment, CommentVisibility, Pagination, Ticket, TicketDetail,
    TicketFilter, TicketStatus,
};

const TICKET_COLUMNS: &str = r#"
    id, customer_id, connection_id, description, issue_type, priority, status,
    assigned_to, assigned_to_role, escalated, created_by, created_by_role,
    updated_by, updated_by_role, resolved_by, resolved_by_role, resolution_message,
    created_at, updated_at, resolved_at
"#;

/// 过滤条件，参数顺序与 bind_filter 一致
const FILTER_CLAUSE: &str = r#"
    ($1::varchar IS NULL OR status = $1)
    AND ($2::varchar IS NULL OR priority = $2)
    AND ($3::varchar IS NULL OR issue_type = $3)
    AND ($4::uuid IS NULL OR customer_id = $4)
    AND ($5::uuid IS NULL OR assigned_to = $5)
    AND ($6::uuid IS NULL OR connection_id = $6)
    AND (NOT $7 OR status <> 'resolved')
"#;

/// 工单仓储
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_history(&self, ticket_id: Uuid) -> Result<Vec<AssignmentEntry>> {
        let history = sqlx::query_as::<_, AssignmentEntry>(
            r#"
            SELECT ticket_id, agent_id, agent_role, assigned_by, assigned_by_role, assigned_at, note
            FROM ticket_assignments
            WHERE ticket_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(history)
    }

    async fn load_comment_refs(&self, ticket_id: Uuid) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
        let rows = sqlx::query_as::<_, (Uuid, CommentVisibility)>(
            r#"
            SELECT id, visibility
            FROM ticket_comments
            WHERE ticket_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        let (public, private): (Vec<_>, Vec<_>) = rows
            .into_iter()
            .partition(|(_, visibility)| *visibility == CommentVisibility::Public);

        Ok((
            public.into_iter().map(|(id, _)| id).collect(),
            private.into_iter().map(|(id, _)| id).collect(),
        ))
    }

    async fn load_attachments(&self, ticket_id: Uuid) -> Result<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT id, ticket_id, name, stored_path, mime_type, size,
                   uploaded_by, uploaded_by_role, created_at
            FROM ticket_attachments
            WHERE ticket_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }
}

#[async_trait]
impl TicketRepositoryTrait for TicketRepository {
    async fn insert(&self, ticket: &Ticket, initial: &AssignmentEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, customer_id, connection_id, description, issue_type, priority, status,
                assigned_to, assigned_to_role, escalated, created_by, created_by_role,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.customer_id)
        .bind(ticket.connection_id)
        .bind(&ticket.description)
        .bind(&ticket.issue_type)
        .bind(ticket.priority)
        .bind(ticket.status)
        .bind(ticket.assigned_to)
        .bind(ticket.assigned_to_role)
        .bind(ticket.escalated)
        .bind(ticket.created_by)
        .bind(ticket.created_by_role)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ticket_assignments (
                ticket_id, agent_id, agent_role, assigned_by, assigned_by_role, assigned_at, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(initial.ticket_id)
        .bind(initial.agent_id)
        .bind(initial.agent_role)
        .bind(initial.assigned_by)
        .bind(initial.assigned_by_role)
        .bind(initial.assigned_at)
        .bind(&initial.note)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<TicketDetail>> {
        let Some(ticket) = self.find(id).await? else {
            return Ok(None);
        };

        let assignment_history = self.load_history(id).await?;
        let (public_comments, private_comments) = self.load_comment_refs(id).await?;
        let attachments = self.load_attachments(id).await?;

        Ok(Some(TicketDetail {
            ticket,
            assignment_history,
            public_comments,
            private_comments,
            attachments,
        }))
    }

    async fn update(&self, ticket: &Ticket, expected_status: TicketStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET description = $2,
                issue_type = $3,
                priority = $4,
                status = $5,
                escalated = $6,
                updated_by = $7,
                updated_by_role = $8,
                resolved_by = $9,
                resolved_by_role = $10,
                resolution_message = $11,
                updated_at = $12,
                resolved_at = $13
            WHERE id = $1 AND status = $14
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.description)
        .bind(&ticket.issue_type)
        .bind(ticket.priority)
        .bind(ticket.status)
        .bind(ticket.escalated)
        .bind(ticket.updated_by)
        .bind(ticket.updated_by_role)
        .bind(ticket.resolved_by)
        .bind(ticket.resolved_by_role)
        .bind(&ticket.resolution_message)
        .bind(ticket.updated_at)
        .bind(ticket.resolved_at)
        .bind(expected_status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_assignment(&self, entry: &AssignmentEntry) -> Result<Option<Ticket>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            UPDATE tickets
            SET assigned_to = $2,
                assigned_to_role = $3,
                updated_by = $4,
                updated_by_role = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(entry.ticket_id)
        .bind(entry.agent_id)
        .bind(entry.agent_role)
        .bind(entry.assigned_by)
        .bind(entry.assigned_by_role)
        .bind(entry.assigned_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(ticket) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO ticket_assignments (
                ticket_id, agent_id, agent_role, assigned_by, assigned_by_role, assigned_at, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.ticket_id)
        .bind(entry.agent_id)
        .bind(entry.agent_role)
        .bind(entry.assigned_by)
        .bind(entry.assigned_by_role)
        .bind(entry.assigned_at)
        .bind(&entry.note)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(ticket))
    }

    async fn add_attachment(&self, attachment: &Attachment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO ticket_attachments (
                id, ticket_id, name, stored_path, mime_type, size,
                uploaded_by, uploaded_by_role, created_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9
            WHERE EXISTS (SELECT 1 FROM tickets WHERE id = $2)
            "#,
        )
        .bind(attachment.id)
        .bind(attachment.ticket_id)
        .bind(&attachment.name)
        .bind(&attachment.stored_path)
        .bind(&attachment.mime_type)
        .bind(attachment.size)
        .bind(attachment.uploaded_by)
        .bind(attachment.uploaded_by_role)
        .bind(attachment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &TicketFilter, pagination: Pagination) -> Result<Vec<Ticket>> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            r#"
            SELECT {}
            FROM tickets
            WHERE {}
            ORDER BY created_at DESC, id DESC
            LIMIT $8 OFFSET $9
            "#,
            TICKET_COLUMNS, FILTER_CLAUSE
        ))
        .bind(filter.status)
        .bind(filter.priority)
        .bind(&filter.issue_type)
        .bind(filter.customer_id)
        .bind(filter.assigned_to)
        .bind(filter.connection_id)
        .bind(filter.active_only)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn count(&self, filter: &TicketFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM tickets WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(filter.status)
        .bind(filter.priority)
        .bind(&filter.issue_type)
        .bind(filter.customer_id)
        .bind(filter.assigned_to)
        .bind(filter.connection_id)
        .bind(filter.active_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // 子表通过 ON DELETE CASCADE 一并删除，通知记录保留
        let result = sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
