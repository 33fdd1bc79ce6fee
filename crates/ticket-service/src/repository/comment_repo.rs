//! 评论仓储

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::traits::CommentRepositoryTrait;
use crate::error::Result;
use crate::models::{Comment, CommentVisibility};

/// 评论仓储
pub struct CommentRepository {
    pool: PgPool,
}

impl CommentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepositoryTrait for CommentRepository {
    async fn append(&self, comment: &Comment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO ticket_comments (
                id, ticket_id, content, authored_by, authored_by_role, visibility, created_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE EXISTS (SELECT 1 FROM tickets WHERE id = $2)
            "#,
        )
        .bind(comment.id)
        .bind(comment.ticket_id)
        .bind(&comment.content)
        .bind(comment.authored_by)
        .bind(comment.authored_by_role)
        .bind(comment.visibility)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, ticket_id: Uuid, visibility: CommentVisibility) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, ticket_id, content, authored_by, authored_by_role, visibility, created_at
            FROM ticket_comments
            WHERE ticket_id = $1 AND visibility = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(ticket_id)
        .bind(visibility)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }
}
