//! 工单评论
//!
//! 评论只追加，创建后不可修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Actor;
use super::enums::{CommentVisibility, Role};

/// 工单评论
///
/// 通过 visibility 归属于工单的公开或内部列表之一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub content: String,
    pub authored_by: Uuid,
    pub authored_by_role: Role,
    pub visibility: CommentVisibility,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        ticket_id: Uuid,
        author: &Actor,
        content: String,
        visibility: CommentVisibility,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            ticket_id,
            content,
            authored_by: author.id,
            authored_by_role: author.role,
            visibility,
            created_at: Utc::now(),
        }
    }
}
