//! 站内通知记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

/// 站内通知
///
/// 每个 (接收人, 通知事件) 一条记录，仅接收人可标记已读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub recipient_id: Uuid,
    pub recipient_role: Role,
    #[sqlx(default)]
    pub related_entity_id: Option<Uuid>,
    #[sqlx(default)]
    pub related_entity_type: Option<String>,
    pub is_read: bool,
    /// 业务数据（如 ticketId、status）
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 通知接收人投影
///
/// 每次通知事件时从工单与目录计算得出，不单独持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: Uuid,
    pub role: Role,
    pub device_tokens: Vec<String>,
}

impl Recipient {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self {
            id,
            role,
            device_tokens: Vec::new(),
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.device_tokens = tokens;
        self
    }
}
