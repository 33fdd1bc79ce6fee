//! 通知账本
//!
//! 每个 (接收人, 通知事件) 写入一条记录，是"用户是否收到过通知"的唯一依据

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::error::DeliveryError;
use super::types::NotificationMessage;
use crate::models::{Notification, Recipient};
use crate::repository::NotificationRepositoryTrait;

/// 通知账本
#[derive(Clone)]
pub struct NotificationLedger {
    repo: Arc<dyn NotificationRepositoryTrait>,
}

impl NotificationLedger {
    pub fn new(repo: Arc<dyn NotificationRepositoryTrait>) -> Self {
        Self { repo }
    }

    /// 为接收人写入一条未读通知
    pub async fn record(
        &self,
        recipient: &Recipient,
        message: &NotificationMessage,
    ) -> Result<Notification, DeliveryError> {
        let notification = Notification {
            id: Uuid::now_v7(),
            title: message.title.clone(),
            message: message.message.clone(),
            recipient_id: recipient.id,
            recipient_role: recipient.role,
            related_entity_id: message.related_entity_id,
            related_entity_type: message.related_entity_type.clone(),
            is_read: false,
            data: message.payload.clone(),
            created_at: Utc::now(),
        };

        self.repo
            .create(&notification)
            .await
            .map_err(|e| DeliveryError::Ledger(e.to_string()))?;

        Ok(notification)
    }
}
