//! 通知服务
//!
//! 面向接收人的通知查询与已读标记、设备令牌管理，以及管理员直接发送通知

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use super::authorization::require_admin;
use super::dto::DirectNotificationRequest;
use super::observe;
use super::recipients::RecipientResolver;
use crate::error::{Result, TicketError};
use crate::models::{Actor, Notification, Page, Pagination};
use crate::notification::{FanoutReport, NotificationMessage, NotifyFanout};
use crate::repository::{
    DeviceTokenRepositoryTrait, DirectoryRepositoryTrait, NotificationRepositoryTrait,
};

/// 设备令牌最大长度
const MAX_TOKEN_LEN: usize = 4096;

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepositoryTrait>,
    tokens: Arc<dyn DeviceTokenRepositoryTrait>,
    directory: Arc<dyn DirectoryRepositoryTrait>,
    fanout: Arc<NotifyFanout>,
    resolver: RecipientResolver,
    max_device_tokens: usize,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepositoryTrait>,
        tokens: Arc<dyn DeviceTokenRepositoryTrait>,
        directory: Arc<dyn DirectoryRepositoryTrait>,
        fanout: Arc<NotifyFanout>,
        max_device_tokens: usize,
    ) -> Self {
        let resolver = RecipientResolver::new(directory.clone(), tokens.clone());
        Self {
            notifications,
            tokens,
            directory,
            fanout,
            resolver,
            max_device_tokens: max_device_tokens.max(1),
        }
    }

    /// 注册设备令牌，只保留最近的 N 个；返回保留下来的令牌
    #[instrument(skip(self, token), fields(actor_id = %actor.id))]
    pub async fn register_device_token(&self, actor: &Actor, token: &str) -> Result<Vec<String>> {
        let result: Result<Vec<String>> = async {
            let token = validate_token(token)?;
            self.tokens
                .register(actor.id, token, self.max_device_tokens)
                .await
        }
        .await;

        observe("register_device_token", result)
    }

    /// 注销设备令牌，返回令牌是否存在
    #[instrument(skip(self, token), fields(actor_id = %actor.id))]
    pub async fn unregister_device_token(&self, actor: &Actor, token: &str) -> Result<bool> {
        let result: Result<bool> = async {
            let token = validate_token(token)?;
            let removed = self.tokens.remove(actor.id, &[token.to_string()]).await?;
            Ok(removed > 0)
        }
        .await;

        observe("unregister_device_token", result)
    }

    /// 当前操作者的通知，按创建时间倒序
    pub async fn list_notifications(
        &self,
        actor: &Actor,
        pagination: Pagination,
    ) -> Result<Page<Notification>> {
        let pagination = pagination.normalized();
        let items = self
            .notifications
            .list_for_recipient(actor.id, pagination)
            .await?;
        let total = self.notifications.count_for_recipient(actor.id).await?;
        Ok(Page::new(items, total, pagination))
    }

    /// 标记已读，只有接收人本人可以操作；重复标记直接返回
    #[instrument(skip(self), fields(actor_id = %actor.id, notification_id = %notification_id))]
    pub async fn mark_notification_read(
        &self,
        actor: &Actor,
        notification_id: Uuid,
    ) -> Result<Notification> {
        let result: Result<Notification> = async {
            let mut notification = self
                .notifications
                .find(notification_id)
                .await?
                .ok_or_else(|| TicketError::not_found("notification", notification_id))?;

            if notification.recipient_id != actor.id {
                return Err(TicketError::unauthorized("markNotificationRead"));
            }
            if notification.is_read {
                return Ok(notification);
            }

            if !self.notifications.mark_read(notification_id).await? {
                return Err(TicketError::not_found("notification", notification_id));
            }
            notification.is_read = true;
            Ok(notification)
        }
        .await;

        observe("mark_notification_read", result)
    }

    pub async fn unread_count(&self, actor: &Actor) -> Result<i64> {
        self.notifications.count_unread(actor.id).await
    }

    /// 管理员向单个客户发送通知，等待扇出完成并返回投递报告
    #[instrument(skip(self, request), fields(actor_id = %actor.id, customer_id = %customer_id))]
    pub async fn notify_customer(
        &self,
        actor: &Actor,
        customer_id: Uuid,
        request: DirectNotificationRequest,
    ) -> Result<FanoutReport> {
        let result: Result<FanoutReport> = async {
            require_admin(actor, "notifyCustomer")?;
            let message = build_message(request)?;

            self.directory
                .find_customer(customer_id)
                .await?
                .ok_or_else(|| TicketError::not_found("customer", customer_id))?;

            let recipients = self.resolver.customer(customer_id).await?;
            Ok(self.fanout.notify(recipients, &message).await)
        }
        .await;

        observe("notify_customer", result)
    }

    /// 管理员向全部客户发送通知
    #[instrument(skip(self, request), fields(actor_id = %actor.id))]
    pub async fn notify_all_customers(
        &self,
        actor: &Actor,
        request: DirectNotificationRequest,
    ) -> Result<FanoutReport> {
        let result: Result<FanoutReport> = async {
            require_admin(actor, "notifyAllCustomers")?;
            let message = build_message(request)?;

            let recipients = self.resolver.all_customers().await?;
            let report = self.fanout.notify(recipients, &message).await;
            info!(
                recipients = report.recipients.len(),
                ledger_written = report.ledger_written(),
                "全员客户通知已发送"
            );
            Ok(report)
        }
        .await;

        observe("notify_all_customers", result)
    }
}

fn validate_token(token: &str) -> Result<&str> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TicketError::Validation("设备令牌不能为空".to_string()));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(TicketError::Validation("设备令牌过长".to_string()));
    }
    Ok(token)
}

fn build_message(request: DirectNotificationRequest) -> Result<NotificationMessage> {
    let title = request.title.trim();
    let message = request.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(TicketError::Validation("通知标题与内容不能为空".to_string()));
    }

    let payload = match request.payload {
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    };
    Ok(NotificationMessage::new(title, message).with_payload(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_token() {
        assert_eq!(validate_token("  fcm-token ").unwrap(), "fcm-token");
        assert!(validate_token("").is_err());
        assert!(validate_token(&"x".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }

    #[test]
    fn test_build_message_defaults_payload() {
        let message = build_message(DirectNotificationRequest {
            title: " 计划停机 ".to_string(),
            message: "今晚 2:00-4:00 网络维护".to_string(),
            payload: serde_json::Value::Null,
        })
        .unwrap();
        assert_eq!(message.title, "计划停机");
        assert_eq!(message.payload, json!({}));

        assert!(
            build_message(DirectNotificationRequest {
                title: "".to_string(),
                message: "m".to_string(),
                payload: json!({}),
            })
            .is_err()
        );
    }
}
