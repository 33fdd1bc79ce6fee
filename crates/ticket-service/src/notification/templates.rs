//! 工单通知模板
//!
//! 每类工单事件对应固定的通知标题、正文与工单房间事件名。
//! 标题不做变量替换，便于客户端聚合展示同类通知。

use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::realtime::Room;
use super::types::NotificationMessage;
use crate::models::Role;

/// 触发通知的工单事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    /// 内部员工代客户创建时带上创建者角色
    Created { by: Option<Role> },
    Updated,
    Reassigned,
    Escalated,
    Resolved,
    PublicComment,
    PrivateComment,
    AttachmentAdded,
}

impl TicketEvent {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Created { .. } => "New Ticket Created",
            Self::Updated => "Ticket Updated",
            Self::Reassigned => "Ticket Reassigned",
            Self::Escalated => "Ticket Escalated",
            Self::Resolved => "Ticket Resolved",
            Self::PublicComment => "New Public Comment",
            Self::PrivateComment => "New Private Comment",
            Self::AttachmentAdded => "Ticket Attachment Added",
        }
    }

    pub fn render_message(&self, ticket_id: Uuid) -> String {
        match self {
            Self::Created { by: Some(role) } => {
                format!("Ticket #{ticket_id} has been created by {}.", role.display_name())
            }
            Self::Created { by: None } => format!("Ticket #{ticket_id} has been created."),
            Self::Updated => format!("Ticket #{ticket_id} has been updated."),
            Self::Reassigned => format!("Ticket #{ticket_id} has been reassigned."),
            Self::Escalated => format!("Ticket #{ticket_id} has been escalated."),
            Self::Resolved => format!("Ticket #{ticket_id} has been resolved."),
            Self::PublicComment => format!("New comment added to Ticket #{ticket_id}"),
            Self::PrivateComment => format!("New private comment added to Ticket #{ticket_id}"),
            Self::AttachmentAdded => format!("A new attachment was added to Ticket #{ticket_id}"),
        }
    }

    /// 工单房间中的事件名
    pub fn room_event(&self) -> &'static str {
        match self {
            Self::Created { .. } => "ticketCreated",
            Self::Updated => "ticketUpdated",
            Self::Reassigned => "ticketAssigned",
            Self::Escalated => "ticketEscalated",
            Self::Resolved => "ticketResolved",
            Self::PublicComment => "ticketPublicCommentAdded",
            Self::PrivateComment => "ticketPrivateCommentAdded",
            Self::AttachmentAdded => "ticketAttachmentAdded",
        }
    }

    /// 私有评论只进入员工房间
    pub fn room(&self, ticket_id: Uuid) -> Room {
        match self {
            Self::PrivateComment => Room::TicketStaff(ticket_id),
            _ => Room::Ticket(ticket_id),
        }
    }

    /// 客户是否在接收人之列
    pub fn notifies_customer(&self) -> bool {
        !matches!(self, Self::PrivateComment)
    }

    /// 生成通知内容，payload 固定包含 ticketId，extra 中的字段合并进来
    pub fn notification(&self, ticket_id: Uuid, extra: Value) -> NotificationMessage {
        let mut payload = Map::new();
        payload.insert("ticketId".to_string(), json!(ticket_id));
        if let Value::Object(fields) = extra {
            payload.extend(fields);
        }

        NotificationMessage::new(self.title(), self.render_message(ticket_id))
            .with_payload(Value::Object(payload))
            .related_to("ticket", ticket_id)
    }
}
