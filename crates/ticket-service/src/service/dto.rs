//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的请求与响应，与内部领域模型解耦

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Comment, TicketPriority, TicketStatus, UserProfile};

/// 客户创建工单
///
/// 客户身份来自操作者，连接取客户当前生效的连接
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    pub description: String,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
}

/// 员工代客户创建工单
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalCreateTicketRequest {
    pub connection_id: Uuid,
    pub description: String,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
}

/// 更新工单字段，未提供的字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTicketRequest {
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub issue_type: Option<String>,
    pub status: Option<TicketStatus>,
}

impl UpdateTicketRequest {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.status.is_none()
    }
}

/// 重新分配工单
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketRequest {
    pub agent_id: Uuid,
    #[serde(default)]
    pub note: Option<String>,
}

/// 批量更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateRequest {
    pub ticket_ids: Vec<Uuid>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
}

/// 批量更新中单张工单的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub ticket_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkUpdateResult {
    pub fn success(ticket_id: Uuid) -> Self {
        Self {
            ticket_id,
            success: true,
            error_code: None,
            error: None,
        }
    }

    pub fn failure(ticket_id: Uuid, code: &str, error: String) -> Self {
        Self {
            ticket_id,
            success: false,
            error_code: Some(code.to_string()),
            error: Some(error),
        }
    }
}

/// 批量更新响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResponse {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<BulkUpdateResult>,
}

/// 评论及其作者展示身份
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    /// 作者已不存在时为空
    pub author: Option<UserProfile>,
}

/// 管理员直接发送的通知
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectNotificationRequest {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
