//! 目录实体：客户、连接、员工
//!
//! 这些记录由外部系统维护，工单服务只读取

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

/// 客户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    #[sqlx(default)]
    pub email: Option<String>,
    /// 当前生效的宽带连接
    #[sqlx(default)]
    pub active_connection_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 宽带连接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[sqlx(default)]
    pub service_area_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 内部员工（管理员或现场工程师）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// 工程师负责的服务区域
    #[sqlx(default)]
    pub area_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 用于展示评论作者等身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}
