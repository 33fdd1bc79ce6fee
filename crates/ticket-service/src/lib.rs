//! 宽带工单服务
//!
//! 管理装维工单从创建到解决的完整生命周期，并把每次变更扇出到
//! 站内通知、实时房间与移动推送三个通道。
//!
//! ## 核心功能
//!
//! - **工单生命周期**：按服务区域自动派单、状态迁移、改派、升级、解决与批量更新
//! - **评论**：公开评论与内部评论分开存储，内部评论不对客户可见
//! - **通知扇出**：每个接收人的三个通道相互独立，单个通道失败不影响其他通道和工单操作
//! - **设备令牌**：每个用户保留最近的若干个令牌，推送服务判定失效的令牌自动清理
//!
//! ## 模块结构
//!
//! - `models`: 领域模型
//! - `error`: 错误类型定义
//! - `repository`: 数据访问层（Postgres 与内存实现）
//! - `service`: 业务逻辑层
//! - `notification`: 多通道通知
//! - `app`: 组件装配
//! - `gateway`: WebSocket 实时网关

pub mod app;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;

// 重新导出核心类型
pub use app::{Repositories, TicketApp};
pub use error::{Result, TicketError};
pub use models::{Actor, Role, Ticket, TicketStatus};
