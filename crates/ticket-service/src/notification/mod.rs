//! 多通道通知
//!
//! - `ledger`：站内通知记录
//! - `push` / `fcm`：移动推送适配与推送服务实现
//! - `realtime`：进程内房间订阅与实时广播
//! - `fanout`：按接收人独立投递三个通道并汇总结果
//! - `templates`：工单事件到通知内容的映射

pub mod error;
pub mod fanout;
pub mod fcm;
pub mod ledger;
pub mod push;
pub mod realtime;
pub mod templates;
pub mod types;

pub use error::{DeliveryError, PushError};
pub use fanout::{NEW_NOTIFICATION_EVENT, NotifyFanout, dedup_recipients};
pub use fcm::{FcmPushProvider, LoggingPushProvider};
pub use ledger::NotificationLedger;
pub use push::{
    DeliveryReport, MAX_PUSH_ATTEMPTS, PushDeliveryAdapter, PushMessage, PushProvider, TokenOutcome,
};
pub use realtime::{RealtimeBus, RealtimeEvent, Room};
pub use templates::TicketEvent;
pub use types::{ChannelOutcome, FanoutReport, NotificationMessage, RecipientOutcome};
