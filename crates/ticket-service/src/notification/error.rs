//! 通知投递错误
//!
//! 只在扇出内部流转，最终汇总为每个接收人的通道结果

use thiserror::Error;

/// 单个通道的投递失败
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("通知记录写入失败: {0}")]
    Ledger(String),

    #[error("实时推送失败: {0}")]
    Realtime(String),

    #[error("移动推送失败: {0}")]
    Push(#[from] PushError),

    #[error("{channel} 通道超时")]
    Timeout { channel: &'static str },
}

/// 推送服务整体调用失败
///
/// 单个令牌的失败通过 TokenOutcome 表达，这里只描述整批请求的失败
#[derive(Debug, Error)]
pub enum PushError {
    #[error("推送服务暂时不可用: {0}")]
    Transient(String),

    #[error("推送服务调用超时")]
    Timeout,

    #[error("推送服务配置错误: {0}")]
    Config(String),
}

impl DeliveryError {
    /// 用于指标标签
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Ledger(_) => "ledger",
            Self::Realtime(_) => "realtime",
            Self::Push(_) => "push",
            Self::Timeout { channel } => *channel,
        }
    }
}
