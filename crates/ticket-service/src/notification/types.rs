//! 通知类型定义
//!
//! 扇出的输入消息与逐接收人的投递结果

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use helpdesk_shared::observability::metrics;

use crate::models::Role;

/// 一次通知事件的内容，扇出给所有接收人
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub title: String,
    pub message: String,
    /// 业务数据（如 ticketId、status）
    pub payload: serde_json::Value,
    pub related_entity_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
}

impl NotificationMessage {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            payload: serde_json::json!({}),
            related_entity_id: None,
            related_entity_type: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn related_to(mut self, entity_type: impl Into<String>, entity_id: Uuid) -> Self {
        self.related_entity_type = Some(entity_type.into());
        self.related_entity_id = Some(entity_id);
        self
    }

    /// 推送服务要求 data 字段全部为字符串
    pub fn push_data(&self) -> HashMap<String, String> {
        match &self.payload {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            _ => HashMap::new(),
        }
    }
}

/// 单个通道的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum ChannelOutcome {
    Delivered,
    /// 无需投递（无在线连接、无设备令牌）
    Skipped,
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// 单个接收人的投递结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    pub recipient_id: Uuid,
    pub role: Role,
    /// 写入成功时的通知 ID
    pub notification_id: Option<Uuid>,
    pub ledger: ChannelOutcome,
    pub realtime: ChannelOutcome,
    pub push: ChannelOutcome,
    /// 因永久失败被清理的令牌
    pub pruned_tokens: Vec<String>,
    /// 重试耗尽后放弃的令牌
    pub dropped_tokens: Vec<String>,
}

impl RecipientOutcome {
    pub fn has_failure(&self) -> bool {
        self.ledger.is_failed() || self.realtime.is_failed() || self.push.is_failed()
    }
}

/// 一次扇出的汇总报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub title: String,
    pub recipients: Vec<RecipientOutcome>,
    /// 去重时丢弃的重复接收人数量
    pub duplicates_removed: usize,
    pub duration_ms: u64,
}

impl FanoutReport {
    /// 成功写入通知记录的接收人数量
    pub fn ledger_written(&self) -> usize {
        self.recipients
            .iter()
            .filter(|r| r.ledger == ChannelOutcome::Delivered)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.recipients.iter().filter(|r| r.has_failure()).count()
    }

    pub fn outcome_for(&self, recipient_id: Uuid) -> Option<&RecipientOutcome> {
        self.recipients
            .iter()
            .find(|r| r.recipient_id == recipient_id)
    }

    /// 扇出的唯一观测出口：逐接收人记录失败日志与指标
    pub fn record(&self) {
        for outcome in &self.recipients {
            for (channel, result) in [
                ("ledger", &outcome.ledger),
                ("realtime", &outcome.realtime),
                ("push", &outcome.push),
            ] {
                metrics::record_notification_channel(channel, result.label());

                if let ChannelOutcome::Failed(reason) = result {
                    warn!(
                        title = %self.title,
                        recipient_id = %outcome.recipient_id,
                        role = %outcome.role,
                        channel,
                        reason = %reason,
                        "通知通道投递失败"
                    );
                }
            }

            metrics::record_push_tokens("pruned", outcome.pruned_tokens.len());
            metrics::record_push_tokens("dropped", outcome.dropped_tokens.len());
        }

        info!(
            title = %self.title,
            recipients = self.recipients.len(),
            ledger_written = self.ledger_written(),
            failures = self.failure_count(),
            duplicates_removed = self.duplicates_removed,
            duration_ms = self.duration_ms,
            "通知扇出完成"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_data_stringifies_values() {
        let message = NotificationMessage::new("t", "m").with_payload(serde_json::json!({
            "ticketId": "abc",
            "count": 3,
            "urgent": true
        }));

        let data = message.push_data();
        assert_eq!(data.get("ticketId").map(String::as_str), Some("abc"));
        assert_eq!(data.get("count").map(String::as_str), Some("3"));
        assert_eq!(data.get("urgent").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_report_counts() {
        let ok = RecipientOutcome {
            recipient_id: Uuid::now_v7(),
            role: Role::Admin,
            notification_id: Some(Uuid::now_v7()),
            ledger: ChannelOutcome::Delivered,
            realtime: ChannelOutcome::Skipped,
            push: ChannelOutcome::Skipped,
            pruned_tokens: vec![],
            dropped_tokens: vec![],
        };
        let failed = RecipientOutcome {
            recipient_id: Uuid::now_v7(),
            push: ChannelOutcome::Failed("timeout".to_string()),
            ..ok.clone()
        };

        let report = FanoutReport {
            title: "Ticket Updated".to_string(),
            recipients: vec![ok.clone(), failed],
            duplicates_removed: 0,
            duration_ms: 3,
        };

        assert_eq!(report.ledger_written(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(report.outcome_for(ok.recipient_id).is_some());
        report.record();
    }
}
