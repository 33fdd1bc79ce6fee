//! 通知扇出
//!
//! 对每个接收人独立执行：写入通知记录、向个人房间广播 `newNotification`、
//! 有设备令牌时调用一次移动推送。任一通道失败只影响该接收人的该通道，
//! 结果汇总为 `FanoutReport`，由 `FanoutReport::record` 统一记录日志与指标。
//!
//! 业务操作通过 `spawn_tracked` / `dispatch` 在后台触发扇出，不等待其完成；
//! 进程退出前调用 `flush` 等待所有在途扇出结束。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, warn};

use super::error::DeliveryError;
use super::ledger::NotificationLedger;
use super::push::{PushDeliveryAdapter, PushMessage};
use super::realtime::{RealtimeBus, Room};
use super::types::{ChannelOutcome, FanoutReport, NotificationMessage, RecipientOutcome};
use crate::models::Recipient;
use crate::repository::DeviceTokenRepositoryTrait;

/// 个人房间中的通知事件名
pub const NEW_NOTIFICATION_EVENT: &str = "newNotification";

const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(5);

/// 多通道通知扇出
pub struct NotifyFanout {
    ledger: NotificationLedger,
    bus: Arc<RealtimeBus>,
    push: Arc<PushDeliveryAdapter>,
    tokens: Arc<dyn DeviceTokenRepositoryTrait>,
    tasks: Mutex<JoinSet<()>>,
    ledger_timeout: Duration,
}

impl NotifyFanout {
    pub fn new(
        ledger: NotificationLedger,
        bus: Arc<RealtimeBus>,
        push: Arc<PushDeliveryAdapter>,
        tokens: Arc<dyn DeviceTokenRepositoryTrait>,
    ) -> Self {
        Self {
            ledger,
            bus,
            push,
            tokens,
            tasks: Mutex::new(JoinSet::new()),
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    pub fn bus(&self) -> &Arc<RealtimeBus> {
        &self.bus
    }

    /// 向一组接收人扇出通知并等待全部通道完成
    pub async fn notify(
        &self,
        recipients: Vec<Recipient>,
        message: &NotificationMessage,
    ) -> FanoutReport {
        let started = Instant::now();
        let (recipients, duplicates_removed) = dedup_recipients(recipients);

        let push_message = PushMessage {
            title: message.title.clone(),
            body: message.message.clone(),
            data: message.push_data(),
        };

        let outcomes = join_all(
            recipients
                .iter()
                .map(|recipient| self.deliver(recipient, message, &push_message)),
        )
        .await;

        let report = FanoutReport {
            title: message.title.clone(),
            recipients: outcomes,
            duplicates_removed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        report.record();
        report
    }

    /// 后台扇出，立即返回
    pub fn dispatch(self: &Arc<Self>, recipients: Vec<Recipient>, message: NotificationMessage) {
        let fanout = Arc::clone(self);
        self.spawn_tracked(async move {
            fanout.notify(recipients, &message).await;
        });
    }

    /// 在受跟踪的任务集合中运行后台任务，顺带回收已完成的任务
    pub fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }
        tasks.spawn(task);
    }

    /// 在途后台任务数量
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// 等待所有在途扇出完成，包括等待期间新加入的任务
    pub async fn flush(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                log_task_result(result);
            }
        }
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        message: &NotificationMessage,
        push_message: &PushMessage,
    ) -> RecipientOutcome {
        let mut outcome = RecipientOutcome {
            recipient_id: recipient.id,
            role: recipient.role,
            notification_id: None,
            ledger: ChannelOutcome::Skipped,
            realtime: ChannelOutcome::Skipped,
            push: ChannelOutcome::Skipped,
            pruned_tokens: Vec::new(),
            dropped_tokens: Vec::new(),
        };

        // 通知记录
        let notification =
            match tokio::time::timeout(self.ledger_timeout, self.ledger.record(recipient, message))
                .await
            {
                Ok(Ok(notification)) => {
                    outcome.ledger = ChannelOutcome::Delivered;
                    outcome.notification_id = Some(notification.id);
                    Some(notification)
                }
                Ok(Err(e)) => {
                    outcome.ledger = ChannelOutcome::Failed(e.to_string());
                    None
                }
                Err(_) => {
                    let e = DeliveryError::Timeout { channel: "ledger" };
                    outcome.ledger = ChannelOutcome::Failed(e.to_string());
                    None
                }
            };

        // 个人房间
        let data = json!({
            "notification": notification,
            "title": message.title,
            "message": message.message,
            "payload": message.payload,
        });
        outcome.realtime =
            match self
                .bus
                .broadcast(Room::User(recipient.id), NEW_NOTIFICATION_EVENT, data)
            {
                Ok(0) => ChannelOutcome::Skipped,
                Ok(_) => ChannelOutcome::Delivered,
                Err(e) => ChannelOutcome::Failed(e.to_string()),
            };

        // 移动推送
        if recipient.device_tokens.is_empty() {
            return outcome;
        }

        let report = self.push.send(&recipient.device_tokens, push_message).await;

        if !report.failed_tokens.is_empty() {
            match self.tokens.remove(recipient.id, &report.failed_tokens).await {
                Ok(_) => outcome.pruned_tokens = report.failed_tokens.clone(),
                Err(e) => warn!(
                    recipient_id = %recipient.id,
                    tokens = report.failed_tokens.len(),
                    error = %e,
                    "清理失效设备令牌失败"
                ),
            }
        }
        outcome.dropped_tokens = report.dropped_tokens.clone();

        outcome.push = if report.success_count > 0 {
            ChannelOutcome::Delivered
        } else {
            ChannelOutcome::Failed(format!(
                "{} 个令牌失效，{} 个令牌重试耗尽",
                report.failed_tokens.len(),
                report.dropped_tokens.len()
            ))
        };

        outcome
    }
}

/// 按用户 ID 去重，保留首次出现的接收人；返回去重后的列表与移除数量
pub fn dedup_recipients(recipients: Vec<Recipient>) -> (Vec<Recipient>, usize) {
    let total = recipients.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<Recipient> = recipients
        .into_iter()
        .filter(|r| seen.insert(r.id))
        .collect();
    let removed = total - unique.len();
    (unique, removed)
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "通知扇出任务异常退出");
        }
    }
}
