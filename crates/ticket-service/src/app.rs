//! 组件装配
//!
//! 按存储后端创建仓储，再依次构造实时总线、推送适配、通知扇出与各业务服务。
//! 实时总线在这里显式创建并注入，生命周期与 `TicketApp` 一致。

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use helpdesk_shared::config::{NotificationConfig, PushConfig};

use crate::notification::{
    FcmPushProvider, LoggingPushProvider, NotificationLedger, NotifyFanout, PushDeliveryAdapter,
    PushError, PushProvider, RealtimeBus,
};
use crate::repository::{
    CommentRepository, CommentRepositoryTrait, DeviceTokenRepository,
    DeviceTokenRepositoryTrait, DirectoryRepository, DirectoryRepositoryTrait, MemoryStore,
    NotificationRepository, NotificationRepositoryTrait, TicketRepository, TicketRepositoryTrait,
};
use crate::service::{
    CommentService, NotificationService, RecipientResolver, TicketNotifier, TicketService,
};

/// 所有仓储的集合
#[derive(Clone)]
pub struct Repositories {
    pub tickets: Arc<dyn TicketRepositoryTrait>,
    pub comments: Arc<dyn CommentRepositoryTrait>,
    pub notifications: Arc<dyn NotificationRepositoryTrait>,
    pub device_tokens: Arc<dyn DeviceTokenRepositoryTrait>,
    pub directory: Arc<dyn DirectoryRepositoryTrait>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            tickets: Arc::new(TicketRepository::new(pool.clone())),
            comments: Arc::new(CommentRepository::new(pool.clone())),
            notifications: Arc::new(NotificationRepository::new(pool.clone())),
            device_tokens: Arc::new(DeviceTokenRepository::new(pool.clone())),
            directory: Arc::new(DirectoryRepository::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tickets: store.clone(),
            comments: store.clone(),
            notifications: store.clone(),
            device_tokens: store.clone(),
            directory: store,
        }
    }
}

/// 根据配置选择推送实现
pub fn push_provider(config: &PushConfig) -> Result<Arc<dyn PushProvider>, PushError> {
    if config.enabled {
        let provider = FcmPushProvider::from_config(config)?;
        info!(project_id = %config.project_id, "FCM 推送已启用");
        Ok(Arc::new(provider))
    } else {
        info!("推送未启用，使用日志推送实现");
        Ok(Arc::new(LoggingPushProvider))
    }
}

/// 装配完成的应用
pub struct TicketApp {
    pub tickets: Arc<TicketService>,
    pub comments: Arc<CommentService>,
    pub notifications: Arc<NotificationService>,
    pub fanout: Arc<NotifyFanout>,
    pub bus: Arc<RealtimeBus>,
}

impl TicketApp {
    pub fn build(
        repos: Repositories,
        provider: Arc<dyn PushProvider>,
        config: &NotificationConfig,
    ) -> Self {
        let bus = Arc::new(RealtimeBus::new(config.realtime_buffer));
        let push = Arc::new(PushDeliveryAdapter::from_config(provider, &config.push));
        let fanout = Arc::new(NotifyFanout::new(
            NotificationLedger::new(repos.notifications.clone()),
            bus.clone(),
            push,
            repos.device_tokens.clone(),
        ));

        let resolver = RecipientResolver::new(repos.directory.clone(), repos.device_tokens.clone());
        let notifier = TicketNotifier::new(bus.clone(), fanout.clone(), resolver);

        let tickets = Arc::new(TicketService::new(
            repos.tickets.clone(),
            repos.directory.clone(),
            notifier.clone(),
        ));
        let comments = Arc::new(CommentService::new(
            repos.tickets.clone(),
            repos.comments.clone(),
            repos.directory.clone(),
            notifier,
        ));
        let notifications = Arc::new(NotificationService::new(
            repos.notifications.clone(),
            repos.device_tokens.clone(),
            repos.directory.clone(),
            fanout.clone(),
            config.max_device_tokens,
        ));

        Self {
            tickets,
            comments,
            notifications,
            fanout,
            bus,
        }
    }

    /// 等待在途通知完成后关闭实时总线
    pub async fn shutdown(&self) {
        self.fanout.flush().await;
        self.bus.shutdown();
        info!("通知组件已关闭");
    }
}
