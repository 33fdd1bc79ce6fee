//! 通知接收人计算
//!
//! 接收人在每次通知事件时从工单与目录实时计算，不做缓存

use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Recipient, Role, Ticket};
use crate::repository::{DeviceTokenRepositoryTrait, DirectoryRepositoryTrait};

/// 接收人解析器
#[derive(Clone)]
pub struct RecipientResolver {
    directory: Arc<dyn DirectoryRepositoryTrait>,
    tokens: Arc<dyn DeviceTokenRepositoryTrait>,
}

impl RecipientResolver {
    pub fn new(
        directory: Arc<dyn DirectoryRepositoryTrait>,
        tokens: Arc<dyn DeviceTokenRepositoryTrait>,
    ) -> Self {
        Self { directory, tokens }
    }

    /// 工单相关方：客户（可选）、当前负责工程师、全部管理员
    ///
    /// 读取管理员列表失败时只记录告警，客户与工程师照常通知
    pub async fn for_ticket(&self, ticket: &Ticket, include_customer: bool) -> Vec<Recipient> {
        let mut parties = Vec::new();
        if include_customer {
            parties.push((ticket.customer_id, Role::Customer));
        }
        if let Some(agent_id) = ticket.assigned_to {
            parties.push((agent_id, ticket.assigned_to_role.unwrap_or(Role::Team)));
        }

        match self.directory.list_admins().await {
            Ok(admins) => parties.extend(admins.into_iter().map(|admin| (admin.id, Role::Admin))),
            Err(e) => warn!(
                ticket_id = %ticket.id,
                error = %e,
                "读取管理员列表失败，本次通知不含管理员"
            ),
        }

        self.with_tokens(parties).await
    }

    pub async fn customer(&self, customer_id: Uuid) -> Result<Vec<Recipient>> {
        Ok(self.with_tokens(vec![(customer_id, Role::Customer)]).await)
    }

    pub async fn all_customers(&self) -> Result<Vec<Recipient>> {
        let customers = self.directory.list_customers().await?;
        let parties = customers
            .into_iter()
            .map(|customer| (customer.id, Role::Customer))
            .collect();
        Ok(self.with_tokens(parties).await)
    }

    /// 读取设备令牌失败时按无令牌处理，不影响其他通道
    async fn with_tokens(&self, parties: Vec<(Uuid, Role)>) -> Vec<Recipient> {
        join_all(parties.into_iter().map(|(id, role)| async move {
            let tokens = match self.tokens.list(id).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(user_id = %id, error = %e, "读取设备令牌失败");
                    Vec::new()
                }
            };
            Recipient::new(id, role).with_tokens(tokens)
        }))
        .await
    }
}
