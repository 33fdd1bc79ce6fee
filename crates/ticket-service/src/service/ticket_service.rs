//! 工单服务
//!
//! 处理工单生命周期的核心业务逻辑：
//! - 创建（客户自助 / 员工代建），按服务区域自动分配工程师
//! - 字段更新、重新分配、升级、解决、批量更新
//! - 附件追加、删除
//!
//! ## 处理流程
//!
//! 1. 权限校验 -> 2. 读取工单 -> 3. 状态机校验 -> 4. 持久化 -> 5. 触发通知
//!
//! 通知在后台执行，失败不影响工单操作的结果。

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use helpdesk_shared::observability::metrics;

use super::authorization::{
    require_admin, require_customer, require_manage, require_staff, require_view,
};
use super::dto::{
    AssignTicketRequest, BulkUpdateRequest, BulkUpdateResponse, BulkUpdateResult,
    CreateTicketRequest, InternalCreateTicketRequest, UpdateTicketRequest,
};
use super::notifier::TicketNotifier;
use super::observe;
use super::state_machine::ensure_transition;
use crate::error::{Result, TicketError};
use crate::models::{
    Actor, AssignmentEntry, Attachment, Connection, Page, Pagination, Role, StoredBlob, Ticket,
    TicketDetail, TicketFilter, TicketPriority, TicketStatus,
};
use crate::notification::TicketEvent;
use crate::repository::{DirectoryRepositoryTrait, TicketRepositoryTrait};

/// 工单服务
pub struct TicketService {
    tickets: Arc<dyn TicketRepositoryTrait>,
    directory: Arc<dyn DirectoryRepositoryTrait>,
    notifier: TicketNotifier,
}

impl TicketService {
    pub fn new(
        tickets: Arc<dyn TicketRepositoryTrait>,
        directory: Arc<dyn DirectoryRepositoryTrait>,
        notifier: TicketNotifier,
    ) -> Self {
        Self {
            tickets,
            directory,
            notifier,
        }
    }

    /// 客户创建工单
    ///
    /// 使用客户当前生效的连接定位服务区域，再分配该区域的工程师
    #[instrument(skip(self, request), fields(actor_id = %actor.id))]
    pub async fn create_ticket(&self, actor: &Actor, request: CreateTicketRequest) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            require_customer(actor, "createTicket")?;
            let description = validate_description(&request.description)?;

            let customer = self
                .directory
                .find_customer(actor.id)
                .await?
                .ok_or_else(|| TicketError::not_found("customer", actor.id))?;

            let connection_id = customer
                .active_connection_id
                .ok_or_else(|| TicketError::Validation("客户没有生效的宽带连接".to_string()))?;
            let connection = self
                .directory
                .find_connection(connection_id)
                .await?
                .ok_or_else(|| TicketError::Validation("客户的宽带连接不存在".to_string()))?;

            self.open_ticket(
                actor,
                customer.id,
                connection,
                description,
                request.issue_type,
                request.priority,
                TicketEvent::Created { by: None },
            )
            .await
        }
        .await;

        observe("create", result)
    }

    /// 员工代客户创建工单
    #[instrument(skip(self, request), fields(actor_id = %actor.id, role = %actor.role, connection_id = %request.connection_id))]
    pub async fn internal_create_ticket(
        &self,
        actor: &Actor,
        request: InternalCreateTicketRequest,
    ) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            require_staff(actor, "internalCreateTicket")?;
            let description = validate_description(&request.description)?;

            let connection = self
                .directory
                .find_connection(request.connection_id)
                .await?
                .ok_or_else(|| TicketError::not_found("connection", request.connection_id))?;
            let customer = self
                .directory
                .find_customer(connection.customer_id)
                .await?
                .ok_or_else(|| TicketError::Validation("连接所属客户不存在".to_string()))?;

            self.open_ticket(
                actor,
                customer.id,
                connection,
                description,
                request.issue_type,
                request.priority,
                TicketEvent::Created {
                    by: Some(actor.role),
                },
            )
            .await
        }
        .await;

        observe("internal_create", result)
    }

    /// 更新工单字段
    ///
    /// 包含状态时必须满足状态机；与当前状态相同的状态视为未修改
    #[instrument(skip(self, request), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn update_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        request: UpdateTicketRequest,
    ) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            require_admin(actor, "updateTicket")?;
            if request.is_empty() {
                return Err(TicketError::Validation("没有需要更新的字段".to_string()));
            }

            let mut ticket = self.load(ticket_id).await?;
            let original = ticket.status;

            if let Some(description) = request.description {
                ticket.description = validate_description(&description)?;
            }
            if let Some(priority) = request.priority {
                ticket.priority = priority;
            }
            if let Some(issue_type) = request.issue_type {
                ticket.issue_type = Some(issue_type);
            }

            let status_changed = matches!(request.status, Some(next) if next != original);
            if let Some(next) = request.status.filter(|_| status_changed) {
                apply_status(&mut ticket, next, actor, None)?;
            }
            ticket.touch(actor);

            self.persist(&ticket, original).await?;
            if status_changed {
                metrics::record_ticket_transition(original.as_str(), ticket.status.as_str());
            }

            self.notifier.ticket_event(
                &ticket,
                TicketEvent::Updated,
                json!({ "ticket": ticket }),
                json!({ "status": ticket.status }),
            );

            info!(ticket_id = %ticket.id, status = %ticket.status, "工单已更新");
            Ok(ticket)
        }
        .await;

        observe("update", result)
    }

    /// 重新分配工程师
    ///
    /// 追加一条分配历史并覆盖当前负责人，状态保持不变
    #[instrument(skip(self, request), fields(actor_id = %actor.id, ticket_id = %ticket_id, agent_id = %request.agent_id))]
    pub async fn assign_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        request: AssignTicketRequest,
    ) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            require_admin(actor, "assignTicket")?;

            let agent = self
                .directory
                .find_staff(request.agent_id)
                .await?
                .ok_or_else(|| TicketError::not_found("staff", request.agent_id))?;
            if agent.role != Role::Team {
                return Err(TicketError::Validation(format!(
                    "只能分配给现场工程师: {}",
                    agent.id
                )));
            }

            let previous = self.load(ticket_id).await?;
            let entry = AssignmentEntry::new(ticket_id, agent.id, agent.role, actor, request.note);
            let ticket = self
                .tickets
                .append_assignment(&entry)
                .await?
                .ok_or_else(|| TicketError::not_found("ticket", ticket_id))?;

            if let Some(previous_agent) = previous.assigned_to {
                if previous_agent != agent.id && previous.assigned_to_role != Some(Role::Admin) {
                    self.notifier.revoke_staff_room(ticket_id, previous_agent);
                }
            }

            self.notifier.ticket_event(
                &ticket,
                TicketEvent::Reassigned,
                json!({ "ticket": ticket, "assignment": entry }),
                json!({ "agentId": agent.id }),
            );

            info!(ticket_id = %ticket.id, agent_id = %agent.id, "工单已重新分配");
            Ok(ticket)
        }
        .await;

        observe("assign", result)
    }

    /// 升级工单（管理员或负责工程师）
    #[instrument(skip(self), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn escalate_ticket(&self, actor: &Actor, ticket_id: Uuid) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            let mut ticket = self.load(ticket_id).await?;
            require_manage(actor, &ticket, "escalateTicket")?;

            let original = ticket.status;
            apply_status(&mut ticket, TicketStatus::Escalated, actor, None)?;
            ticket.touch(actor);
            self.persist(&ticket, original).await?;
            metrics::record_ticket_transition(original.as_str(), ticket.status.as_str());

            self.notifier.ticket_event(
                &ticket,
                TicketEvent::Escalated,
                json!({ "ticket": ticket }),
                json!({ "status": ticket.status }),
            );

            info!(ticket_id = %ticket.id, "工单已升级");
            Ok(ticket)
        }
        .await;

        observe("escalate", result)
    }

    /// 解决工单（管理员或负责工程师）
    ///
    /// 已解决的工单返回 `AlreadyResolved`
    #[instrument(skip(self, resolution_message), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn resolve_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        resolution_message: Option<String>,
    ) -> Result<Ticket> {
        let result: Result<Ticket> = async {
            let mut ticket = self.load(ticket_id).await?;
            require_manage(actor, &ticket, "resolveTicket")?;
            if ticket.status == TicketStatus::Resolved {
                return Err(TicketError::AlreadyResolved(ticket.id));
            }

            let original = ticket.status;
            let resolution = resolution_message
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty());
            apply_status(&mut ticket, TicketStatus::Resolved, actor, resolution)?;
            ticket.touch(actor);
            self.persist(&ticket, original).await?;
            metrics::record_ticket_transition(original.as_str(), ticket.status.as_str());

            self.notifier.ticket_event(
                &ticket,
                TicketEvent::Resolved,
                json!({ "ticket": ticket }),
                json!({
                    "status": ticket.status,
                    "resolutionMessage": ticket.resolution_message,
                }),
            );

            info!(ticket_id = %ticket.id, "工单已解决");
            Ok(ticket)
        }
        .await;

        observe("resolve", result)
    }

    /// 批量更新状态与优先级
    ///
    /// 逐个工单独立处理，单个失败不影响其他工单；每张更新成功的工单各触发一次通知
    #[instrument(skip(self, request), fields(actor_id = %actor.id, count = request.ticket_ids.len()))]
    pub async fn bulk_update_tickets(
        &self,
        actor: &Actor,
        request: BulkUpdateRequest,
    ) -> Result<BulkUpdateResponse> {
        let result: Result<BulkUpdateResponse> = async {
            require_admin(actor, "bulkUpdateTickets")?;
            if request.ticket_ids.is_empty() {
                return Err(TicketError::Validation("工单 ID 列表不能为空".to_string()));
            }
            if request.status.is_none() && request.priority.is_none() {
                return Err(TicketError::Validation("没有需要更新的字段".to_string()));
            }

            let total = request.ticket_ids.len();
            let mut results = Vec::with_capacity(total);
            let mut success_count = 0;
            let mut failed_count = 0;

            for ticket_id in request.ticket_ids {
                let patch = UpdateTicketRequest {
                    status: request.status,
                    priority: request.priority,
                    ..Default::default()
                };

                match self.update_ticket(actor, ticket_id, patch).await {
                    Ok(_) => {
                        success_count += 1;
                        results.push(BulkUpdateResult::success(ticket_id));
                    }
                    Err(e) => {
                        failed_count += 1;
                        warn!(ticket_id = %ticket_id, error = %e, "批量更新单条失败");
                        results.push(BulkUpdateResult::failure(
                            ticket_id,
                            e.error_code(),
                            e.to_string(),
                        ));
                    }
                }
            }

            info!(
                total = total,
                success = success_count,
                failed = failed_count,
                "批量更新完成"
            );

            Ok(BulkUpdateResponse {
                total,
                success_count,
                failed_count,
                results,
            })
        }
        .await;

        observe("bulk_update", result)
    }

    /// 获取工单详情
    ///
    /// 客户看不到内部评论
    #[instrument(skip(self), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn get_ticket_by_id(&self, actor: &Actor, ticket_id: Uuid) -> Result<TicketDetail> {
        let mut detail = self
            .tickets
            .find_detail(ticket_id)
            .await?
            .ok_or_else(|| TicketError::not_found("ticket", ticket_id))?;
        require_view(actor, &detail.ticket, "getTicketById")?;

        if !actor.is_staff() {
            detail.private_comments.clear();
        }
        Ok(detail)
    }

    /// 分页查询工单
    ///
    /// 工程师只能看到分配给自己的工单，客户只能看到自己的工单
    #[instrument(skip(self, filter), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn list_tickets(
        &self,
        actor: &Actor,
        mut filter: TicketFilter,
        pagination: Pagination,
    ) -> Result<Page<Ticket>> {
        match actor.role {
            Role::Admin => {}
            Role::Team => filter.assigned_to = Some(actor.id),
            Role::Customer => filter.customer_id = Some(actor.id),
        }

        let pagination = pagination.normalized();
        let items = self.tickets.list(&filter, pagination).await?;
        let total = self.tickets.count(&filter).await?;
        Ok(Page::new(items, total, pagination))
    }

    /// 追加附件引用
    #[instrument(skip(self, blob), fields(actor_id = %actor.id, ticket_id = %ticket_id, name = %blob.name))]
    pub async fn add_attachment(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        blob: StoredBlob,
    ) -> Result<Attachment> {
        let result: Result<Attachment> = async {
            if blob.name.trim().is_empty() || blob.stored_path.trim().is_empty() {
                return Err(TicketError::Validation("附件名称与存储路径不能为空".to_string()));
            }
            if blob.size < 0 {
                return Err(TicketError::Validation("附件大小不能为负数".to_string()));
            }

            let ticket = self.load(ticket_id).await?;
            require_view(actor, &ticket, "addAttachment")?;

            let attachment = Attachment::from_blob(ticket_id, blob, actor);
            if !self.tickets.add_attachment(&attachment).await? {
                return Err(TicketError::not_found("ticket", ticket_id));
            }

            self.notifier.ticket_event(
                &ticket,
                TicketEvent::AttachmentAdded,
                json!({ "ticketId": ticket.id, "attachment": attachment }),
                json!({ "attachmentId": attachment.id }),
            );

            Ok(attachment)
        }
        .await;

        observe("add_attachment", result)
    }

    /// 删除工单及其评论、附件；相关通知记录保留
    #[instrument(skip(self), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn delete_ticket(&self, actor: &Actor, ticket_id: Uuid) -> Result<()> {
        let result: Result<()> = async {
            require_admin(actor, "deleteTicket")?;
            if !self.tickets.delete(ticket_id).await? {
                return Err(TicketError::not_found("ticket", ticket_id));
            }

            self.notifier.ticket_deleted(ticket_id);
            info!(ticket_id = %ticket_id, "工单已删除");
            Ok(())
        }
        .await;

        observe("delete", result)
    }

    async fn load(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.tickets
            .find(ticket_id)
            .await?
            .ok_or_else(|| TicketError::not_found("ticket", ticket_id))
    }

    /// 写回工单，要求存储中的状态仍是读取时的状态
    ///
    /// 期间状态被他人修改时返回并发冲突，不会用旧快照覆盖新状态
    async fn persist(&self, ticket: &Ticket, expected: TicketStatus) -> Result<()> {
        if self.tickets.update(ticket, expected).await? {
            return Ok(());
        }

        match self.tickets.find(ticket.id).await? {
            Some(_) => Err(TicketError::ConcurrencyConflict),
            None => Err(TicketError::not_found("ticket", ticket.id)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_ticket(
        &self,
        actor: &Actor,
        customer_id: Uuid,
        connection: Connection,
        description: String,
        issue_type: Option<String>,
        priority: TicketPriority,
        event: TicketEvent,
    ) -> Result<Ticket> {
        let area_id = connection
            .service_area_id
            .ok_or_else(|| TicketError::Validation("连接未设置服务区域".to_string()))?;
        let agent = self
            .directory
            .find_agent_for_area(area_id)
            .await?
            .ok_or(TicketError::NoAgentForArea(area_id))?;

        let ticket = Ticket::open(
            customer_id,
            Some(connection.id),
            description,
            issue_type,
            priority,
            agent.id,
            actor,
        );
        let initial = AssignmentEntry::new(ticket.id, agent.id, Role::Team, actor, None);
        self.tickets.insert(&ticket, &initial).await?;

        self.notifier.ticket_event(
            &ticket,
            event,
            json!({ "ticket": ticket }),
            json!({ "status": ticket.status }),
        );

        info!(
            ticket_id = %ticket.id,
            customer_id = %customer_id,
            agent_id = %agent.id,
            area_id = %area_id,
            "工单已创建"
        );
        Ok(ticket)
    }
}

/// 执行状态迁移并维护相关字段
///
/// escalated 标记与 escalated 状态保持一致；进入 resolved 时写入解决信息
fn apply_status(
    ticket: &mut Ticket,
    next: TicketStatus,
    actor: &Actor,
    resolution: Option<String>,
) -> Result<()> {
    ensure_transition(ticket.status, next)?;

    ticket.status = next;
    ticket.escalated = next == TicketStatus::Escalated;
    if next == TicketStatus::Resolved {
        ticket.resolved_at = Some(Utc::now());
        ticket.resolved_by = Some(actor.id);
        ticket.resolved_by_role = Some(actor.role);
        ticket.resolution_message = resolution;
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(TicketError::Validation("问题描述不能为空".to_string()));
    }
    Ok(trimmed.to_string())
}
