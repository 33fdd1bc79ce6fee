//! 工单评论服务
//!
//! 评论只追加不修改。公开评论对客户可见，内部评论只在员工之间流转：
//! 内部评论的房间事件只发到员工房间，通知也不会发给客户。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::authorization::{require_manage, require_view};
use super::dto::CommentView;
use super::notifier::TicketNotifier;
use super::observe;
use crate::error::{Result, TicketError};
use crate::models::{Actor, Comment, CommentVisibility, Ticket};
use crate::notification::TicketEvent;
use crate::repository::{CommentRepositoryTrait, DirectoryRepositoryTrait, TicketRepositoryTrait};

/// 评论内容长度上限（字符数）
const MAX_CONTENT_CHARS: usize = 5000;

pub struct CommentService {
    tickets: Arc<dyn TicketRepositoryTrait>,
    comments: Arc<dyn CommentRepositoryTrait>,
    directory: Arc<dyn DirectoryRepositoryTrait>,
    notifier: TicketNotifier,
}

impl CommentService {
    pub fn new(
        tickets: Arc<dyn TicketRepositoryTrait>,
        comments: Arc<dyn CommentRepositoryTrait>,
        directory: Arc<dyn DirectoryRepositoryTrait>,
        notifier: TicketNotifier,
    ) -> Self {
        Self {
            tickets,
            comments,
            directory,
            notifier,
        }
    }

    /// 追加公开评论（管理员、负责工程师、工单所属客户）
    #[instrument(skip(self, content), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn add_public_comment(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        content: &str,
    ) -> Result<Comment> {
        let result: Result<Comment> = async {
            let ticket = self.load(ticket_id).await?;
            require_view(actor, &ticket, "addPublicComment")?;
            self.append(actor, &ticket, content, CommentVisibility::Public)
                .await
        }
        .await;

        observe("add_public_comment", result)
    }

    /// 追加内部评论（管理员、负责工程师）
    #[instrument(skip(self, content), fields(actor_id = %actor.id, ticket_id = %ticket_id))]
    pub async fn add_private_comment(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        content: &str,
    ) -> Result<Comment> {
        let result: Result<Comment> = async {
            let ticket = self.load(ticket_id).await?;
            require_manage(actor, &ticket, "addPrivateComment")?;
            self.append(actor, &ticket, content, CommentVisibility::Private)
                .await
        }
        .await;

        observe("add_private_comment", result)
    }

    /// 按写入顺序列出评论，附带作者展示身份
    #[instrument(skip(self), fields(actor_id = %actor.id, ticket_id = %ticket_id, visibility = visibility.as_str()))]
    pub async fn list_comments(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        visibility: CommentVisibility,
    ) -> Result<Vec<CommentView>> {
        let ticket = self.load(ticket_id).await?;
        match visibility {
            CommentVisibility::Public => require_view(actor, &ticket, "listPublicComments")?,
            CommentVisibility::Private => require_manage(actor, &ticket, "listPrivateComments")?,
        }

        let comments = self.comments.list(ticket_id, visibility).await?;

        let mut seen = HashSet::new();
        let author_ids: Vec<Uuid> = comments
            .iter()
            .map(|c| c.authored_by)
            .filter(|id| seen.insert(*id))
            .collect();
        let profiles: HashMap<Uuid, _> = self
            .directory
            .find_profiles(&author_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(comments
            .into_iter()
            .map(|comment| CommentView {
                author: profiles.get(&comment.authored_by).cloned(),
                comment,
            })
            .collect())
    }

    async fn append(
        &self,
        actor: &Actor,
        ticket: &Ticket,
        content: &str,
        visibility: CommentVisibility,
    ) -> Result<Comment> {
        let content = validate_content(content)?;
        let comment = Comment::new(ticket.id, actor, content, visibility);
        if !self.comments.append(&comment).await? {
            return Err(TicketError::not_found("ticket", ticket.id));
        }

        let event = match visibility {
            CommentVisibility::Public => TicketEvent::PublicComment,
            CommentVisibility::Private => TicketEvent::PrivateComment,
        };
        self.notifier.ticket_event(
            ticket,
            event,
            json!({ "ticketId": ticket.id, "newComment": comment }),
            json!({ "commentId": comment.id }),
        );

        info!(
            ticket_id = %ticket.id,
            comment_id = %comment.id,
            visibility = visibility.as_str(),
            "评论已添加"
        );
        Ok(comment)
    }

    async fn load(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.tickets
            .find(ticket_id)
            .await?
            .ok_or_else(|| TicketError::not_found("ticket", ticket_id))
    }
}

fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(TicketError::Validation("评论内容不能为空".to_string()));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(TicketError::Validation(format!(
            "评论内容不能超过 {} 个字符",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(trimmed.to_string())
}
