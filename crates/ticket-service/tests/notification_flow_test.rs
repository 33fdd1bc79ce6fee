//! 通知扇出集成测试
//!
//! 覆盖设备令牌清理、令牌数量上限、已读标记、管理员直发通知与实时网关

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{Duration, timeout};

use common::{Fixture, add_customer, description};
use ticket_service::error::TicketError;
use ticket_service::gateway::{GatewayState, ServerReply, handle_client_message};
use ticket_service::models::{Pagination, TicketPriority};
use ticket_service::notification::{
    ChannelOutcome, NEW_NOTIFICATION_EVENT, PushError, PushMessage, PushProvider, RealtimeEvent,
    Room, TokenOutcome,
};
use ticket_service::repository::DeviceTokenRepositoryTrait;
use ticket_service::service::{AssignTicketRequest, CreateTicketRequest, DirectNotificationRequest};

/// 指定令牌返回永久失败，其余令牌投递成功
struct RejectingProvider {
    rejected: String,
}

#[async_trait]
impl PushProvider for RejectingProvider {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        _message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, PushError> {
        Ok(tokens
            .iter()
            .map(|t| {
                if *t == self.rejected {
                    TokenOutcome::Permanent("UNREGISTERED".to_string())
                } else {
                    TokenOutcome::Delivered
                }
            })
            .collect())
    }
}

/// 推送服务整体不可用
struct UnavailableProvider;

#[async_trait]
impl PushProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn send_multicast(
        &self,
        _tokens: &[String],
        _message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, PushError> {
        Err(PushError::Transient("503 Service Unavailable".to_string()))
    }
}

fn create_request() -> CreateTicketRequest {
    CreateTicketRequest {
        description: description(),
        issue_type: None,
        priority: TicketPriority::Medium,
    }
}

fn gateway_state(fx: &Fixture) -> GatewayState {
    GatewayState {
        bus: fx.app.bus.clone(),
        tickets: fx.app.tickets.clone(),
        comments: fx.app.comments.clone(),
    }
}

// ==================== 设备令牌 ====================

#[tokio::test]
async fn test_permanent_push_failure_prunes_only_that_token() {
    let fx = Fixture::with_provider(Arc::new(RejectingProvider {
        rejected: "token-b".to_string(),
    }));
    for token in ["token-a", "token-b", "token-c"] {
        fx.app
            .notifications
            .register_device_token(&fx.customer, token)
            .await
            .unwrap();
    }

    fx.app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();
    fx.app.fanout.flush().await;

    let remaining = fx.store.list(fx.customer.id).await.unwrap();
    assert_eq!(remaining, vec!["token-a".to_string(), "token-c".to_string()]);

    let page = fx
        .app
        .notifications
        .list_notifications(&fx.customer, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_push_outage_does_not_block_ledger() {
    let fx = Fixture::with_provider(Arc::new(UnavailableProvider));
    fx.app
        .notifications
        .register_device_token(&fx.customer, "token-a")
        .await
        .unwrap();

    let report = fx
        .app
        .notifications
        .notify_customer(
            &fx.admin(),
            fx.customer.id,
            DirectNotificationRequest {
                title: "计划停机".to_string(),
                message: "今晚 2:00-4:00 网络维护".to_string(),
                payload: serde_json::Value::Null,
            },
        )
        .await
        .unwrap();

    let outcome = report.outcome_for(fx.customer.id).unwrap();
    assert_eq!(outcome.ledger, ChannelOutcome::Delivered);
    assert!(outcome.push.is_failed());
    assert_eq!(outcome.dropped_tokens, vec!["token-a".to_string()]);

    // 临时失败的令牌保留
    let remaining = fx.store.list(fx.customer.id).await.unwrap();
    assert_eq!(remaining, vec!["token-a".to_string()]);
}

#[tokio::test]
async fn test_device_tokens_capped_at_five() {
    let fx = Fixture::new();

    let mut kept = Vec::new();
    for i in 0..7 {
        kept = fx
            .app
            .notifications
            .register_device_token(&fx.customer, &format!("token-{i}"))
            .await
            .unwrap();
    }

    assert_eq!(kept.len(), 5);
    assert_eq!(kept.first().map(String::as_str), Some("token-2"));
    assert_eq!(kept.last().map(String::as_str), Some("token-6"));

    // 重复注册不产生重复条目
    let again = fx
        .app
        .notifications
        .register_device_token(&fx.customer, "token-6")
        .await
        .unwrap();
    assert_eq!(again, kept);

    assert!(
        fx.app
            .notifications
            .unregister_device_token(&fx.customer, "token-3")
            .await
            .unwrap()
    );
    assert!(
        !fx.app
            .notifications
            .unregister_device_token(&fx.customer, "token-0")
            .await
            .unwrap()
    );
}

// ==================== 站内通知 ====================

#[tokio::test]
async fn test_mark_notification_read_only_by_recipient() {
    let fx = Fixture::new();
    fx.app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();
    fx.app.fanout.flush().await;

    let page = fx
        .app
        .notifications
        .list_notifications(&fx.customer, Pagination::default())
        .await
        .unwrap();
    let notification = &page.items[0];
    assert!(!notification.is_read);
    assert_eq!(
        fx.app.notifications.unread_count(&fx.customer).await.unwrap(),
        1
    );

    let err = fx
        .app
        .notifications
        .mark_notification_read(&fx.agent, notification.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Unauthorized { .. }));

    let read = fx
        .app
        .notifications
        .mark_notification_read(&fx.customer, notification.id)
        .await
        .unwrap();
    assert!(read.is_read);

    // 重复标记直接返回
    let again = fx
        .app
        .notifications
        .mark_notification_read(&fx.customer, notification.id)
        .await
        .unwrap();
    assert!(again.is_read);
    assert_eq!(
        fx.app.notifications.unread_count(&fx.customer).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_notify_all_customers_requires_admin() {
    let fx = Fixture::new();
    let (second, _) = add_customer(&fx.store, Some(fx.area_id));

    let request = DirectNotificationRequest {
        title: "资费调整".to_string(),
        message: "下月起套餐提速".to_string(),
        payload: json!({ "plan": "500M" }),
    };

    let err = fx
        .app
        .notifications
        .notify_all_customers(&fx.agent, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketError::Unauthorized { .. }));

    let report = fx
        .app
        .notifications
        .notify_all_customers(&fx.admin(), request)
        .await
        .unwrap();
    assert_eq!(report.recipients.len(), 2);
    assert_eq!(report.ledger_written(), 2);
    assert_eq!(report.failure_count(), 0);

    for customer in [fx.customer, second] {
        let page = fx
            .app
            .notifications
            .list_notifications(&customer, Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].data["plan"], "500M");
    }
}

// ==================== 实时网关 ====================

#[tokio::test]
async fn test_personal_room_receives_new_notification() {
    let fx = Fixture::new();
    let (connection_id, mut events) = fx.app.bus.connect().unwrap();
    fx.app.bus.join(
        connection_id,
        ticket_service::notification::Room::User(fx.agent.id),
    );

    let ticket = fx
        .app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();
    fx.app.fanout.flush().await;

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, NEW_NOTIFICATION_EVENT);
    assert_eq!(event.data["payload"]["ticketId"], json!(ticket.id));
}

#[tokio::test]
async fn test_gateway_join_respects_visibility() {
    let fx = Fixture::new();
    let state = gateway_state(&fx);
    let ticket = fx
        .app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();
    let join = json!({ "type": "joinTicketRoom", "ticketId": ticket.id }).to_string();

    let (customer_conn, _customer_rx) = fx.app.bus.connect().unwrap();
    match handle_client_message(&state, &fx.customer, customer_conn, &join).await {
        ServerReply::Joined { rooms } => assert_eq!(rooms, vec![format!("ticket:{}", ticket.id)]),
        other => panic!("unexpected reply: {other:?}"),
    }

    let (agent_conn, _agent_rx) = fx.app.bus.connect().unwrap();
    match handle_client_message(&state, &fx.agent, agent_conn, &join).await {
        ServerReply::Joined { rooms } => assert_eq!(rooms.len(), 2),
        other => panic!("unexpected reply: {other:?}"),
    }

    let (stranger_conn, _stranger_rx) = fx.app.bus.connect().unwrap();
    match handle_client_message(&state, &fx.other_agent, stranger_conn, &join).await {
        ServerReply::Error { code, .. } => assert_eq!(code, "UNAUTHORIZED"),
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = handle_client_message(&state, &fx.customer, customer_conn, "not json").await;
    assert!(matches!(reply, ServerReply::Error { ref code, .. } if code == "BAD_MESSAGE"));
}

#[tokio::test]
async fn test_reassigned_agent_stops_receiving_private_comments() {
    let fx = Fixture::new();
    let state = gateway_state(&fx);
    let ticket = fx
        .app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();
    let join = json!({ "type": "joinTicketRoom", "ticketId": ticket.id }).to_string();

    // 与网关建立连接时一致：先加入个人房间，再加入工单房间
    let mut listeners = Vec::new();
    for actor in [fx.agent, fx.other_agent] {
        let (conn, rx) = fx.app.bus.connect().unwrap();
        fx.app.bus.join(conn, Room::User(actor.id));
        listeners.push((conn, rx));
    }
    match handle_client_message(&state, &fx.agent, listeners[0].0, &join).await {
        ServerReply::Joined { rooms } => assert_eq!(rooms.len(), 2),
        other => panic!("unexpected reply: {other:?}"),
    }

    fx.app
        .tickets
        .assign_ticket(
            &fx.admin(),
            ticket.id,
            AssignTicketRequest {
                agent_id: fx.other_agent.id,
                note: None,
            },
        )
        .await
        .unwrap();
    match handle_client_message(&state, &fx.other_agent, listeners[1].0, &join).await {
        ServerReply::Joined { rooms } => assert_eq!(rooms.len(), 2),
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(fx.app.bus.room_size(Room::TicketStaff(ticket.id)), 1);

    fx.app
        .comments
        .add_private_comment(&fx.admin(), ticket.id, "更换分光器后复测")
        .await
        .unwrap();
    fx.app.fanout.flush().await;

    let received = |rx: &mut tokio::sync::mpsc::Receiver<RealtimeEvent>| {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event.event);
        }
        events
    };
    let old_agent = received(&mut listeners[0].1);
    let new_agent = received(&mut listeners[1].1);
    assert!(!old_agent.iter().any(|e| e == "ticketPrivateCommentAdded"));
    assert!(new_agent.iter().any(|e| e == "ticketPrivateCommentAdded"));
}

#[tokio::test]
async fn test_gateway_comment_reaches_ticket_room() {
    let fx = Fixture::new();
    let state = gateway_state(&fx);
    let ticket = fx
        .app
        .tickets
        .create_ticket(&fx.customer, create_request())
        .await
        .unwrap();

    let (agent_conn, mut agent_rx) = fx.app.bus.connect().unwrap();
    let join = json!({ "type": "joinTicketRoom", "ticketId": ticket.id }).to_string();
    handle_client_message(&state, &fx.agent, agent_conn, &join).await;

    let (customer_conn, _customer_rx) = fx.app.bus.connect().unwrap();
    let send = json!({
        "type": "sendTicketComment",
        "ticketId": ticket.id,
        "content": "师傅几点到？"
    })
    .to_string();
    let reply = handle_client_message(&state, &fx.customer, customer_conn, &send).await;
    assert!(matches!(reply, ServerReply::CommentAdded { .. }));

    let event = timeout(Duration::from_secs(1), agent_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.room, format!("ticket:{}", ticket.id));
    assert_eq!(event.data["newComment"]["content"], "师傅几点到？");

    fx.app.shutdown().await;
    assert!(fx.app.bus.is_closed());
}
